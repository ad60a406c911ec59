//! Tag-based rules.
//!
//! Policy items select workloads by overlapping, possibly contradictory, tag
//! subsets. [`build_rules`] partitions the tag space they describe into
//! disjoint cells and merges every item that applies to each cell.
//!
//! Items that can never select the same workload are resolved independently:
//! the subsets form a graph whose edges join intersecting subsets, and each
//! connected component enumerates the sign assignments over its own tags
//! only.

use crate::{
    error::{Error, Result},
    merge::merge_confs,
    policy::{backend_ref_origin_index, origins, PolicyItemWithMeta, PolicyType},
    subset::{Element, Subset, SubsetIter, Tag, MAX_TAGS},
};
use policy_rules_api::{meta::SERVICE_TAG, ResourceMeta, TargetRef, TargetRefKind};
use serde_json::Value;
use std::{collections::BTreeMap, ops::Deref};

/// The resolved configuration of one cell of the tag space.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub subset: Subset,
    pub conf: Value,
    /// Contributing policies, in first-seen order.
    pub origin: Vec<ResourceMeta>,
    /// Maps a route rule's match hash to the index of the origin that
    /// contributed its backend references.
    pub backend_ref_origin_index: BTreeMap<String, usize>,
}

/// Rules ordered most-specific first. The first rule containing an element
/// applies to it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rules(Vec<Rule>);

// === impl Rules ===

impl Rules {
    /// Returns the rule applying to `element`, or `None` when no policy
    /// configures it.
    pub fn compute(&self, element: &Element) -> Option<&Rule> {
        self.0.iter().find(|r| r.subset.contains_element(element))
    }

    /// Returns the first rule whose subset contains all of `subset`.
    pub fn compute_subset(&self, subset: &Subset) -> Option<&Rule> {
        self.0.iter().find(|r| r.subset.is_subset(subset))
    }

    /// Decodes the configuration applying to `element`.
    pub fn compute_conf<T: serde::de::DeserializeOwned>(
        &self,
        element: &Element,
    ) -> Result<Option<T>> {
        match self.compute(element) {
            Some(rule) => Ok(Some(serde_json::from_value(rule.conf.clone())?)),
            None => Ok(None),
        }
    }
}

impl Deref for Rules {
    type Target = [Rule];

    fn deref(&self) -> &[Rule] {
        &self.0
    }
}

impl FromIterator<Rule> for Rules {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Rules {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Converts a target into the tags it selects.
pub fn as_subset(target_ref: &TargetRef) -> Result<Subset> {
    let tags = target_ref.tags().map(|(k, v)| Tag::new(k, v));
    match target_ref.kind {
        TargetRefKind::Mesh => Ok(Subset::default()),
        TargetRefKind::MeshSubset => Ok(tags.collect()),
        TargetRefKind::MeshService => Ok(Some(Tag::new(SERVICE_TAG, target_ref.name()))
            .into_iter()
            .collect()),
        TargetRefKind::MeshServiceSubset => Ok(Some(Tag::new(SERVICE_TAG, target_ref.name()))
            .into_iter()
            .chain(tags)
            .collect()),
        kind => Err(Error::UnsupportedTargetRefKind(kind)),
    }
}

/// Builds rules for `items`, which must already be ordered by precedence.
///
/// Items targeting concrete resources are ignored; they are resolved as
/// resource rules. When `with_negations` is false and the items constrain at
/// most one tag key, one rule is built per distinct subset, without negated
/// cells.
pub fn build_rules(
    items: &[PolicyItemWithMeta],
    policy_type: &PolicyType,
    with_negations: bool,
) -> Result<Rules> {
    let items = items
        .iter()
        .filter(|i| i.target_ref.kind.is_tag_selector())
        .collect::<Vec<_>>();
    if items.is_empty() {
        return Ok(Rules::default());
    }

    let subsets = items
        .iter()
        .map(|i| as_subset(&i.target_ref))
        .collect::<Result<Vec<_>>>()?;

    let mut keys = subsets.iter().flatten().map(|t| &t.key).collect::<Vec<_>>();
    keys.sort();
    keys.dedup();

    let mut rules = Vec::new();

    if !with_negations && keys.len() <= 1 {
        let mut unique = Vec::<&Subset>::new();
        for subset in &subsets {
            if !unique.contains(&subset) {
                unique.push(subset);
            }
        }
        for subset in unique {
            rules.extend(create_rules(subset, &items, &subsets, policy_type)?);
        }
        rules.sort_by(|r1, r2| r2.subset.len().cmp(&r1.subset.len()));
        return Ok(Rules(rules));
    }

    let components = connected_components(&subsets);
    tracing::trace!(items = items.len(), components = components.len(), "building rules");

    for component in components {
        let mut tags = component
            .iter()
            .flat_map(|id| subsets[*id].iter().cloned())
            .collect::<Vec<_>>();
        tags.sort_by(|t1, t2| (&t1.key, &t1.value).cmp(&(&t2.key, &t2.value)));
        tags.dedup();
        if tags.len() > MAX_TAGS {
            return Err(Error::TooManyTags {
                count: tags.len(),
                limit: MAX_TAGS,
            });
        }

        for candidate in SubsetIter::new(tags) {
            rules.extend(create_rules(&candidate, &items, &subsets, policy_type)?);
        }
    }

    rules.sort_by(|r1, r2| r2.subset.num_positive().cmp(&r1.subset.num_positive()));
    Ok(Rules(rules))
}

/// Merges every item whose subset contains `candidate`. Yields one rule per
/// merged value; none when no item applies.
fn create_rules(
    candidate: &Subset,
    items: &[&PolicyItemWithMeta],
    subsets: &[Subset],
    policy_type: &PolicyType,
) -> Result<Vec<Rule>> {
    let relevant = items
        .iter()
        .zip(subsets)
        .filter(|(_, subset)| subset.is_subset(candidate))
        .map(|(item, _)| *item)
        .collect::<Vec<_>>();
    if relevant.is_empty() {
        return Ok(Vec::new());
    }

    let confs = relevant.iter().map(|i| i.conf.clone()).collect::<Vec<_>>();
    let merged = merge_confs(&confs, &policy_type.merge)?;

    let origins = origins(&relevant, false);
    let backend_ref_origin_index =
        backend_ref_origin_index(&relevant, &origins, policy_type, false);
    let origin = origins.into_iter().map(|o| o.resource).collect::<Vec<_>>();

    Ok(merged
        .into_iter()
        .map(|conf| Rule {
            subset: candidate.clone(),
            conf,
            origin: origin.clone(),
            backend_ref_origin_index: backend_ref_origin_index.clone(),
        })
        .collect())
}

/// Groups subsets that transitively intersect. Ids are sorted within each
/// component and components are ordered by the descending string of their
/// ids joined with `:`.
fn connected_components(subsets: &[Subset]) -> Vec<Vec<usize>> {
    let mut parent = (0..subsets.len()).collect::<Vec<_>>();

    fn root(parent: &mut [usize], mut id: usize) -> usize {
        while parent[id] != id {
            parent[id] = parent[parent[id]];
            id = parent[id];
        }
        id
    }

    for i in 0..subsets.len() {
        for j in (i + 1)..subsets.len() {
            if subsets[i].intersect(&subsets[j]) {
                let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = rj.min(ri);
                }
            }
        }
    }

    let mut by_root = BTreeMap::<usize, Vec<usize>>::new();
    for id in 0..subsets.len() {
        let r = root(&mut parent, id);
        by_root.entry(r).or_default().push(id);
    }

    let mut components = by_root.into_values().collect::<Vec<_>>();
    components.sort_by_cached_key(|c| {
        std::cmp::Reverse(
            c.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(":"),
        )
    });
    components
}

#[cfg(test)]
mod tests;
