//! Rules for policy items that target concrete destination resources.

use crate::{
    error::Result,
    merge::merge_confs,
    policy::{backend_ref_origin_index, origins, Origin, PolicyItemWithMeta, PolicyType},
    reader::ResourceReader,
    resolve::resolve_target_ref,
    sort::sort_items,
};
use ahash::AHashMap;
use policy_rules_api::{ResourceIdentifier, ResourceType, TypedResourceIdentifier};
use serde_json::Value;
use std::collections::BTreeMap;

/// The merged configuration for one destination resource.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceRule {
    pub resource: TypedResourceIdentifier,
    pub conf: Vec<Value>,
    /// Contributing policy items, told apart by their rule index.
    pub origin: Vec<Origin>,
    pub backend_ref_origin_index: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceRules(AHashMap<TypedResourceIdentifier, ResourceRule>);

// === impl ResourceRules ===

impl ResourceRules {
    /// Resolves every item against the catalog and merges, per resolved
    /// resource, every item that applies to it in precedence order.
    pub fn build(
        items: &[PolicyItemWithMeta],
        policy_type: &PolicyType,
        reader: &dyn ResourceReader,
    ) -> Result<Self> {
        let mut items = items.to_vec();
        sort_items(&mut items);

        let resolved = items
            .iter()
            .map(|i| resolve_target_ref(&i.target_ref, &i.meta, reader))
            .collect::<Vec<_>>();

        let mut keys = Vec::<&TypedResourceIdentifier>::new();
        for id in resolved.iter().flatten() {
            if !keys.contains(&id) {
                keys.push(id);
            }
        }

        let mut rules = AHashMap::with_capacity(keys.len());
        for key in keys {
            let relevant = items
                .iter()
                .zip(&resolved)
                .filter(|(_, ids)| ids.iter().any(|id| includes(id, key)))
                .map(|(item, _)| item)
                .collect::<Vec<_>>();

            let confs = relevant.iter().map(|i| i.conf.clone()).collect::<Vec<_>>();
            let conf = merge_confs(&confs, &policy_type.merge)?;
            let origin = origins(&relevant, true);
            let backend_ref_origin_index =
                backend_ref_origin_index(&relevant, &origin, policy_type, true);
            tracing::trace!(resource = %key, items = relevant.len(), "built resource rule");

            rules.insert(
                key.clone(),
                ResourceRule {
                    resource: key.clone(),
                    conf,
                    origin,
                    backend_ref_origin_index,
                },
            );
        }
        Ok(Self(rules))
    }

    pub fn get(&self, id: &TypedResourceIdentifier) -> Option<&ResourceRule> {
        self.0.get(id)
    }

    /// Looks up the rule for `id`, falling back from a section to its
    /// resource and from a resource to its mesh.
    pub fn compute(
        &self,
        id: &TypedResourceIdentifier,
        reader: &dyn ResourceReader,
    ) -> Option<&ResourceRule> {
        if let Some(rule) = self.0.get(id) {
            return Some(rule);
        }
        if id.resource_type == ResourceType::Mesh {
            return None;
        }
        if id.section_name.is_some() {
            return self.compute(&id.without_section_name(), reader);
        }

        let mesh = reader.get(ResourceType::Mesh, &ResourceIdentifier::mesh(&id.id.mesh))?;
        self.compute(&mesh.typed_identifier(), reader)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypedResourceIdentifier, &ResourceRule)> {
        self.0.iter()
    }
}

/// Returns true if an item resolved to `target` applies to `key`.
fn includes(target: &TypedResourceIdentifier, key: &TypedResourceIdentifier) -> bool {
    if target.resource_type == ResourceType::Mesh {
        return key.id.mesh == target.id.name || key == target;
    }
    if target.resource_type != key.resource_type || target.id != key.id {
        return false;
    }
    match target.section_name {
        None => true,
        Some(_) => target.section_name == key.section_name,
    }
}

#[cfg(test)]
mod tests;
