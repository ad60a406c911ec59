use crate::merge::MergeSchema;
use policy_rules_api::{Policy, PolicyItem, ResourceMeta, TargetRef};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};

/// Extracts the match hashes of the route rules in a configuration that
/// carry backend references.
pub type BackendRefHashes = fn(&Value) -> Vec<String>;

/// Everything the engine needs to know about a kind of policy. Registered
/// once; the engine never inspects policy objects to discover these.
#[derive(Clone)]
pub struct PolicyType {
    pub name: String,
    pub capabilities: Capabilities,
    pub merge: MergeSchema,
    backend_ref_hashes: Option<BackendRefHashes>,
}

/// The sections of a policy spec a policy type reads.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub from: bool,
    pub to: bool,
    pub rules: bool,
    pub single_item: bool,
}

/// One targeting unit extracted from a policy.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyItemWithMeta {
    pub target_ref: TargetRef,
    pub conf: Value,
    pub meta: ResourceMeta,
    /// The policy's top-level target, used to order items.
    pub top_level: TargetRef,
    /// The position of the item within its policy section.
    pub rule_index: usize,
}

/// Links a merged value to a policy that contributed to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    pub resource: ResourceMeta,
    pub rule_index: usize,
}

// === impl PolicyType ===

impl PolicyType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::default(),
            merge: MergeSchema::default(),
            backend_ref_hashes: None,
        }
    }

    pub fn with_from(mut self) -> Self {
        self.capabilities.from = true;
        self
    }

    pub fn with_to(mut self) -> Self {
        self.capabilities.to = true;
        self
    }

    pub fn with_rules(mut self) -> Self {
        self.capabilities.rules = true;
        self
    }

    pub fn with_single_item(mut self) -> Self {
        self.capabilities.single_item = true;
        self
    }

    pub fn with_merge_schema(mut self, merge: MergeSchema) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_backend_ref_hashes(mut self, extract: BackendRefHashes) -> Self {
        self.backend_ref_hashes = Some(extract);
        self
    }

    pub(crate) fn backend_ref_hashes(&self, conf: &Value) -> Vec<String> {
        self.backend_ref_hashes
            .map(|extract| extract(conf))
            .unwrap_or_default()
    }
}

impl fmt::Debug for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyType")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("merge", &self.merge)
            .field("backend_ref_hashes", &self.backend_ref_hashes.is_some())
            .finish()
    }
}

// === impl PolicyItemWithMeta ===

impl PolicyItemWithMeta {
    pub fn new(
        item: &PolicyItem,
        meta: &ResourceMeta,
        top_level: &TargetRef,
        rule_index: usize,
    ) -> Self {
        Self {
            target_ref: item.target_ref.clone(),
            conf: item.default.clone(),
            meta: meta.clone(),
            top_level: top_level.clone(),
            rule_index,
        }
    }

    pub fn from_items(policy: &Policy) -> Vec<Self> {
        Self::items(policy, &policy.spec.from)
    }

    pub fn to_items(policy: &Policy) -> Vec<Self> {
        Self::items(policy, &policy.spec.to)
    }

    /// Each inbound rule applies to every client of the listener.
    pub fn rule_items(policy: &Policy) -> Vec<Self> {
        policy
            .spec
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| Self {
                target_ref: TargetRef::mesh(),
                conf: rule.default.clone(),
                meta: policy.meta.clone(),
                top_level: policy.spec.target_ref.clone(),
                rule_index: i,
            })
            .collect()
    }

    /// A single-item policy applies its `default` to the whole mesh.
    pub fn single_item(policy: &Policy) -> Option<Self> {
        let conf = policy.spec.default.clone()?;
        Some(Self {
            target_ref: TargetRef::mesh(),
            conf,
            meta: policy.meta.clone(),
            top_level: policy.spec.target_ref.clone(),
            rule_index: 0,
        })
    }

    fn items(policy: &Policy, items: &[PolicyItem]) -> Vec<Self> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| Self::new(item, &policy.meta, &policy.spec.target_ref, i))
            .collect()
    }
}

/// Lists the distinct contributors of `items` in first-seen order. Items of
/// the same policy are told apart by their rule index only when
/// `with_rule_index` is set.
pub(crate) fn origins(items: &[&PolicyItemWithMeta], with_rule_index: bool) -> Vec<Origin> {
    let mut origins = Vec::<Origin>::new();
    for item in items {
        if find_origin(&origins, item, with_rule_index).is_none() {
            origins.push(Origin {
                resource: item.meta.clone(),
                rule_index: if with_rule_index { item.rule_index } else { 0 },
            });
        }
    }
    origins
}

/// Maps the match hash of every backend-carrying route rule to the origin
/// that contributed it. Later contributors win.
pub(crate) fn backend_ref_origin_index(
    items: &[&PolicyItemWithMeta],
    origins: &[Origin],
    policy_type: &PolicyType,
    with_rule_index: bool,
) -> BTreeMap<String, usize> {
    let mut index = BTreeMap::new();
    for item in items {
        if let Some(origin) = find_origin(origins, item, with_rule_index) {
            for hash in policy_type.backend_ref_hashes(&item.conf) {
                index.insert(hash, origin);
            }
        }
    }
    index
}

fn find_origin(
    origins: &[Origin],
    item: &PolicyItemWithMeta,
    with_rule_index: bool,
) -> Option<usize> {
    origins.iter().position(|o| {
        o.resource.same_resource(&item.meta)
            && (!with_rule_index || o.rule_index == item.rule_index)
    })
}
