use crate::{meta::ResourceMeta, target_ref::TargetRef};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A targetRef policy as stored. Which of the optional sections are read is
/// decided by the policy type's registered capabilities.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub meta: ResourceMeta,
    pub spec: PolicySpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// A missing target selects the whole mesh.
    #[serde(default)]
    pub target_ref: TargetRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<PolicyItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<PolicyItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A `from` or `to` entry: who it applies to and the configuration it carries.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyItem {
    #[serde(default)]
    pub target_ref: TargetRef,
    #[serde(default)]
    pub default: Value,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuleItem {
    #[serde(default)]
    pub default: Value,
}

impl Policy {
    pub fn new(meta: ResourceMeta, target_ref: TargetRef) -> Self {
        Self {
            meta,
            spec: PolicySpec {
                target_ref,
                ..PolicySpec::default()
            },
        }
    }

    pub fn with_from(mut self, target_ref: TargetRef, default: Value) -> Self {
        self.spec.from.push(PolicyItem::new(target_ref, default));
        self
    }

    pub fn with_to(mut self, target_ref: TargetRef, default: Value) -> Self {
        self.spec.to.push(PolicyItem::new(target_ref, default));
        self
    }

    pub fn with_rule(mut self, default: Value) -> Self {
        self.spec.rules.push(RuleItem { default });
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.spec.default = Some(default);
        self
    }

    pub fn target_ref(&self) -> &TargetRef {
        &self.spec.target_ref
    }
}

impl PolicyItem {
    pub fn new(target_ref: TargetRef, default: Value) -> Self {
        Self {
            target_ref,
            default,
        }
    }
}
