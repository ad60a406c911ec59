#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Selects the policies that apply to a proxy and resolves them into rules.

mod dataplane;
mod egress;


pub use self::{
    dataplane::{matched_policies, policy_matches, select_gateway, SelectionError},
    egress::egress_matched_policies,
};

use policy_rules_api::Policy;
use policy_rules_core::{FromRules, GatewayRules, SingleItemRules, ToRules};
use serde::{Deserialize, Serialize};

/// Everything one policy type configures on one proxy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypedMatchingPolicies {
    pub policy_type: String,
    /// The selected policies, ordered by precedence.
    pub dataplane_policies: Vec<Policy>,
    pub from_rules: FromRules,
    pub to_rules: ToRules,
    pub gateway_rules: GatewayRules,
    pub single_item_rules: SingleItemRules,
    /// Policies whose target could not be resolved. They are left out of
    /// every rule set.
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOptions {
    /// Also select policies labelled with the shadow effect.
    #[serde(default)]
    pub include_shadow: bool,
}

/// Returns true if `selector` matches `tags`. A `*` value matches any value
/// of a present key.
fn tags_match(selector: &policy_rules_api::Tags, tags: &policy_rules_api::Tags) -> bool {
    selector
        .iter()
        .all(|(k, v)| matches!(tags.get(k), Some(t) if v == "*" || t == v))
}

fn unresolved_warning(policy: &Policy, error: &dyn std::fmt::Display) -> String {
    format!(
        "unable to resolve TargetRef on policy: mesh:{} name:{} error:{:?}",
        policy.meta.mesh,
        policy.meta.name,
        error.to_string(),
    )
}
