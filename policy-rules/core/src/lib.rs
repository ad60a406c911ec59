#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Resolves targetRef policies into merged, ordered rules.
//!
//! Policies are matched against tag subsets ([`rules`]) or against concrete
//! destination resources ([`resource_rules`]). In both cases the matching
//! policy items are ordered by [`sort`] and merged by [`merge`].

pub mod aggregate;
mod error;
pub mod merge;
pub mod policy;
pub mod reader;
pub mod resolve;
pub mod resource_rules;
pub mod rules;
pub mod sort;
pub mod subset;

pub use self::{
    aggregate::{
        build_from_rules, build_gateway_rules, build_inbound_rules, build_single_item_rules,
        build_to_rules, FromRules, GatewayRules, GatewayToRules, InboundListener,
        InboundListenerHostname, InboundRule, SingleItemRules, ToRules, RULE_MATCHES_HASH_TAG,
    },
    error::{Error, Result},
    merge::{merge_confs, MergeField, MergeSchema},
    policy::{Capabilities, Origin, PolicyItemWithMeta, PolicyType},
    reader::{ResourceReader, Resources},
    resolve::resolve_target_ref,
    resource_rules::{ResourceRule, ResourceRules},
    rules::{as_subset, build_rules, Rule, Rules},
    sort::{sort_by_target_ref, sort_items},
    subset::{Element, Subset, SubsetIter, Tag},
};
