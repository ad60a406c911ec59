//! Per-listener views over the policies matched for one proxy.

use crate::{
    error::{Error, Result},
    merge::merge_confs,
    policy::{origins, Origin, PolicyItemWithMeta, PolicyType},
    reader::ResourceReader,
    resource_rules::ResourceRules,
    rules::{build_rules, Rules},
    sort::sort_items,
};
use ahash::AHashMap;
use policy_rules_api::{
    gateway::WILDCARD_HOSTNAME, hash_matches, Policy, PolicyItem, ResourceType, TargetRef,
    TargetRefKind, Tags,
};
use serde_json::Value;
use std::fmt;

/// Tags synthesized items select route rules with.
pub const RULE_MATCHES_HASH_TAG: &str = "__rule-matches-hash__";

/// One proxy entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InboundListener {
    pub address: String,
    pub port: u32,
}

/// A gateway listener, qualified by the hostname it serves.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InboundListenerHostname {
    pub address: String,
    pub port: u32,
    hostname: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FromRules {
    /// Rules built from `from` sections.
    pub rules: AHashMap<InboundListener, Rules>,
    /// Rules built from `rules` sections.
    pub inbound_rules: AHashMap<InboundListener, Vec<InboundRule>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToRules {
    pub rules: Rules,
    pub resource_rules: ResourceRules,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GatewayToRules {
    pub by_listener: AHashMap<InboundListener, ToRules>,
    pub by_listener_and_hostname: AHashMap<InboundListenerHostname, ToRules>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GatewayRules {
    pub to_rules: GatewayToRules,
    pub from_rules: AHashMap<InboundListener, Rules>,
    pub inbound_rules: AHashMap<InboundListener, Vec<InboundRule>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SingleItemRules {
    pub rules: Rules,
}

/// A merged `rules` entry applying to every client of a listener.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundRule {
    pub conf: Value,
    pub origin: Vec<Origin>,
}

// === impl InboundListener ===

impl InboundListener {
    pub fn new(address: impl Into<String>, port: u32) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for InboundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

// === impl InboundListenerHostname ===

impl InboundListenerHostname {
    /// An empty hostname matches every host.
    pub fn new(address: impl Into<String>, port: u32, hostname: &str) -> Self {
        let hostname = if hostname.is_empty() {
            WILDCARD_HOSTNAME
        } else {
            hostname
        };
        Self {
            address: address.into(),
            port,
            hostname: hostname.to_string(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn listener(&self) -> InboundListener {
        InboundListener::new(self.address.clone(), self.port)
    }
}

impl fmt::Display for InboundListenerHostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.address, self.port, self.hostname)
    }
}

// === builders ===

/// Builds `from` rules, with negations, and inbound rules per listener.
/// Each listener's policies must already be ordered by precedence.
pub fn build_from_rules(
    by_listener: &AHashMap<InboundListener, Vec<Policy>>,
    policy_type: &PolicyType,
) -> Result<FromRules> {
    let mut from_rules = FromRules::default();
    for (listener, policies) in by_listener {
        if policy_type.capabilities.from {
            let items = policies
                .iter()
                .flat_map(PolicyItemWithMeta::from_items)
                .collect::<Vec<_>>();
            let rules = build_rules(&items, policy_type, true)?;
            tracing::trace!(%listener, rules = rules.len(), "built from rules");
            from_rules.rules.insert(listener.clone(), rules);
        }
        if policy_type.capabilities.rules {
            from_rules
                .inbound_rules
                .insert(listener.clone(), build_inbound_rules(policies, policy_type)?);
        }
    }
    Ok(from_rules)
}

/// Merges the `rules` sections of `policies` into one list of confs.
pub fn build_inbound_rules(
    policies: &[Policy],
    policy_type: &PolicyType,
) -> Result<Vec<InboundRule>> {
    let mut items = policies
        .iter()
        .flat_map(PolicyItemWithMeta::rule_items)
        .collect::<Vec<_>>();
    if items.is_empty() {
        return Ok(Vec::new());
    }
    sort_items(&mut items);

    let relevant = items.iter().collect::<Vec<_>>();
    let confs = items.iter().map(|i| i.conf.clone()).collect::<Vec<_>>();
    let origin = origins(&relevant, true);
    Ok(merge_confs(&confs, &policy_type.merge)?
        .into_iter()
        .map(|conf| InboundRule {
            conf,
            origin: origin.clone(),
        })
        .collect())
}

/// Builds tag-based `to` rules and resource rules from policies ordered by
/// precedence.
pub fn build_to_rules(
    policies: &[Policy],
    policy_type: &PolicyType,
    reader: &dyn ResourceReader,
) -> Result<ToRules> {
    if !policy_type.capabilities.to {
        return Ok(ToRules::default());
    }

    let rules = build_legacy_to_rules(policies, policy_type, reader)?;

    let resource_items = policies
        .iter()
        .filter(|p| p.target_ref().kind != TargetRefKind::MeshHttpRoute)
        .flat_map(PolicyItemWithMeta::to_items)
        .collect::<Vec<_>>();
    let resource_rules = ResourceRules::build(&resource_items, policy_type, reader)?;

    Ok(ToRules {
        rules,
        resource_rules,
    })
}

fn build_legacy_to_rules(
    policies: &[Policy],
    policy_type: &PolicyType,
    reader: &dyn ResourceReader,
) -> Result<Rules> {
    let mut items = Vec::new();
    for policy in policies {
        if policy
            .spec
            .to
            .iter()
            .any(|i| i.target_ref.kind == TargetRefKind::MeshHttpRoute)
        {
            continue;
        }
        let to = to_items_with_routes(policy, reader)?;
        items.extend(
            to.iter()
                .enumerate()
                .map(|(i, item)| PolicyItemWithMeta::new(item, &policy.meta, policy.target_ref(), i)),
        );
    }
    build_rules(&items, policy_type, false)
}

/// Expands the `to` items of a policy targeting a route into one item per
/// route rule, each selecting the rule by its match hash.
fn to_items_with_routes(policy: &Policy, reader: &dyn ResourceReader) -> Result<Vec<PolicyItem>> {
    let target_ref = policy.target_ref();
    if target_ref.kind != TargetRefKind::MeshHttpRoute {
        return Ok(policy.spec.to.clone());
    }

    let route = reader
        .list_or_empty(ResourceType::MeshHttpRoute)
        .iter()
        .filter(|r| policy.meta.is_referenced(target_ref.name(), &r.meta))
        .filter_map(|r| r.as_http_route())
        .last()
        .ok_or_else(|| Error::UnresolvedHttpRoute(target_ref.name().to_string()))?;

    let mut items = Vec::new();
    for to in &route.to {
        for rule in &to.rules {
            let tags = Some((RULE_MATCHES_HASH_TAG.to_string(), hash_matches(&rule.matches)))
                .into_iter()
                .collect::<Tags>();
            for item in &policy.spec.to {
                let target_ref = match to.target_ref.kind {
                    TargetRefKind::Mesh | TargetRefKind::MeshSubset => {
                        TargetRef::mesh_subset(tags.clone())
                    }
                    _ => TargetRef::mesh_service_subset(to.target_ref.name(), tags.clone()),
                };
                items.push(PolicyItem::new(target_ref, item.default.clone()));
            }
        }
    }
    Ok(items)
}

/// Builds `to` rules per gateway listener and per listener hostname, along
/// with the listeners' `from` and inbound rules.
pub fn build_gateway_rules(
    by_listener: &AHashMap<InboundListener, Vec<Policy>>,
    by_listener_hostname: &AHashMap<InboundListenerHostname, Vec<Policy>>,
    policy_type: &PolicyType,
    reader: &dyn ResourceReader,
) -> Result<GatewayRules> {
    let mut to_rules = GatewayToRules::default();
    for (listener, policies) in by_listener_hostname {
        to_rules.by_listener_and_hostname.insert(
            listener.clone(),
            build_to_rules(policies, policy_type, reader)?,
        );
    }
    for (listener, policies) in by_listener {
        to_rules
            .by_listener
            .insert(listener.clone(), build_to_rules(policies, policy_type, reader)?);
    }

    let from_rules = build_from_rules(by_listener, policy_type)?;
    Ok(GatewayRules {
        to_rules,
        from_rules: from_rules.rules,
        inbound_rules: from_rules.inbound_rules,
    })
}

/// Builds rules from the single `default` item of each policy.
pub fn build_single_item_rules(
    policies: &[Policy],
    policy_type: &PolicyType,
) -> Result<SingleItemRules> {
    if !policy_type.capabilities.single_item {
        return Ok(SingleItemRules::default());
    }
    let items = policies
        .iter()
        .filter_map(PolicyItemWithMeta::single_item)
        .collect::<Vec<_>>();
    Ok(SingleItemRules {
        rules: build_rules(&items, policy_type, false)?,
    })
}
