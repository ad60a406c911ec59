use crate::{tags_match, unresolved_warning, MatchOptions, TypedMatchingPolicies};
use ahash::AHashMap;
use policy_rules_api::{
    meta::SERVICE_TAG, Dataplane, InboundState, MeshGatewaySpec, Policy, PolicyRole, Resource,
    ResourceMeta, ResourceOrigin, ResourceType, TargetRef, TargetRefKind, Tags,
};
use policy_rules_core::{
    build_from_rules, build_gateway_rules, build_single_item_rules, build_to_rules,
    sort_by_target_ref, InboundListener, InboundListenerHostname, PolicyType, ResourceReader,
    Result,
};

/// Why a policy's target could not be matched against a dataplane.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("couldn't resolve MeshHTTPRoute targetRef with name {0:?}")]
    UnresolvedHttpRoute(String),

    #[error("unsupported targetRef kind {0}")]
    UnsupportedKind(TargetRefKind),
}

/// The parts of a dataplane a policy selects.
#[derive(Debug, Default)]
struct Selection {
    inbounds: Vec<InboundListener>,
    gateway_listeners: Vec<InboundListenerHostname>,
    delegated_gateway: bool,
}

impl Selection {
    fn is_empty(&self) -> bool {
        self.inbounds.is_empty() && self.gateway_listeners.is_empty() && !self.delegated_gateway
    }
}

/// Selects the policies of `policy_type` that apply to `dataplane` and
/// builds their rules.
///
/// Policies whose target cannot be resolved are reported as warnings and
/// skipped. Errors building rules fail the whole call.
pub fn matched_policies(
    policy_type: &PolicyType,
    dataplane: &Dataplane,
    reader: &dyn ResourceReader,
    opts: &MatchOptions,
) -> Result<TypedMatchingPolicies> {
    let gateway = select_gateway(dataplane, reader);
    tracing::debug!(
        policy_type = %policy_type.name,
        dataplane = %dataplane.meta.name,
        gateway = ?gateway.map(|gw| &gw.meta.name),
        "matching policies"
    );

    let mut warnings = Vec::new();
    let mut dataplane_policies = Vec::new();
    let mut by_inbound = AHashMap::<InboundListener, Vec<Policy>>::new();
    let mut by_gateway_listener = AHashMap::<InboundListenerHostname, Vec<Policy>>::new();

    for policy in reader.policies(&policy_type.name) {
        if !opts.include_shadow && policy.meta.is_shadow() {
            tracing::trace!(policy = %policy.meta.name, "skipping shadow policy");
            continue;
        }

        let selection = match selected_by_policy(
            &policy.meta,
            policy.target_ref(),
            dataplane,
            gateway,
            reader,
        ) {
            Ok(selection) => selection,
            Err(error) => {
                tracing::warn!(policy = %policy.meta.name, %error, "failed to resolve target");
                warnings.push(unresolved_warning(policy, &error));
                continue;
            }
        };
        if selection.is_empty() {
            continue;
        }

        dataplane_policies.push(policy.clone());
        for listener in selection.gateway_listeners {
            by_gateway_listener
                .entry(listener)
                .or_default()
                .push(policy.clone());
        }
        for inbound in selection.inbounds {
            by_inbound.entry(inbound).or_default().push(policy.clone());
        }
    }

    sort_by_target_ref(&mut dataplane_policies);
    for policies in by_inbound.values_mut() {
        sort_by_target_ref(policies);
    }
    for policies in by_gateway_listener.values_mut() {
        sort_by_target_ref(policies);
    }

    Ok(TypedMatchingPolicies {
        policy_type: policy_type.name.clone(),
        from_rules: build_from_rules(&by_inbound, policy_type)?,
        to_rules: build_to_rules(&dataplane_policies, policy_type, reader)?,
        gateway_rules: build_gateway_rules(
            &by_inbound,
            &by_gateway_listener,
            policy_type,
            reader,
        )?,
        single_item_rules: build_single_item_rules(&dataplane_policies, policy_type)?,
        dataplane_policies,
        warnings,
    })
}

/// Returns true if `policy` selects any part of `dataplane`.
pub fn policy_matches(
    policy: &Policy,
    dataplane: &Dataplane,
    reader: &dyn ResourceReader,
) -> std::result::Result<bool, SelectionError> {
    let gateway = select_gateway(dataplane, reader);
    let selection = selected_by_policy(
        &policy.meta,
        policy.target_ref(),
        dataplane,
        gateway,
        reader,
    )?;
    Ok(!selection.is_empty())
}

/// Picks the builtin gateway configuring `dataplane`: among the gateways
/// visible from its zone, the one with the most specific matching selector.
pub fn select_gateway<'r>(
    dataplane: &Dataplane,
    reader: &'r dyn ResourceReader,
) -> Option<&'r Resource> {
    if !dataplane.is_builtin_gateway() {
        return None;
    }
    let tags = dataplane.gateway_tags()?;

    reader
        .list_or_empty(ResourceType::MeshGateway)
        .iter()
        .filter(|gw| gw.meta.mesh == dataplane.meta.mesh)
        .filter(|gw| gateway_in_zone(&gw.meta, dataplane))
        .filter_map(|gw| Some((gw.as_gateway()?.selector_score(tags)?, gw)))
        // Ties go to the first gateway by name.
        .max_by(|(s1, gw1), (s2, gw2)| {
            s1.cmp(s2)
                .then_with(|| gw2.meta.name.cmp(&gw1.meta.name))
        })
        .map(|(_, gw)| gw)
}

fn gateway_in_zone(gateway: &ResourceMeta, dataplane: &Dataplane) -> bool {
    match gateway.origin() {
        None | Some(ResourceOrigin::Global) => true,
        Some(ResourceOrigin::Zone) => match dataplane.meta.zone() {
            None => true,
            Some(zone) => gateway.is_local_zone(zone),
        },
    }
}

fn selected_by_policy(
    meta: &ResourceMeta,
    target_ref: &TargetRef,
    dataplane: &Dataplane,
    gateway: Option<&Resource>,
    reader: &dyn ResourceReader,
) -> std::result::Result<Selection, SelectionError> {
    if !selected_by_zone(meta, dataplane, gateway) || !selected_by_namespace(meta, dataplane) {
        return Ok(Selection::default());
    }

    let listeners = gateway.and_then(Resource::as_gateway);
    match target_ref.kind {
        TargetRefKind::Mesh | TargetRefKind::MeshSubset => {
            if !target_ref.supports_proxy(dataplane.proxy_type()) {
                return Ok(Selection::default());
            }
            Ok(selected_by_tags(
                &target_ref.tags.clone().unwrap_or_default(),
                dataplane,
                listeners,
            ))
        }

        TargetRefKind::MeshService | TargetRefKind::MeshServiceSubset => {
            let mut tags = Tags::new();
            tags.insert(SERVICE_TAG.to_string(), target_ref.name().to_string());
            tags.extend(target_ref.tags.clone().unwrap_or_default());
            Ok(selected_by_tags(&tags, dataplane, listeners))
        }

        TargetRefKind::MeshGateway => match gateway {
            Some(gw)
                if dataplane.is_builtin_gateway()
                    && meta.is_referenced(target_ref.name(), &gw.meta) =>
            {
                let selection = selected_by_tags(
                    &target_ref.tags.clone().unwrap_or_default(),
                    dataplane,
                    listeners,
                );
                Ok(Selection {
                    delegated_gateway: false,
                    ..selection
                })
            }
            _ => Ok(Selection::default()),
        },

        TargetRefKind::MeshHttpRoute => {
            let (route_meta, route) = reader
                .list_or_empty(ResourceType::MeshHttpRoute)
                .iter()
                .filter(|r| meta.is_referenced(target_ref.name(), &r.meta))
                .find_map(|r| Some((&r.meta, r.as_http_route()?)))
                .ok_or_else(|| {
                    SelectionError::UnresolvedHttpRoute(target_ref.name().to_string())
                })?;

            let route_target = route.target_ref.clone().unwrap_or_else(TargetRef::mesh);
            if route_target.kind == TargetRefKind::MeshHttpRoute {
                return Err(SelectionError::UnsupportedKind(route_target.kind));
            }
            selected_by_policy(route_meta, &route_target, dataplane, gateway, reader)
        }

        kind => Err(SelectionError::UnsupportedKind(kind)),
    }
}

/// Producer policies apply across zones. Otherwise a zone-authored policy
/// only selects proxies, or gateways, authored in its own zone.
fn selected_by_zone(
    policy: &ResourceMeta,
    dataplane: &Dataplane,
    gateway: Option<&Resource>,
) -> bool {
    if policy.policy_role() == PolicyRole::Producer {
        return true;
    }

    let meta = gateway.map(|gw| &gw.meta).unwrap_or(&dataplane.meta);
    if meta.origin() != Some(ResourceOrigin::Zone) {
        return true;
    }
    match (policy.origin(), policy.zone()) {
        (Some(ResourceOrigin::Zone), Some(zone)) => meta.is_local_zone(zone),
        _ => true,
    }
}

/// Consumer and workload-owner policies only apply within their namespace.
fn selected_by_namespace(policy: &ResourceMeta, dataplane: &Dataplane) -> bool {
    match policy.policy_role() {
        PolicyRole::Consumer | PolicyRole::WorkloadOwner => {
            policy.namespace().is_some() && policy.namespace() == dataplane.meta.namespace()
        }
        _ => true,
    }
}

fn selected_by_tags(
    selector: &Tags,
    dataplane: &Dataplane,
    gateway: Option<&MeshGatewaySpec>,
) -> Selection {
    let networking = &dataplane.networking;

    let mut inbounds = networking
        .inbound
        .iter()
        .filter(|i| i.state != InboundState::Ignored && tags_match(selector, &i.tags))
        .map(|i| InboundListener::new(dataplane.inbound_address(i), i.port))
        .collect::<Vec<_>>();

    let mut gateway_listeners = Vec::new();
    if let Some(gateway) = gateway {
        for listener in &gateway.listeners {
            let mut tags = dataplane.gateway_tags().cloned().unwrap_or_default();
            tags.extend(gateway.tags.clone());
            tags.extend(listener.tags.clone());
            if !tags_match(selector, &tags) {
                continue;
            }

            let inbound = InboundListener::new(networking.address.clone(), listener.port);
            if !inbounds.contains(&inbound) {
                inbounds.push(inbound);
            }
            gateway_listeners.push(InboundListenerHostname::new(
                networking.address.clone(),
                listener.port,
                listener.hostname(),
            ));
        }
    }

    let delegated_gateway = dataplane.is_delegated_gateway()
        && dataplane
            .gateway_tags()
            .map(|tags| tags_match(selector, tags))
            .unwrap_or(false);

    Selection {
        inbounds,
        gateway_listeners,
        delegated_gateway,
    }
}
