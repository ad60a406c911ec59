use crate::{tags_match, unresolved_warning, MatchOptions, SelectionError, TypedMatchingPolicies};
use ahash::AHashMap;
use policy_rules_api::{meta::SERVICE_TAG, PolicyItem, TargetRef, TargetRefKind, Tags};
use policy_rules_core::{
    build_inbound_rules, build_rules, build_single_item_rules, sort_by_target_ref, FromRules,
    InboundListener, PolicyItemWithMeta, PolicyType, ResourceReader, ResourceRules, Result,
    ToRules,
};

/// Selects the policies of `policy_type` that apply to traffic leaving the
/// mesh toward the external service tagged `tags`, and builds their rules.
///
/// Egress serves every client from one listener, so there is a single
/// `from` rule set, keyed by the default listener. `to` items that target
/// the external service itself describe the same traffic and are folded
/// into it as mesh-wide `from` items.
pub fn egress_matched_policies(
    policy_type: &PolicyType,
    tags: &Tags,
    reader: &dyn ResourceReader,
    opts: &MatchOptions,
) -> Result<TypedMatchingPolicies> {
    let service = tags.get(SERVICE_TAG).map(String::as_str);
    tracing::debug!(policy_type = %policy_type.name, ?service, "matching egress policies");

    let mut warnings = Vec::new();
    let mut policies = Vec::new();
    for policy in reader.policies(&policy_type.name) {
        if !opts.include_shadow && policy.meta.is_shadow() {
            continue;
        }
        match selected_by_tags(policy.target_ref(), tags) {
            Ok(true) => policies.push(policy.clone()),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(policy = %policy.meta.name, %error, "failed to resolve target");
                warnings.push(unresolved_warning(policy, &error));
            }
        }
    }
    sort_by_target_ref(&mut policies);

    let mut from_items = Vec::new();
    let mut to_items = Vec::new();
    for policy in &policies {
        from_items.extend(PolicyItemWithMeta::from_items(policy));
        for (idx, item) in policy.spec.to.iter().enumerate() {
            if targets_service(&item.target_ref, service) {
                let from = PolicyItem::new(TargetRef::mesh(), item.default.clone());
                from_items.push(PolicyItemWithMeta::new(
                    &from,
                    &policy.meta,
                    policy.target_ref(),
                    idx,
                ));
            } else {
                to_items.push(PolicyItemWithMeta::new(
                    item,
                    &policy.meta,
                    policy.target_ref(),
                    idx,
                ));
            }
        }
    }
    tracing::trace!(
        policies = policies.len(),
        from = from_items.len(),
        to = to_items.len(),
        "split egress items"
    );

    let listener = InboundListener::default();
    let caps = &policy_type.capabilities;
    let mut from_rules = FromRules::default();
    if caps.from || caps.to {
        from_rules.rules = AHashMap::from_iter([(
            listener.clone(),
            build_rules(&from_items, policy_type, true)?,
        )]);
    }
    if caps.rules {
        from_rules.inbound_rules =
            AHashMap::from_iter([(listener, build_inbound_rules(&policies, policy_type)?)]);
    }

    let to_rules = if caps.to {
        ToRules {
            rules: build_rules(&to_items, policy_type, false)?,
            resource_rules: ResourceRules::build(&to_items, policy_type, reader)?,
        }
    } else {
        ToRules::default()
    };

    Ok(TypedMatchingPolicies {
        policy_type: policy_type.name.clone(),
        from_rules,
        to_rules,
        single_item_rules: build_single_item_rules(&policies, policy_type)?,
        dataplane_policies: policies,
        warnings,
        ..TypedMatchingPolicies::default()
    })
}

fn selected_by_tags(
    target_ref: &TargetRef,
    tags: &Tags,
) -> std::result::Result<bool, SelectionError> {
    match target_ref.kind {
        TargetRefKind::Mesh | TargetRefKind::MeshSubset => Ok(tags_match(
            &target_ref.tags.clone().unwrap_or_default(),
            tags,
        )),
        TargetRefKind::MeshService | TargetRefKind::MeshServiceSubset => {
            let mut selector = Tags::new();
            selector.insert(SERVICE_TAG.to_string(), target_ref.name().to_string());
            selector.extend(target_ref.tags.clone().unwrap_or_default());
            Ok(tags_match(&selector, tags))
        }
        TargetRefKind::MeshExternalService => {
            Ok(tags.get(SERVICE_TAG).map(String::as_str) == Some(target_ref.name()))
        }
        kind => Err(SelectionError::UnsupportedKind(kind)),
    }
}

fn targets_service(target_ref: &TargetRef, service: Option<&str>) -> bool {
    matches!(
        target_ref.kind,
        TargetRefKind::MeshService | TargetRefKind::MeshExternalService
    ) && service == Some(target_ref.name())
}

