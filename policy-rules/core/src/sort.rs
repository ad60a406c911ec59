//! Precedence orders. Sorted lists run from lowest to highest precedence, so
//! merging them left to right lets the most specific policy win.

use crate::policy::PolicyItemWithMeta;
use policy_rules_api::{Policy, TargetRefKind};
use std::cmp::Ordering;

/// Orders whole policies by their top-level target.
pub fn sort_by_target_ref(policies: &mut [Policy]) {
    policies.sort_by(compare_policies);
}

/// Orders policy items by their top-level target, their authoring, and then
/// their own target.
pub fn sort_items(items: &mut [PolicyItemWithMeta]) {
    items.sort_by(compare_items);
}

fn compare_policies(p1: &Policy, p2: &Policy) -> Ordering {
    let (tr1, tr2) = (p1.target_ref(), p2.target_ref());
    tr1.kind
        .cmp(&tr2.kind)
        .then_with(|| p1.meta.origin().cmp(&p2.meta.origin()))
        .then_with(|| {
            if tr1.kind == TargetRefKind::MeshGateway {
                tr1.num_tags().cmp(&tr2.num_tags())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| p1.meta.policy_role().cmp(&p2.meta.policy_role()))
        // Ascending, unlike items: on a tie the greater name is merged last and wins.
        .then_with(|| p1.meta.display_name().cmp(p2.meta.display_name()))
}

fn compare_items(i1: &PolicyItemWithMeta, i2: &PolicyItemWithMeta) -> Ordering {
    i1.top_level
        .kind
        .cmp(&i2.top_level.kind)
        .then_with(|| i1.meta.origin().cmp(&i2.meta.origin()))
        .then_with(|| i1.meta.policy_role().cmp(&i2.meta.policy_role()))
        .then_with(|| i1.target_ref.kind.cmp(&i2.target_ref.kind))
        .then_with(|| {
            if i1.target_ref.kind == TargetRefKind::MeshService {
                i1.target_ref
                    .section_name
                    .is_some()
                    .cmp(&i2.target_ref.section_name.is_some())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| i2.meta.display_name().cmp(i1.meta.display_name()))
}
