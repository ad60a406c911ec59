//! Resolves target references that name concrete resources.

use crate::reader::ResourceReader;
use once_cell::sync::Lazy;
use policy_rules_api::{
    meta::{DISPLAY_NAME_LABEL, NAMESPACE_LABEL},
    Resource, ResourceIdentifier, ResourceMeta, ResourceOrigin, ResourceType, Selector,
    TargetRef, TargetRefKind, TypedResourceIdentifier,
};

/// Service names of the form `name_namespace_svc[_port]`.
static LEGACY_SERVICE_NAME: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^(.+)_(.+)_svc(?:_(\d+))?$").expect("legacy service name pattern")
});

/// Lists the resources `target_ref`, written on the resource `owner`,
/// refers to. Tag-selecting kinds other than `Mesh` and `MeshService`
/// resolve to nothing.
pub fn resolve_target_ref(
    target_ref: &TargetRef,
    owner: &ResourceMeta,
    reader: &dyn ResourceReader,
) -> Vec<TypedResourceIdentifier> {
    let resource_type = match ResourceType::from_kind(target_ref.kind) {
        Some(resource_type) => resource_type,
        None => return Vec::new(),
    };

    if resource_type == ResourceType::Mesh {
        return reader
            .get(ResourceType::Mesh, &ResourceIdentifier::mesh(&owner.mesh))
            .map(Resource::typed_identifier)
            .into_iter()
            .collect();
    }

    if let Some(labels) = target_ref.labels.as_ref() {
        let selector = Selector::from_map(labels.clone());
        return with_section(
            target_ref,
            reader
                .list_or_empty(resource_type)
                .iter()
                .filter(|r| r.meta.mesh == owner.mesh && selector.matches(&r.meta.labels)),
        );
    }

    if target_ref.kind == TargetRefKind::MeshService {
        if let Some(legacy) = LEGACY_SERVICE_NAME.captures(target_ref.name()) {
            let selector = Selector::from_iter([
                (DISPLAY_NAME_LABEL.to_string(), legacy[1].to_string()),
                (NAMESPACE_LABEL.to_string(), legacy[2].to_string()),
            ]);
            let port = legacy.get(3).and_then(|p| p.as_str().parse::<u32>().ok());
            tracing::trace!(name = %target_ref.name(), ?port, "resolving legacy service name");
            return reader
                .list_or_empty(resource_type)
                .iter()
                .filter(|r| r.meta.mesh == owner.mesh && selector.matches(&r.meta.labels))
                .filter_map(|r| {
                    let id = r.typed_identifier();
                    match port {
                        None => Some(id),
                        Some(port) => {
                            let port = r.ports().iter().find(|p| p.port == port)?;
                            Some(match port.name.as_deref() {
                                Some(name) => id.with_section_name(name),
                                None => id.with_section_name(port.port.to_string()),
                            })
                        }
                    }
                })
                .collect();
        }
    }

    let id = ResourceIdentifier {
        mesh: owner.mesh.clone(),
        zone: match owner.origin() {
            Some(ResourceOrigin::Zone) => owner.zone().unwrap_or_default().to_string(),
            _ => String::new(),
        },
        namespace: target_ref
            .namespace
            .as_deref()
            .or_else(|| owner.namespace())
            .unwrap_or_default()
            .to_string(),
        name: target_ref.name().to_string(),
    };
    with_section(target_ref, reader.get(resource_type, &id).into_iter())
}

/// Qualifies resolved resources with the target's section. Resources
/// lacking that section are dropped.
fn with_section<'r>(
    target_ref: &TargetRef,
    resources: impl Iterator<Item = &'r Resource>,
) -> Vec<TypedResourceIdentifier> {
    match target_ref.section_name.as_deref() {
        None => resources.map(Resource::typed_identifier).collect(),
        Some(section) => resources
            .filter(|r| r.has_section(section))
            .map(|r| r.typed_identifier().with_section_name(section))
            .collect(),
    }
}
