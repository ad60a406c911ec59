use super::*;
use crate::reader::Resources;
use policy_rules_api::{
    meta::{DISPLAY_NAME_LABEL, NAMESPACE_LABEL},
    resource::{MeshMultiZoneServiceSpec, MeshServiceSpec},
    Policy, Port, Resource, ResourceMeta, ResourceSpec, TargetRef,
};
use serde_json::json;

fn mk_service(name: &str) -> Resource {
    Resource::new(
        ResourceMeta::new("mesh-1", name)
            .with_label(DISPLAY_NAME_LABEL, name)
            .with_label(NAMESPACE_LABEL, "ns"),
        ResourceSpec::MeshService(MeshServiceSpec {
            ports: vec![Port::named(8080, "http"), Port::named(9090, "grpc")],
            ..MeshServiceSpec::default()
        }),
    )
}

fn mk_catalog() -> Resources {
    Resources::default()
        .with_resource(Resource::mesh("mesh-1"))
        .with_resource(mk_service("backend"))
        .with_resource(mk_service("frontend"))
}

fn mk_policy(name: &str) -> Policy {
    Policy::new(
        ResourceMeta::new("mesh-1", name).with_label(NAMESPACE_LABEL, "ns"),
        TargetRef::mesh(),
    )
}

fn service_id(name: &str) -> TypedResourceIdentifier {
    TypedResourceIdentifier::new(
        ResourceType::MeshService,
        ResourceIdentifier {
            mesh: "mesh-1".to_string(),
            zone: String::new(),
            namespace: "ns".to_string(),
            name: name.to_string(),
        },
    )
}

fn mesh_id() -> TypedResourceIdentifier {
    TypedResourceIdentifier::new(ResourceType::Mesh, ResourceIdentifier::mesh("mesh-1"))
}

fn build(policies: &[Policy], reader: &Resources) -> ResourceRules {
    let items = policies
        .iter()
        .flat_map(PolicyItemWithMeta::to_items)
        .collect::<Vec<_>>();
    ResourceRules::build(&items, &PolicyType::new("MeshTimeout").with_to(), reader).unwrap()
}

#[test]
fn sectionless_policies_cover_every_section() {
    let catalog = mk_catalog();
    let rules = build(
        &[mk_policy("backend-timeout").with_to(TargetRef::mesh_service("backend"), json!({"t": 1}))],
        &catalog,
    );

    assert_eq!(rules.len(), 1);
    let rule = rules.get(&service_id("backend")).expect("section-less rule");
    assert_eq!(rule.conf, vec![json!({"t": 1})]);
    assert!(rules
        .get(&service_id("backend").with_section_name("http"))
        .is_none());

    let computed = rules
        .compute(&service_id("backend").with_section_name("http"), &catalog)
        .expect("falls back to the service");
    assert_eq!(computed.resource, service_id("backend"));
}

#[test]
fn more_specific_items_merge_last() {
    let catalog = mk_catalog();
    let policies = [
        mk_policy("section")
            .with_to(
                TargetRef::mesh_service("backend").with_section_name("http"),
                json!({"section": true, "v": "section"}),
            ),
        mk_policy("service").with_to(
            TargetRef::mesh_service("backend"),
            json!({"service": true, "v": "service"}),
        ),
        mk_policy("mesh").with_to(TargetRef::mesh(), json!({"mesh": true, "v": "mesh"})),
    ];
    let rules = build(&policies, &catalog);

    let conf = |id: &TypedResourceIdentifier| rules.get(id).map(|r| r.conf.clone());
    assert_eq!(conf(&mesh_id()), Some(vec![json!({"mesh": true, "v": "mesh"})]));
    assert_eq!(
        conf(&service_id("backend")),
        Some(vec![json!({"mesh": true, "service": true, "v": "service"})])
    );
    assert_eq!(
        conf(&service_id("backend").with_section_name("http")),
        Some(vec![
            json!({"mesh": true, "service": true, "section": true, "v": "section"})
        ])
    );

    let origin = rules
        .get(&service_id("backend").with_section_name("http"))
        .map(|r| {
            r.origin
                .iter()
                .map(|o| o.resource.name.as_str())
                .collect::<Vec<_>>()
        });
    assert_eq!(origin, Some(vec!["mesh", "service", "section"]));

    // Frontend has no rule of its own and falls back to the mesh.
    assert_eq!(
        rules
            .compute(&service_id("frontend"), &catalog)
            .map(|r| r.resource.clone()),
        Some(mesh_id())
    );
}

#[test]
fn origins_keep_rule_indexes() {
    let catalog = mk_catalog();
    let rules = build(
        &[mk_policy("p")
            .with_to(TargetRef::mesh_service("backend"), json!({"a": 1}))
            .with_to(TargetRef::mesh_service("backend"), json!({"b": 2}))],
        &catalog,
    );
    let rule = rules.get(&service_id("backend")).unwrap();
    assert_eq!(rule.conf, vec![json!({"a": 1, "b": 2})]);
    assert_eq!(
        rule.origin.iter().map(|o| o.rule_index).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[test]
fn unresolved_targets_are_skipped() {
    let catalog = mk_catalog();
    let rules = build(
        &[mk_policy("p")
            .with_to(TargetRef::mesh_service("unknown"), json!({"a": 1}))
            .with_to(
                TargetRef::mesh_service("backend").with_section_name("admin"),
                json!({"a": 2}),
            )],
        &catalog,
    );
    assert!(rules.is_empty());
}

#[test]
fn compute_falls_back_to_the_mesh() {
    let catalog = mk_catalog();
    let rules = build(
        &[mk_policy("p").with_to(TargetRef::mesh(), json!({"mesh": 1}))],
        &catalog,
    );

    let multi_zone = TypedResourceIdentifier::new(
        ResourceType::MeshMultiZoneService,
        ResourceIdentifier {
            mesh: "mesh-1".to_string(),
            name: "multi-backend".to_string(),
            ..ResourceIdentifier::default()
        },
    );
    for (id, msg) in [
        (service_id("unknown"), "unknown service"),
        (multi_zone.clone(), "unknown multi-zone service"),
        (
            service_id("backend").with_section_name("grpc"),
            "section of a service without rules",
        ),
    ] {
        assert_eq!(
            rules.compute(&id, &catalog).map(|r| r.resource.clone()),
            Some(mesh_id()),
            "{}",
            msg
        );
    }

    // Without a mesh resource there is nothing to fall back to.
    let without_mesh = Resources::default().with_resource(mk_service("backend"));
    assert!(rules.compute(&service_id("backend"), &without_mesh).is_none());
    assert!(ResourceRules::default()
        .compute(&mesh_id(), &catalog)
        .is_none());
}

#[test]
fn multi_zone_services_are_sectioned() {
    let catalog = mk_catalog().with_resource(Resource::new(
        ResourceMeta::new("mesh-1", "multi").with_label(DISPLAY_NAME_LABEL, "multi"),
        ResourceSpec::MeshMultiZoneService(MeshMultiZoneServiceSpec {
            ports: vec![Port::named(8080, "http")],
            ..MeshMultiZoneServiceSpec::default()
        }),
    ));
    let rules = build(
        &[mk_policy("p").with_to(
            TargetRef::mesh_multi_zone_service("multi")
                .with_namespace("")
                .with_section_name("http"),
            json!({"a": 1}),
        )],
        &catalog,
    );
    let id = TypedResourceIdentifier::new(
        ResourceType::MeshMultiZoneService,
        ResourceIdentifier {
            mesh: "mesh-1".to_string(),
            name: "multi".to_string(),
            ..ResourceIdentifier::default()
        },
    )
    .with_section_name("http");
    assert!(rules.get(&id).is_some());
    assert!(rules.get(&id.without_section_name()).is_none());
}
