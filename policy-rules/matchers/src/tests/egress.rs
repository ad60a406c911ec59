use super::*;
use crate::egress_matched_policies;
use policy_rules_api::resource::{ExternalEndpoint, MeshExternalServiceSpec};
use policy_rules_core::{InboundListener, ToRules};
use serde_json::json;

fn mk_external_service(name: &str, port: u32) -> Resource {
    Resource::new(
        mk_meta(name),
        ResourceSpec::MeshExternalService(MeshExternalServiceSpec {
            endpoint: ExternalEndpoint {
                port,
                protocol: None,
            },
        }),
    )
}

fn httpbin() -> Tags {
    mk_tags(&[(SERVICE_TAG, "httpbin")])
}

impl TestConfig {
    fn egress(&self, tags: &Tags) -> TypedMatchingPolicies {
        egress_matched_policies(
            &self.policy_type,
            tags,
            &self.resources,
            &MatchOptions::default(),
        )
        .expect("policies must match")
    }
}

#[test]
fn folds_service_destinations_into_from_rules() {
    init_tracing();

    let test = TestConfig::new(PolicyType::new("MeshTimeout").with_from().with_to())
        .with_resource(mk_external_service("api", 443))
        .with_policy(
            mk_policy("httpbin", TargetRef::mesh_external_service("httpbin"))
                .with_from(TargetRef::mesh_service("client"), json!({"timeout": "4s"})),
        )
        .with_policy(
            mk_policy("mesh", TargetRef::mesh())
                .with_from(TargetRef::mesh(), json!({"timeout": "1s"}))
                .with_to(TargetRef::mesh_service("httpbin"), json!({"timeout": "2s"}))
                .with_to(TargetRef::mesh_service("other"), json!({"timeout": "3s"}))
                .with_to(TargetRef::mesh_external_service("api"), json!({"timeout": "6s"})),
        )
        .with_policy(mk_policy("web", TargetRef::mesh_service("web")))
        .with_policy(mk_policy("gateway", TargetRef::mesh_gateway("edge")));

    let matched = test.egress(&httpbin());
    assert_eq!(names(&matched), vec!["mesh", "httpbin"]);
    assert_eq!(
        matched.warnings,
        vec![r#"unable to resolve TargetRef on policy: mesh:default name:gateway error:"unsupported targetRef kind MeshGateway""#]
    );

    let from = &matched.from_rules.rules[&InboundListener::default()];
    for (client, expected, msg) in [
        ("client", "4s", "client-specific item wins"),
        ("other", "2s", "destination items apply to every client"),
    ] {
        let conf = from
            .compute(&Element::from_iter([(SERVICE_TAG, client)]))
            .map(|r| r.conf.clone());
        assert_eq!(conf, Some(json!({"timeout": expected})), "{}", msg);
    }

    let to = &matched.to_rules;
    for (service, expected) in [("other", Some(json!({"timeout": "3s"}))), ("httpbin", None)] {
        let conf = to
            .rules
            .compute(&Element::from_iter([(SERVICE_TAG, service)]))
            .map(|r| r.conf.clone());
        assert_eq!(conf, expected, "to {}", service);
    }
    assert_eq!(to.resource_rules.len(), 1);
    let api = mk_external_service("api", 443).typed_identifier();
    assert_eq!(
        to.resource_rules.get(&api).map(|r| r.conf.clone()),
        Some(vec![json!({"timeout": "6s"})])
    );
}

#[test]
fn subsets_select_by_destination_tags() {
    init_tracing();

    let test = TestConfig::default()
        .with_policy(mk_policy(
            "v1",
            TargetRef::mesh_service_subset("httpbin", mk_tags(&[("version", "v1")])),
        ))
        .with_policy(mk_policy(
            "any-version",
            TargetRef::mesh_subset(mk_tags(&[("version", "*")])),
        ))
        .with_policy(mk_policy("mesh", TargetRef::mesh()));

    let mut v1 = httpbin();
    v1.insert("version".to_string(), "v1".to_string());

    assert_eq!(names(&test.egress(&httpbin())), vec!["mesh"]);
    assert_eq!(names(&test.egress(&v1)), vec!["mesh", "any-version", "v1"]);
}

#[test]
fn capabilities_gate_egress_sections() {
    init_tracing();

    let test = TestConfig::new(PolicyType::new("MeshTLS").with_rules()).with_policy(
        mk_policy("mesh", TargetRef::mesh())
            .with_to(TargetRef::mesh_service("httpbin"), json!({"a": 1}))
            .with_rule(json!({"mode": "Strict"})),
    );
    let matched = test.egress(&httpbin());

    assert!(matched.from_rules.rules.is_empty());
    assert_eq!(matched.to_rules, ToRules::default());
    let inbound = &matched.from_rules.inbound_rules[&InboundListener::default()];
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].conf, json!({"mode": "Strict"}));
}
