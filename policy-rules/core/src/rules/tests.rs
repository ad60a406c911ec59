use super::*;
use crate::merge::MergeSchema;
use maplit::btreemap;
use policy_rules_api::Tags;
use serde_json::json;

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

fn mk_item(name: &str, target_ref: TargetRef, conf: Value) -> PolicyItemWithMeta {
    PolicyItemWithMeta {
        target_ref,
        conf,
        meta: ResourceMeta::new("default", name),
        top_level: TargetRef::mesh(),
        rule_index: 0,
    }
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn element(pairs: &[(&str, &str)]) -> Element {
    pairs.iter().copied().collect()
}

fn policy_type() -> PolicyType {
    PolicyType::new("MeshTrafficPermission").with_from()
}

#[test]
fn no_items() {
    let rules = build_rules(&[], &policy_type(), true).unwrap();
    assert!(rules.is_empty());
    assert_eq!(rules.compute(&element(&[("a", "b")])), None);
}

#[test]
fn more_specific_policies_override() {
    let _tracing = init_tracing();
    let items = vec![
        mk_item("a", TargetRef::mesh(), json!({"a": "A", "shared": "A"})),
        mk_item(
            "b",
            TargetRef::mesh_subset(tags(&[("env", "prod")])),
            json!({"b": "B", "shared": "B"}),
        ),
        mk_item(
            "c",
            TargetRef::mesh_service_subset("backend", tags(&[("version", "v1")])),
            json!({"c": "C", "shared": "C"}),
        ),
    ];
    let rules = build_rules(&items, &policy_type(), true).unwrap();

    let rule = rules
        .compute(&element(&[
            (SERVICE_TAG, "backend"),
            ("version", "v1"),
            ("env", "prod"),
        ]))
        .expect("rule must match");
    assert_eq!(
        rule.conf,
        json!({"a": "A", "b": "B", "c": "C", "shared": "C"})
    );
    assert_eq!(
        rule.origin.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );

    let rule = rules
        .compute(&element(&[(SERVICE_TAG, "backend"), ("env", "dev")]))
        .expect("rule must match");
    assert_eq!(rule.conf, json!({"a": "A", "shared": "A"}));
}

#[test]
fn conflicting_subsets_resolve_independently() {
    let items = vec![
        mk_item(
            "eu",
            TargetRef::mesh_service_subset("backend", tags(&[("region", "eu")])),
            json!({"eu": true}),
        ),
        mk_item(
            "us",
            TargetRef::mesh_service_subset("backend", tags(&[("region", "us")])),
            json!({"eu": false}),
        ),
    ];
    let rules = build_rules(&items, &policy_type(), true).unwrap();

    let rule = rules
        .compute(&element(&[(SERVICE_TAG, "backend"), ("region", "eu")]))
        .unwrap();
    assert_eq!(rule.conf, json!({"eu": true}));
    assert_eq!(rule.origin.len(), 1);
    assert_eq!(rule.origin[0].name, "eu");

    assert_eq!(
        rules.compute(&element(&[(SERVICE_TAG, "backend"), ("region", "asia")])),
        None
    );
}

#[test]
fn negated_cells_do_not_match_their_value() {
    let _tracing = init_tracing();
    let items = vec![
        mk_item(
            "service",
            TargetRef::mesh_service("backend"),
            json!({"base": "svc", "region": "other"}),
        ),
        mk_item(
            "eu",
            TargetRef::mesh_service_subset("backend", tags(&[("region", "eu")])),
            json!({"region": "eu"}),
        ),
    ];
    let rules = build_rules(&items, &policy_type(), true).unwrap();
    assert_eq!(
        rules.iter().map(|r| r.subset.to_string()).collect::<Vec<_>>(),
        vec![
            "{kuma.io/service=backend, region=eu}",
            "{kuma.io/service=backend, region=!eu}",
        ]
    );

    let outside_eu = rules
        .iter()
        .find(|r| r.subset.to_string() == "{kuma.io/service=backend, region=!eu}")
        .expect("negated cell must be emitted");
    assert_eq!(outside_eu.conf, json!({"base": "svc", "region": "other"}));
    assert_eq!(
        outside_eu.origin.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        vec!["service"]
    );

    let rule = rules
        .compute(&element(&[(SERVICE_TAG, "backend"), ("region", "eu")]))
        .expect("rule must match");
    assert_eq!(rule.conf, json!({"base": "svc", "region": "eu"}));
    assert_eq!(
        rule.origin.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        vec!["service", "eu"]
    );

    let conf = |pairs: &[(&str, &str)]| rules.compute(&element(pairs)).map(|r| r.conf.clone());
    for (pairs, expected, msg) in [
        (
            &[(SERVICE_TAG, "backend"), ("region", "us")][..],
            Some(json!({"base": "svc", "region": "other"})),
            "another region falls into the negated cell",
        ),
        (
            &[(SERVICE_TAG, "backend")][..],
            Some(json!({"base": "svc", "region": "other"})),
            "a missing region falls into the negated cell",
        ),
        (
            &[(SERVICE_TAG, "web"), ("region", "eu")][..],
            None,
            "other services are not selected",
        ),
    ] {
        assert_eq!(conf(pairs), expected, "{}", msg);
    }
}

#[test]
fn negated_subset_rules_are_ordered() {
    let items = vec![
        mk_item("mesh", TargetRef::mesh(), json!({"v": 1})),
        mk_item(
            "web",
            TargetRef::mesh_service("web"),
            json!({"v": 2}),
        ),
    ];
    let rules = build_rules(&items, &policy_type(), true).unwrap();
    assert_eq!(
        rules.iter().map(|r| r.subset.to_string()).collect::<Vec<_>>(),
        vec!["{kuma.io/service=web}", "{kuma.io/service=!web}"]
    );
    assert_eq!(rules[0].conf, json!({"v": 2}));
    assert_eq!(rules[1].conf, json!({"v": 1}));
}

#[test]
fn without_negations_for_a_single_key() {
    let items = vec![
        mk_item("mesh", TargetRef::mesh(), json!({"v": 1})),
        mk_item("web", TargetRef::mesh_service("web"), json!({"w": 2})),
        mk_item("web-2", TargetRef::mesh_service("web"), json!({"w": 3})),
    ];
    let rules = build_rules(&items, &policy_type(), false).unwrap();
    assert_eq!(
        rules.iter().map(|r| r.subset.to_string()).collect::<Vec<_>>(),
        vec!["{kuma.io/service=web}", "{}"]
    );
    assert_eq!(rules[0].conf, json!({"v": 1, "w": 3}));
    assert_eq!(rules[1].conf, json!({"v": 1}));
    assert_eq!(
        rules
            .compute_subset(&Some(Tag::new(SERVICE_TAG, "web")).into_iter().collect())
            .map(|r| &r.conf),
        Some(&json!({"v": 1, "w": 3}))
    );
}

#[test]
fn resource_targets_are_ignored() {
    let items = vec![
        mk_item("mesh", TargetRef::mesh(), json!({"v": 1})),
        mk_item(
            "external",
            TargetRef::mesh_external_service("httpbin"),
            json!({"v": 2}),
        ),
    ];
    let rules = build_rules(&items, &policy_type(), false).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].conf, json!({"v": 1}));
}

#[test]
fn gateway_targets_are_unsupported() {
    let items = vec![
        mk_item("mesh", TargetRef::mesh(), json!({})),
        mk_item("gw", TargetRef::mesh_gateway("edge"), json!({})),
    ];
    let err = build_rules(&items, &policy_type(), true).unwrap_err();
    assert!(
        matches!(err, Error::UnsupportedTargetRefKind(TargetRefKind::MeshGateway)),
        "{}",
        err
    );
}

#[test]
fn fan_out_emits_a_rule_per_value() {
    let pt = PolicyType::new("MeshHTTPRoute")
        .with_to()
        .with_merge_schema(MergeSchema::default().with_fan_out("hostnames").unwrap());
    let items = vec![mk_item(
        "route",
        TargetRef::mesh(),
        json!({"hostnames": ["a.com", "b.com"]}),
    )];
    let rules = build_rules(&items, &pt, false).unwrap();
    assert_eq!(
        rules.iter().map(|r| r.conf.clone()).collect::<Vec<_>>(),
        vec![json!({"hostnames": ["a.com"]}), json!({"hostnames": ["b.com"]})]
    );
}

#[test]
fn computes_typed_confs() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Conf {
        action: String,
    }

    let items = vec![mk_item("mesh", TargetRef::mesh(), json!({"action": "Allow"}))];
    let rules = build_rules(&items, &policy_type(), true).unwrap();
    let conf = rules
        .compute_conf::<Conf>(&element(&[(SERVICE_TAG, "web")]))
        .unwrap();
    assert_eq!(
        conf,
        Some(Conf {
            action: "Allow".to_string()
        })
    );

    let items = vec![mk_item("mesh", TargetRef::mesh(), json!({"action": 1}))];
    let rules = build_rules(&items, &policy_type(), true).unwrap();
    assert!(matches!(
        rules.compute_conf::<Conf>(&element(&[(SERVICE_TAG, "web")])),
        Err(Error::Encoding(_))
    ));
}

#[test]
fn oversized_components_are_rejected() {
    let keys = (0..=MAX_TAGS).map(|i| format!("key-{}", i)).collect::<Vec<_>>();
    let selector = keys
        .iter()
        .map(|k| (k.clone(), "v".to_string()))
        .collect::<Tags>();
    let items = vec![mk_item("wide", TargetRef::mesh_subset(selector), json!({}))];

    let err = build_rules(&items, &policy_type(), true).expect_err("must be rejected");
    assert!(
        matches!(err, Error::TooManyTags { count, limit } if count == MAX_TAGS + 1 && limit == MAX_TAGS),
        "{}",
        err
    );
}

#[test]
fn components_are_ordered_by_descending_ids() {
    let subsets = vec![
        as_subset(&TargetRef::mesh_service("a")).unwrap(),
        as_subset(&TargetRef::mesh_service("b")).unwrap(),
        as_subset(&TargetRef::mesh_service("a")).unwrap(),
        as_subset(&TargetRef::mesh_service("c")).unwrap(),
    ];
    assert_eq!(
        connected_components(&subsets),
        vec![vec![3], vec![1], vec![0, 2]]
    );

    let mut with_mesh = subsets;
    with_mesh.push(Subset::default());
    assert_eq!(connected_components(&with_mesh), vec![vec![0, 1, 2, 3, 4]]);
}

/// Every element built from the literal tags of the catalog resolves to the
/// same configuration as merging, in order, every item that selects it.
#[test]
fn partitioning_matches_brute_force() {
    let _tracing = init_tracing();
    let items = vec![
        mk_item("mesh", TargetRef::mesh(), json!({"mesh": 1, "v": "mesh"})),
        mk_item(
            "prod",
            TargetRef::mesh_subset(tags(&[("env", "prod")])),
            json!({"prod": 1, "v": "prod"}),
        ),
        mk_item(
            "backend-v1",
            TargetRef::mesh_service_subset("backend", tags(&[("version", "v1")])),
            json!({"backend": 1, "v": "backend-v1"}),
        ),
        mk_item(
            "frontend",
            TargetRef::mesh_service("frontend"),
            json!({"frontend": 1, "v": "frontend"}),
        ),
        mk_item(
            "dev-east",
            TargetRef::mesh_subset(tags(&[("env", "dev"), ("zone", "east")])),
            json!({"dev": 1, "v": "dev-east"}),
        ),
    ];
    let pt = policy_type();
    let rules = build_rules(&items, &pt, true).unwrap();

    let dimensions = btreemap! {
        SERVICE_TAG => vec!["backend", "frontend", "other"],
        "env" => vec!["prod", "dev", "other"],
        "version" => vec!["v1", "other"],
        "zone" => vec!["east", "other"],
    };

    let mut elements = vec![Vec::<(&str, &str)>::new()];
    for (key, values) in &dimensions {
        let mut next = Vec::new();
        for partial in &elements {
            next.push(partial.clone());
            for value in values {
                let mut e = partial.clone();
                e.push((*key, *value));
                next.push(e);
            }
        }
        elements = next;
    }

    let mut checked = 0;
    for pairs in elements.into_iter().filter(|e| !e.is_empty()) {
        let element = element(&pairs);
        let confs = items
            .iter()
            .filter(|i| as_subset(&i.target_ref).unwrap().contains_element(&element))
            .map(|i| i.conf.clone())
            .collect::<Vec<_>>();
        let expected = merge_confs(&confs, &pt.merge).unwrap().into_iter().next();

        let actual = rules.compute(&element).map(|r| r.conf.clone());
        assert_eq!(actual, expected, "element {:?}", pairs);
        checked += 1;
    }
    assert_eq!(checked, 4 * 4 * 3 * 3 - 1);
}
