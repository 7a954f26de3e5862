#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use pactum_pipeline::render::{
    render_pipeline_pod, render_role, render_role_binding, render_scheduling_config_map,
    render_service_account, RoleScope, SCHEDULING_DATA_KEY,
};
use pactum_pipeline::{PipelineIdentity, PROMISE_ID_LABEL, RESOURCE_REQUEST_ID_LABEL};

fn identity() -> PipelineIdentity {
    PipelineIdentity::new("shop", "req-1", "ns-a")
}

fn selectors() -> BTreeMap<String, String> {
    let mut m = BTreeMap::new();
    m.insert("env".to_string(), "prod".to_string());
    m.insert("zone".to_string(), "eu".to_string());
    m
}

#[test]
fn service_account_carries_derived_name_and_promise_labels() {
    let sa = render_service_account(&identity());
    assert_eq!(sa.metadata.name.as_deref(), Some("shop-promise-pipeline"));
    assert_eq!(sa.metadata.namespace.as_deref(), Some("ns-a"));
    let labels = sa.metadata.labels.unwrap();
    assert_eq!(labels.get(PROMISE_ID_LABEL).map(String::as_str), Some("shop"));
    assert!(!labels.contains_key(RESOURCE_REQUEST_ID_LABEL));
}

#[test]
fn role_and_binding_reference_each_other() {
    let id = identity();
    let scope = RoleScope {
        api_groups: vec!["platform.pactum.dev".to_string()],
        resources: vec!["shops".to_string(), "shops/status".to_string()],
    };
    let role = render_role(&id, &scope);
    assert_eq!(role.metadata.name.as_deref(), Some("shop-promise-pipeline"));
    let rules = role.rules.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules[0].api_groups.as_deref(),
        Some(&["platform.pactum.dev".to_string()][..])
    );
    assert!(rules[0].verbs.contains(&"create".to_string()));

    let binding = render_role_binding(&id);
    assert_eq!(binding.role_ref.kind, "Role");
    assert_eq!(binding.role_ref.name, "shop-promise-pipeline");
    let subjects = binding.subjects.unwrap();
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].kind, "ServiceAccount");
    assert_eq!(subjects[0].name, "shop-promise-pipeline");
    assert_eq!(subjects[0].namespace.as_deref(), Some("ns-a"));
}

#[test]
fn config_map_publishes_selectors_as_yaml() {
    let cm = render_scheduling_config_map(&identity(), &selectors()).unwrap();
    assert_eq!(cm.metadata.name.as_deref(), Some("scheduling-shop"));
    let data = cm.data.unwrap();
    let rendered = data.get(SCHEDULING_DATA_KEY).unwrap();
    let parsed: BTreeMap<String, String> = serde_yaml::from_str(rendered).unwrap();
    assert_eq!(parsed, selectors());
}

#[test]
fn pipeline_pod_is_resource_scoped() {
    let pod = render_pipeline_pod(&identity(), "ghcr.io/pactum/pipeline:latest");
    assert_eq!(pod.metadata.name.as_deref(), Some("configure-shop"));
    let labels = pod.metadata.labels.unwrap();
    assert_eq!(labels.get(PROMISE_ID_LABEL).map(String::as_str), Some("shop"));
    assert_eq!(
        labels.get(RESOURCE_REQUEST_ID_LABEL).map(String::as_str),
        Some("req-1")
    );

    let spec = pod.spec.unwrap();
    assert_eq!(spec.service_account_name.as_deref(), Some("shop-promise-pipeline"));
    assert_eq!(spec.containers.len(), 1);
    assert_eq!(
        spec.containers[0].image.as_deref(),
        Some("ghcr.io/pactum/pipeline:latest")
    );
    let volumes = spec.volumes.unwrap();
    assert_eq!(
        volumes[0].config_map.as_ref().and_then(|c| c.name.as_deref()),
        Some("scheduling-shop")
    );
}

#[test]
fn rendering_twice_yields_identical_objects() {
    let id = identity();
    let a = render_scheduling_config_map(&id, &selectors()).unwrap();
    let b = render_scheduling_config_map(&id, &selectors()).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        render_pipeline_pod(&id, "img"),
        render_pipeline_pod(&id, "img")
    );
}
