//! Render the auxiliary Kubernetes objects for a configure pipeline run.
//!
//! Rendering is pure: objects are built under the derived names and labels
//! but never created here. Ownership references and creation order belong
//! to the orchestrator.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, Pod, PodSpec, ServiceAccount, Volume,
    VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::{PipelineIdentity, PipelineLabels};

/// ConfigMap data key under which the resolved scheduling selectors are
/// published to the pipeline.
pub const SCHEDULING_DATA_KEY: &str = "scheduling";

const SCHEDULING_VOLUME: &str = "scheduling";
const SCHEDULING_MOUNT_PATH: &str = "/pactum/scheduling";

/// Resources the pipeline's Role grants access to. The promise's own CRD
/// group and plural are only known to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleScope {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
}

fn object_meta(name: String, id: &PipelineIdentity, labels: &PipelineLabels) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(id.namespace().to_string()),
        labels: Some(labels.as_map().clone()),
        ..Default::default()
    }
}

pub fn render_service_account(id: &PipelineIdentity) -> ServiceAccount {
    ServiceAccount {
        metadata: object_meta(id.service_account_name(), id, &id.labels()),
        ..Default::default()
    }
}

pub fn render_role(id: &PipelineIdentity, scope: &RoleScope) -> Role {
    let verbs = ["get", "list", "watch", "create", "update", "patch", "delete"]
        .iter()
        .map(|v| v.to_string())
        .collect();
    Role {
        metadata: object_meta(id.role_name(), id, &id.labels()),
        rules: Some(vec![PolicyRule {
            api_groups: Some(scope.api_groups.clone()),
            resources: Some(scope.resources.clone()),
            verbs,
            ..Default::default()
        }]),
    }
}

pub fn render_role_binding(id: &PipelineIdentity) -> RoleBinding {
    RoleBinding {
        metadata: object_meta(id.role_binding_name(), id, &id.labels()),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: id.role_name(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: id.service_account_name(),
            namespace: Some(id.namespace().to_string()),
            ..Default::default()
        }]),
    }
}

/// ConfigMap publishing the merged scheduling selectors, serialized as YAML
/// under [`SCHEDULING_DATA_KEY`].
pub fn render_scheduling_config_map(
    id: &PipelineIdentity,
    selectors: &BTreeMap<String, String>,
) -> Result<ConfigMap> {
    let rendered =
        serde_yaml::to_string(selectors).context("serializing scheduling selectors")?;
    let mut data = BTreeMap::new();
    data.insert(SCHEDULING_DATA_KEY.to_string(), rendered);
    Ok(ConfigMap {
        metadata: object_meta(id.config_map_name(), id, &id.labels()),
        data: Some(data),
        ..Default::default()
    })
}

/// Skeleton of the configure pipeline pod: resource-scoped labels, the
/// pipeline service account, and the scheduling ConfigMap mounted read-only.
pub fn render_pipeline_pod(id: &PipelineIdentity, image: &str) -> Pod {
    Pod {
        metadata: object_meta(id.configure_pipeline_name(), id, &id.pipeline_pod_labels()),
        spec: Some(PodSpec {
            service_account_name: Some(id.service_account_name()),
            restart_policy: Some("OnFailure".to_string()),
            containers: vec![Container {
                name: "pipeline".to_string(),
                image: Some(image.to_string()),
                volume_mounts: Some(vec![VolumeMount {
                    name: SCHEDULING_VOLUME.to_string(),
                    mount_path: SCHEDULING_MOUNT_PATH.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: SCHEDULING_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(id.config_map_name()),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
