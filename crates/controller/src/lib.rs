//! Pactum work controller: watches Work objects and stamps the
//! reconciler-assigned worker routing label.
//!
//! Re-queueing and back-off for failed passes belong to the surrounding
//! runtime; a failed reconcile here is logged, counted, and dropped.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use futures::TryStreamExt;
use kube::{
    api::{Api, Patch, PatchParams},
    core::DynamicObject,
    discovery::{Discovery, Scope},
    runtime::watcher::{self, Event},
    Client,
};
use metrics::counter;
use tracing::{debug, info, warn};

use pactum_core::Work;

/// CRD coordinates of the Work resource.
pub const WORK_GROUP: &str = "platform.pactum.dev";
pub const WORK_VERSION: &str = "v1alpha1";
pub const WORK_KIND: &str = "Work";

/// Label assigned by the reconciler to route a Work towards workers.
pub const CLUSTER_LABEL: &str = "cluster";
pub const WORKER_CLUSTER: &str = "worker";

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("work not found: {name}")]
    NotFound { name: String },
    #[error("decoding work spec: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] kube::Error),
}

/// Label map for a Work after reconciliation: existing labels preserved,
/// `cluster=worker` set.
pub fn worker_labels(existing: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let mut labels = existing.cloned().unwrap_or_default();
    labels.insert(CLUSTER_LABEL.to_string(), WORKER_CLUSTER.to_string());
    labels
}

/// Whether the routing label is already in place (patching again would only
/// feed the watch stream another no-op event).
pub fn has_worker_label(existing: Option<&BTreeMap<String, String>>) -> bool {
    existing.is_some_and(|l| l.get(CLUSTER_LABEL).map(String::as_str) == Some(WORKER_CLUSTER))
}

fn classification(work: &Work) -> &'static str {
    if work.is_resource_request() {
        "resource-request"
    } else if work.is_worker_resource() {
        "worker-resource"
    } else {
        "unclassified"
    }
}

/// One reconcile pass: fetch the Work, log its classification, and merge
/// the `cluster=worker` label into its metadata.
pub async fn reconcile_work(
    api: &Api<DynamicObject>,
    name: &str,
) -> Result<(), ControllerError> {
    counter!("work_reconcile_total", 1u64);
    let obj = api
        .get_opt(name)
        .await?
        .ok_or_else(|| ControllerError::NotFound { name: name.to_string() })?;

    let spec = obj
        .data
        .get("spec")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let work: Work = serde_json::from_value(spec)?;
    info!(
        work = %name,
        kind = classification(&work),
        scheduling = work.has_scheduling(),
        "reconciling work"
    );

    if has_worker_label(obj.metadata.labels.as_ref()) {
        debug!(work = %name, "worker routing label already set");
        return Ok(());
    }

    let labels = worker_labels(obj.metadata.labels.as_ref());
    let patch = serde_json::json!({ "metadata": { "labels": labels } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    counter!("work_labelled_total", 1u64);
    info!(work = %name, "worker routing label applied");
    Ok(())
}

async fn find_work_resource(client: Client) -> Result<(kube::core::ApiResource, bool)> {
    let discovery = Discovery::new(client).run().await?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == WORK_GROUP && ar.version == WORK_VERSION && ar.kind == WORK_KIND {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok((ar.clone(), namespaced));
            }
        }
    }
    Err(anyhow!(
        "Work CRD not served: {}/{}/{}",
        WORK_GROUP,
        WORK_VERSION,
        WORK_KIND
    ))
}

/// Watch Works and reconcile each applied object until the stream ends.
pub async fn run(namespace: Option<&str>) -> Result<()> {
    let client = Client::try_default()
        .await
        .context("building kube client")?;
    let (ar, namespaced) = find_work_resource(client.clone()).await?;

    let api: Api<DynamicObject> = if namespaced {
        match namespace {
            Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
            None => Api::all_with(client.clone(), &ar),
        }
    } else {
        Api::all_with(client.clone(), &ar)
    };

    let cfg = watcher::Config::default();
    let stream = watcher::watcher(api.clone(), cfg);
    futures::pin_mut!(stream);
    info!(group = WORK_GROUP, kind = WORK_KIND, ns = ?namespace, "work controller started");

    while let Some(ev) = stream.try_next().await? {
        match ev {
            Event::Applied(obj) => reconcile_logged(&api, &obj).await,
            Event::Deleted(obj) => {
                debug!(work = ?obj.metadata.name, "work deleted");
            }
            Event::Restarted(list) => {
                debug!(count = list.len(), "watch restart");
                for obj in list.iter() {
                    reconcile_logged(&api, obj).await;
                }
            }
        }
    }
    warn!("work watch stream ended");
    Ok(())
}

async fn reconcile_logged(api: &Api<DynamicObject>, obj: &DynamicObject) {
    let Some(name) = obj.metadata.name.as_deref() else {
        warn!("work event without a name");
        return;
    };
    if let Err(e) = reconcile_work(api, name).await {
        counter!("work_reconcile_errors_total", 1u64);
        warn!(work = %name, error = %e, "reconcile failed");
    }
}
