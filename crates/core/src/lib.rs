//! Pactum core types: the Work data model, classification predicates, and
//! scheduling-selector resolution.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `replicas` value marking a Work as a worker resource (dependency applied
/// to every eligible worker).
pub const WORKER_RESOURCE_REPLICAS: i32 = -1;

/// `replicas` value marking a Work as a single resource request.
pub const RESOURCE_REQUEST_REPLICAS: i32 = 1;

/// A Work describes a workload destined for a worker cluster: the manifests
/// to apply, the scheduling constraints narrowing which worker may receive
/// them, and a replica sentinel classifying the item.
///
/// Works are produced by the platform's API server and observed read-only
/// here; nothing in this crate mutates one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Work {
    #[serde(default)]
    pub workload: WorkloadTemplate,
    #[serde(default)]
    pub scheduling: WorkScheduling,
    /// Classification tag, not a count: -1 denotes a dependency, 1 denotes a
    /// resource request. Other values are reserved.
    #[serde(default)]
    pub replicas: i32,
}

/// The manifest workload to be deployed on a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadTemplate {
    #[serde(default)]
    pub manifests: Vec<Manifest>,
}

/// One opaque resource manifest. The document is carried verbatim and never
/// interpreted; workers apply it as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(pub serde_json::Value);

/// Scheduling constraints, split by where they were declared: on the Promise
/// itself or on the individual resource request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkScheduling {
    #[serde(default)]
    pub promise: Vec<SchedulingConfig>,
    #[serde(default)]
    pub resource: Vec<SchedulingConfig>,
}

/// One constraint a scheduler should honor when placing the Work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default)]
    pub target: SchedulingTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingTarget {
    /// Label-match criteria. Merge semantics across configs are
    /// last-write-wins per key; see [`Work::scheduling_selectors`].
    #[serde(default, rename = "matchLabels")]
    pub match_labels: BTreeMap<String, String>,
}

impl Work {
    /// True iff this Work represents a single resource request.
    pub fn is_resource_request(&self) -> bool {
        self.replicas == RESOURCE_REQUEST_REPLICAS
    }

    /// True iff this Work represents a dependency to apply to every worker.
    pub fn is_worker_resource(&self) -> bool {
        self.replicas == WORKER_RESOURCE_REPLICAS
    }

    /// Whether any scheduling constraint is present.
    ///
    /// Only the first entry of each config list is consulted here;
    /// [`Work::scheduling_selectors`] folds every entry.
    pub fn has_scheduling(&self) -> bool {
        let first_non_empty = |configs: &[SchedulingConfig]| {
            configs
                .first()
                .is_some_and(|c| !c.target.match_labels.is_empty())
        };
        first_non_empty(&self.scheduling.resource) || first_non_empty(&self.scheduling.promise)
    }

    /// Merge all scheduling configs into one label selector.
    ///
    /// Promise configs are folded first, resource configs second, each list
    /// in declaration order; on key collision the later entry wins, so
    /// resource-level constraints take precedence over promise-level ones.
    /// No configs means an empty selector (matches any worker).
    pub fn scheduling_selectors(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for config in self
            .scheduling
            .promise
            .iter()
            .chain(self.scheduling.resource.iter())
        {
            for (key, value) in &config.target.match_labels {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}
