//! Pactum pipeline identity: deterministic names and labels for the
//! auxiliary objects a promise's configure pipeline needs.
//!
//! Everything here is a pure function of `(promise id, resource request id,
//! namespace)`. The derived names double as lookup keys for the
//! orchestrator's "does this object already exist" checks, so identical
//! inputs must always yield identical strings.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::Serialize;

pub mod render;

/// Label key carrying the promise identifier.
pub const PROMISE_ID_LABEL: &str = "promise-id";

/// Label key carrying the resource-request identifier.
pub const RESOURCE_REQUEST_ID_LABEL: &str = "resource-request-id";

const CONFIGURE_PIPELINE_TYPE: &str = "configure";

/// Identity of one pipeline run, scoped to a promise, a resource request,
/// and a namespace. Recomputed on demand; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineIdentity {
    promise_id: String,
    resource_request_id: String,
    namespace: String,
}

impl PipelineIdentity {
    pub fn new(
        promise_id: impl Into<String>,
        resource_request_id: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            promise_id: promise_id.into(),
            resource_request_id: resource_request_id.into(),
            namespace: namespace.into(),
        }
    }

    pub fn promise_id(&self) -> &str {
        &self.promise_id
    }

    pub fn resource_request_id(&self) -> &str {
        &self.resource_request_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the configure pipeline itself: pipeline type + promise id.
    pub fn configure_pipeline_name(&self) -> String {
        format!("{}-{}", CONFIGURE_PIPELINE_TYPE, self.promise_id)
    }

    pub fn service_account_name(&self) -> String {
        format!("{}-promise-pipeline", self.promise_id)
    }

    pub fn role_name(&self) -> String {
        format!("{}-promise-pipeline", self.promise_id)
    }

    pub fn role_binding_name(&self) -> String {
        format!("{}-promise-pipeline", self.promise_id)
    }

    pub fn config_map_name(&self) -> String {
        format!("scheduling-{}", self.promise_id)
    }

    /// Labels for promise-scoped objects: promise id only.
    pub fn labels(&self) -> PipelineLabels {
        PipelineLabels::new().with_promise_id(&self.promise_id)
    }

    /// Labels for the pipeline pod of a resource-scoped run: promise id plus
    /// resource-request id.
    pub fn pipeline_pod_labels(&self) -> PipelineLabels {
        self.labels().with_resource_request_id(&self.resource_request_id)
    }
}

/// Immutable label set attached to pipeline objects.
///
/// A persistent builder: every `with_*` call leaves `self` untouched and
/// returns a new set, so label sets can be shared across concurrent
/// reconciliation passes without aliasing surprises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PipelineLabels(BTreeMap<String, String>);

impl PipelineLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// New set with `promise-id` set to `id`. Empty ids are stored verbatim.
    #[must_use]
    pub fn with_promise_id(&self, id: &str) -> Self {
        self.with(PROMISE_ID_LABEL, id)
    }

    /// New set extending this one with `resource-request-id`.
    #[must_use]
    pub fn with_resource_request_id(&self, id: &str) -> Self {
        self.with(RESOURCE_REQUEST_ID_LABEL, id)
    }

    fn with(&self, key: &str, value: &str) -> Self {
        let mut labels = self.0.clone();
        labels.insert(key.to_string(), value.to_string());
        Self(labels)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names_follow_the_naming_scheme() {
        let id = PipelineIdentity::new("shop", "req-1", "ns-a");
        assert_eq!(id.configure_pipeline_name(), "configure-shop");
        assert_eq!(id.service_account_name(), "shop-promise-pipeline");
        assert_eq!(id.role_name(), "shop-promise-pipeline");
        assert_eq!(id.role_binding_name(), "shop-promise-pipeline");
        assert_eq!(id.config_map_name(), "scheduling-shop");
        assert_eq!(id.namespace(), "ns-a");
        assert_eq!(id.promise_id(), "shop");
        assert_eq!(id.resource_request_id(), "req-1");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = PipelineIdentity::new("shop", "req-1", "ns-a");
        let b = PipelineIdentity::new("shop", "req-1", "ns-a");
        assert_eq!(a.configure_pipeline_name(), b.configure_pipeline_name());
        assert_eq!(a.service_account_name(), b.service_account_name());
        assert_eq!(a.config_map_name(), b.config_map_name());
        assert_eq!(a.pipeline_pod_labels(), b.pipeline_pod_labels());
    }

    #[test]
    fn promise_labels_carry_only_the_promise_id() {
        let labels = PipelineIdentity::new("shop", "req-1", "ns-a").labels();
        assert_eq!(
            labels.as_map().get(PROMISE_ID_LABEL).map(String::as_str),
            Some("shop")
        );
        assert!(!labels.as_map().contains_key(RESOURCE_REQUEST_ID_LABEL));
    }

    #[test]
    fn pod_labels_extend_promise_labels() {
        let labels = PipelineIdentity::new("shop", "req-1", "ns-a").pipeline_pod_labels();
        assert_eq!(
            labels.as_map().get(PROMISE_ID_LABEL).map(String::as_str),
            Some("shop")
        );
        assert_eq!(
            labels
                .as_map()
                .get(RESOURCE_REQUEST_ID_LABEL)
                .map(String::as_str),
            Some("req-1")
        );
        assert_eq!(labels.as_map().len(), 2);
    }

    #[test]
    fn builder_does_not_mutate_its_parent() {
        let base = PipelineLabels::new().with_promise_id("shop");
        let extended = base.with_resource_request_id("req-1");
        assert!(!base.as_map().contains_key(RESOURCE_REQUEST_ID_LABEL));
        assert_eq!(extended.as_map().len(), 2);

        // Unrelated builders do not interfere with each other.
        let other = PipelineLabels::new().with_promise_id("pay");
        assert_eq!(
            base.as_map().get(PROMISE_ID_LABEL).map(String::as_str),
            Some("shop")
        );
        assert_eq!(
            other.as_map().get(PROMISE_ID_LABEL).map(String::as_str),
            Some("pay")
        );
    }

    #[test]
    fn empty_identifiers_are_stored_verbatim() {
        let labels = PipelineLabels::new().with_promise_id("");
        assert_eq!(
            labels.as_map().get(PROMISE_ID_LABEL).map(String::as_str),
            Some("")
        );

        let id = PipelineIdentity::new("", "", "ns");
        assert_eq!(id.configure_pipeline_name(), "configure-");
        assert_eq!(id.config_map_name(), "scheduling-");
    }
}
