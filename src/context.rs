//! Execution context and per-node runtime state.
//!
//! The host orchestration runtime invokes each lifecycle operation with a
//! node identifier and a persisted key/value state. Instead of ambient
//! globals, both are captured in an explicit [`ExecutionContext`] passed to
//! every operation, together with a retry-signaling primitive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{GcpError, GcpLifecycleError};
use crate::resource::types::Scope;
use crate::workflows::DiscoveredResource;

/// Default delay before a suspended step is retried, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;

/// Verb of a recorded operation.
///
/// A resumed step needs to know what the recorded operation was doing:
/// a settled create left behind by an abandoned create step means the
/// resource exists, not that a pending delete finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// The operation creates the resource.
    #[default]
    Create,
    /// The operation deletes the resource.
    Delete,
}

/// Reference to an in-flight long-running operation, persisted so a
/// resumed step can re-attach instead of resubmitting the mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRef {
    /// Operation name.
    pub name: String,
    /// Scope the operation must be polled in.
    pub scope: Scope,
    /// What the operation does to the resource.
    #[serde(default)]
    pub kind: OperationKind,
}

/// Per-node runtime state, persisted by the host runtime across the
/// resource's lifecycle.
///
/// Created empty at node provisioning, populated once the resource is
/// confirmed created, read on every later lifecycle operation, and
/// cleared on delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeState {
    /// Provider-side resource identifier. Assigned exactly once at
    /// create; `None` until the create is confirmed and after delete.
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Resource name.
    #[serde(default)]
    pub name: Option<String>,
    /// Zone the resource lives in.
    #[serde(default)]
    pub zone: Option<String>,
    /// Machine type of the resource, for instances.
    #[serde(default)]
    pub machine_type: Option<String>,
    /// Internal IP, once assigned.
    #[serde(default)]
    pub ip: Option<String>,
    /// External IP, once assigned.
    #[serde(default)]
    pub public_ip_address: Option<String>,
    /// In-flight operation to re-attach to after a resume.
    #[serde(default)]
    pub operation: Option<OperationRef>,
    /// Whether the resource is managed outside this deployment.
    #[serde(default)]
    pub external: bool,
    /// SSH keys accumulated from related key nodes.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// Resources found by discovery, keyed by scope then type then ID.
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, BTreeMap<String, DiscoveredResource>>>,
    /// Free-form extras mirrored from provider responses.
    #[serde(default)]
    pub extras: HashMap<String, serde_json::Value>,
    /// When the state was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RuntimeState {
    /// Creates a fresh, empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            ..Self::default()
        }
    }

    /// Returns true once the resource has been confirmed created.
    ///
    /// Used for idempotent re-entry: a resumed create that already
    /// recorded its resource is a no-op.
    #[must_use]
    pub const fn resource_created(&self) -> bool {
        self.resource_id.is_some() && self.operation.is_none()
    }

    /// Records the identifier of a confirmed-created resource.
    pub fn record_created(&mut self, resource_id: impl Into<String>) {
        let id = resource_id.into();
        self.resource_id = Some(id.clone());
        self.name.get_or_insert(id);
        self.operation = None;
        self.updated_at = Utc::now();
    }

    /// Records an in-flight operation for later re-attachment.
    pub fn record_operation(&mut self, name: impl Into<String>, scope: Scope, kind: OperationKind) {
        self.operation = Some(OperationRef {
            name: name.into(),
            scope,
            kind,
        });
        self.updated_at = Utc::now();
    }

    /// Clears the in-flight operation after it completes.
    pub fn clear_operation(&mut self) {
        self.operation = None;
        self.updated_at = Utc::now();
    }

    /// Clears all resource attributes after a confirmed delete.
    pub fn clear(&mut self) {
        let external = self.external;
        *self = Self::new();
        self.external = external;
    }
}

/// Explicit execution context for a lifecycle operation: the node
/// identity, project defaults, and the node's persisted runtime state.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identifier of the orchestrated node instance.
    pub node_id: String,
    /// Project all calls are issued against.
    pub project: String,
    /// Default zone when a node does not pin one.
    pub default_zone: String,
    /// Persisted runtime state for the node.
    pub state: RuntimeState,
    /// Agent bootstrap script supplied by the host runtime, merged into
    /// instance startup scripts when agent installation is requested.
    pub agent_init_script: Option<String>,
}

impl ExecutionContext {
    /// Creates a context with empty runtime state.
    #[must_use]
    pub fn new(
        node_id: impl Into<String>,
        project: impl Into<String>,
        default_zone: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            project: project.into(),
            default_zone: default_zone.into(),
            state: RuntimeState::new(),
            agent_init_script: None,
        }
    }

    /// Attaches previously persisted runtime state.
    #[must_use]
    pub fn with_state(mut self, state: RuntimeState) -> Self {
        self.state = state;
        self
    }

    /// Attaches an agent bootstrap script.
    #[must_use]
    pub fn with_agent_init_script(mut self, script: impl Into<String>) -> Self {
        self.agent_init_script = Some(script.into());
        self
    }

    /// Resolves the effective zone for a node: the explicit zone, the
    /// zone already persisted in state, or the context default.
    #[must_use]
    pub fn effective_zone(&self, requested: Option<&str>) -> String {
        requested
            .map(ToString::to_string)
            .or_else(|| self.state.zone.clone())
            .unwrap_or_else(|| self.default_zone.clone())
    }

    /// Builds the retry signal for a suspended step: a retryable error
    /// telling the host runtime to re-invoke after the given delay.
    #[must_use]
    pub fn retry(&self, message: impl Into<String>, retry_after_secs: u64) -> GcpLifecycleError {
        GcpLifecycleError::Gcp(GcpError::NotReady {
            resource: self.node_id.clone(),
            message: message.into(),
            retry_after_secs,
        })
    }

    /// Builds the retry signal with the default delay.
    #[must_use]
    pub fn retry_default(&self, message: impl Into<String>) -> GcpLifecycleError {
        self.retry(message, DEFAULT_RETRY_DELAY_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_resource() {
        let state = RuntimeState::new();
        assert!(!state.resource_created());
        assert!(state.resource_id.is_none());
    }

    #[test]
    fn record_created_marks_resource() {
        let mut state = RuntimeState::new();
        state.record_created("web-server");
        assert!(state.resource_created());
        assert_eq!(state.resource_id.as_deref(), Some("web-server"));
        assert_eq!(state.name.as_deref(), Some("web-server"));
    }

    #[test]
    fn pending_operation_defers_created() {
        let mut state = RuntimeState::new();
        state.resource_id = Some(String::from("web-server"));
        state.record_operation(
            "operation-1",
            Scope::Zone(String::from("us-east1-b")),
            OperationKind::Create,
        );
        assert!(!state.resource_created());
        state.clear_operation();
        assert!(state.resource_created());
    }

    #[test]
    fn clear_resets_everything_but_external() {
        let mut state = RuntimeState::new();
        state.external = true;
        state.record_created("web-server");
        state.ip = Some(String::from("10.0.0.2"));
        state.clear();
        assert!(state.resource_id.is_none());
        assert!(state.ip.is_none());
        assert!(state.external);
    }

    #[test]
    fn retry_signal_is_retryable() {
        let ctx = ExecutionContext::new("node-1", "example-project", "us-east1-b");
        let err = ctx.retry("interface not yet assigned", 10);
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_secs(), Some(10));
    }

    #[test]
    fn effective_zone_prefers_request_then_state() {
        let mut ctx = ExecutionContext::new("node-1", "example-project", "us-east1-b");
        assert_eq!(ctx.effective_zone(None), "us-east1-b");
        ctx.state.zone = Some(String::from("us-west1-a"));
        assert_eq!(ctx.effective_zone(None), "us-west1-a");
        assert_eq!(ctx.effective_zone(Some("europe-west1-b")), "europe-west1-b");
    }
}
