//! Long-running operation tracking.
//!
//! Mutating compute calls return an operation handle that settles later.
//! Two consumption modes are offered: [`OperationTracker::wait`] polls
//! until the operation settles, for steps that must observe the result
//! before continuing; [`OperationTracker::check`] reads the status once
//! and signals a retryable not-ready so the host runtime can suspend the
//! step instead of blocking a worker.
//!
//! A settled operation with an embedded error payload is fatal: retrying
//! the originating call could double-provision, so it is never re-polled.

use std::time::Duration;
use tracing::{debug, info};

use crate::context::{OperationKind, OperationRef, DEFAULT_RETRY_DELAY_SECS};
use crate::error::{GcpError, Result};
use crate::resource::types::{basename, Operation, Scope};

use super::client::GcpClient;

/// Interval between polls while waiting synchronously.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Give up waiting synchronously after this many polls (10 minutes).
const MAX_POLLS: u32 = 300;

/// Polls and settles long-running operations through a [`GcpClient`].
#[derive(Debug, Clone, Copy)]
pub struct OperationTracker<'a> {
    client: &'a GcpClient,
}

impl<'a> OperationTracker<'a> {
    /// Creates a tracker over the given client.
    #[must_use]
    pub const fn new(client: &'a GcpClient) -> Self {
        Self { client }
    }

    /// Polls the operation until it settles, then inspects the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::OperationFailed`] when the operation settles
    /// with an error payload, and [`GcpError::NotReady`] if it has not
    /// settled after ten minutes of polling.
    pub async fn wait(&self, operation: Operation) -> Result<Operation> {
        let scope = operation.scope();
        let name = operation.name.clone();
        let mut current = operation;

        for _ in 0..MAX_POLLS {
            if current.is_done() {
                return settle(current);
            }
            debug!("Operation {name} is {:?}, polling again", current.status);
            tokio::time::sleep(POLL_INTERVAL).await;
            current = self.client.get_operation(&scope, &name).await?;
        }

        Err(GcpError::not_ready(
            name,
            "operation did not settle within the wait window",
            DEFAULT_RETRY_DELAY_SECS,
        )
        .into())
    }

    /// Reads the operation status once.
    ///
    /// # Errors
    ///
    /// Returns a retryable [`GcpError::NotReady`] while the operation is
    /// still in flight, and [`GcpError::OperationFailed`] when it settled
    /// with an error payload.
    pub async fn check(&self, reference: &OperationRef) -> Result<Operation> {
        let current = self
            .client
            .get_operation(&reference.scope, &reference.name)
            .await?;

        if current.is_done() {
            return settle(current);
        }

        debug!(
            "Operation {} is {:?}, suspending",
            reference.name, current.status
        );
        Err(GcpError::not_ready(
            reference.name.clone(),
            "operation still in flight",
            DEFAULT_RETRY_DELAY_SECS,
        )
        .into())
    }

    /// Re-attaches to an operation recorded before a suspend and reads
    /// its status once, like [`Self::check`].
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::check`].
    pub async fn reattach(&self, scope: Scope, name: &str) -> Result<Operation> {
        self.check(&OperationRef {
            name: name.to_string(),
            scope,
            kind: OperationKind::default(),
        })
        .await
    }
}

/// Maps a settled operation to its outcome.
fn settle(operation: Operation) -> Result<Operation> {
    if let Some(detail) = operation.error_detail() {
        let resource = operation
            .target_link
            .as_deref()
            .map_or(operation.name.as_str(), basename)
            .to_string();
        return Err(GcpError::OperationFailed {
            resource,
            code: detail.code.clone(),
            message: detail.message.clone(),
        }
        .into());
    }

    info!("Operation {} settled successfully", operation.name);
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GcpLifecycleError;
    use crate::resource::types::{OperationError, OperationErrorDetail, OperationStatus};

    fn done_operation(error: Option<OperationError>) -> Operation {
        Operation {
            name: String::from("operation-1"),
            status: OperationStatus::Done,
            zone: None,
            region: None,
            target_link: Some(String::from(
                "https://compute.example/projects/p/zones/us-east1-b/instances/web-server",
            )),
            error,
        }
    }

    #[test]
    fn settle_passes_through_success() {
        let op = settle(done_operation(None)).expect("settles cleanly");
        assert_eq!(op.name, "operation-1");
    }

    #[test]
    fn settle_maps_error_payload_to_operation_failed() {
        let err = settle(done_operation(Some(OperationError {
            errors: vec![OperationErrorDetail {
                code: String::from("QUOTA_EXCEEDED"),
                message: String::from("Quota 'CPUS' exceeded"),
            }],
        })))
        .expect_err("settles with failure");

        match err {
            GcpLifecycleError::Gcp(GcpError::OperationFailed {
                resource,
                code,
                message,
            }) => {
                assert_eq!(resource, "web-server");
                assert_eq!(code, "QUOTA_EXCEEDED");
                assert!(message.contains("CPUS"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(settle(done_operation(Some(OperationError { errors: vec![] }))).is_ok());
    }
}
