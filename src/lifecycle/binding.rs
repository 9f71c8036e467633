//! IAM policy-binding lifecycle operations.
//!
//! Bindings have no provider-side identity of their own; create and
//! delete are the grant and revoke halves of the same read-modify-write
//! cycle in [`crate::iam`].

use crate::config::spec::PolicyBindingProperties;
use crate::error::Result;
use crate::gcp::GcpClient;
use crate::iam::{Policy, PolicyBindingHandler};

/// Policy-binding lifecycle operations over a [`GcpClient`].
#[derive(Debug, Clone, Copy)]
pub struct BindingOps<'a> {
    client: &'a GcpClient,
}

impl<'a> BindingOps<'a> {
    /// Creates the operations handle.
    #[must_use]
    pub const fn new(client: &'a GcpClient) -> Self {
        Self { client }
    }

    /// Grants the desired bindings.
    ///
    /// # Errors
    ///
    /// Returns a concurrent-modification error when the policy changed
    /// under the cycle; re-running the operation retries cleanly.
    pub async fn create(&self, props: &PolicyBindingProperties) -> Result<Policy> {
        PolicyBindingHandler::new(self.client).apply_add(props).await
    }

    /// Revokes the desired bindings.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::create`].
    pub async fn delete(&self, props: &PolicyBindingProperties) -> Result<Policy> {
        PolicyBindingHandler::new(self.client).apply_remove(props).await
    }
}
