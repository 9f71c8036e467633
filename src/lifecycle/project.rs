//! Project lifecycle operations.

use tracing::debug;

use crate::config::spec::ProjectProperties;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::gcp::GcpClient;
use crate::resource::ProjectResource;

use super::{ensure_created, ensure_deleted};

/// Lifecycle state reported by the provider for a usable project.
const ACTIVE_STATE: &str = "ACTIVE";

/// Project lifecycle operations over a [`GcpClient`].
#[derive(Debug, Clone, Copy)]
pub struct ProjectOps<'a> {
    client: &'a GcpClient,
}

impl<'a> ProjectOps<'a> {
    /// Creates the operations handle.
    #[must_use]
    pub const fn new(client: &'a GcpClient) -> Self {
        Self { client }
    }

    /// Creates the project (or adopts an external one) and confirms it
    /// is active.
    ///
    /// # Errors
    ///
    /// Returns a retryable not-ready while the provider is still
    /// activating the project.
    pub async fn create(&self, ctx: &mut ExecutionContext, props: &ProjectProperties) -> Result<()> {
        let resource = ProjectResource::new(props.clone());
        ensure_created(ctx, self.client, &resource).await?;

        let project = self.client.get_project(&props.id).await?;
        if project.lifecycle_state.as_deref() != Some(ACTIVE_STATE) {
            return Err(ctx.retry_default(format!(
                "project {} is {}",
                props.id,
                project.lifecycle_state.as_deref().unwrap_or("pending")
            )));
        }
        debug!("Project {} is active", props.id);
        Ok(())
    }

    /// Requests project deletion, clearing runtime state.
    ///
    /// # Errors
    ///
    /// Propagates API errors unchanged; a project that is already gone
    /// counts as success.
    pub async fn delete(&self, ctx: &mut ExecutionContext, props: &ProjectProperties) -> Result<()> {
        let resource = ProjectResource::new(props.clone());
        ensure_deleted(ctx, self.client, &resource).await
    }
}
