//! Lifecycle operations.
//!
//! The host orchestration runtime drives each node through create,
//! configure, and delete steps. The generic [`ensure_created`] and
//! [`ensure_deleted`] helpers implement the idempotent state machine
//! shared by every resource kind: re-entry after a suspend re-attaches
//! to the recorded operation instead of resubmitting, and a confirmed
//! resource is never created twice.

pub mod binding;
pub mod instance;
pub mod project;

use tracing::{debug, info};

use crate::context::{ExecutionContext, OperationKind};
use crate::error::{GcpError, GcpLifecycleError, Result};
use crate::gcp::{GcpClient, OperationTracker};
use crate::resource::CloudResource;

pub use binding::BindingOps;
pub use instance::InstanceOps;
pub use project::ProjectOps;

/// Drives a resource to the created state, one step per invocation.
///
/// The state machine, keyed off the node's runtime state:
/// - resource already confirmed: no-op;
/// - operation recorded: re-attach and check it once;
/// - otherwise: submit the create and suspend.
///
/// External resources are only looked up, never created.
///
/// # Errors
///
/// Returns a retryable [`GcpError::NotReady`] while the create is in
/// flight; fatal errors propagate unchanged. An already-existing
/// resource on submit counts as success.
pub async fn ensure_created(
    ctx: &mut ExecutionContext,
    client: &GcpClient,
    resource: &dyn CloudResource,
) -> Result<()> {
    let descriptor = resource.descriptor();

    if resource.is_external() {
        if !resource.exists(client).await? {
            return Err(GcpError::NotFound {
                resource: descriptor.to_string(),
            }
            .into());
        }
        info!("Using externally managed resource {descriptor}");
        ctx.state.external = true;
        ctx.state.record_created(descriptor.identifier.clone());
        return Ok(());
    }

    if ctx.state.resource_created() {
        debug!("Resource {descriptor} already created, nothing to do");
        return Ok(());
    }

    if let Some(reference) = ctx.state.operation.clone() {
        OperationTracker::new(client).check(&reference).await?;
        if reference.kind == OperationKind::Create {
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} created");
            return Ok(());
        }
        // A leftover delete settled; the resource is gone and must be
        // created fresh.
        ctx.state.clear_operation();
    }

    match resource.create(client).await {
        Ok(None) => {
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} created");
            Ok(())
        }
        Ok(Some(operation)) => {
            ctx.state.resource_id = Some(descriptor.identifier.clone());
            ctx.state.record_operation(
                operation.name.clone(),
                operation.scope(),
                OperationKind::Create,
            );
            Err(ctx.retry_default(format!("creation of {descriptor} in flight")))
        }
        Err(GcpLifecycleError::Gcp(GcpError::AlreadyExists { .. })) => {
            // Resubmission after a lost response: the resource is there.
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} already existed");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Like [`ensure_created`] but blocks until the create settles instead
/// of suspending between polls.
///
/// # Errors
///
/// Fatal errors propagate unchanged; the in-flight suspension of
/// [`ensure_created`] is absorbed by waiting.
pub async fn ensure_created_sync(
    ctx: &mut ExecutionContext,
    client: &GcpClient,
    resource: &dyn CloudResource,
) -> Result<()> {
    let descriptor = resource.descriptor();

    if resource.is_external() || ctx.state.resource_created() {
        return ensure_created(ctx, client, resource).await;
    }

    if let Some(reference) = ctx.state.operation.clone() {
        let operation = client.get_operation(&reference.scope, &reference.name).await?;
        OperationTracker::new(client).wait(operation).await?;
        if reference.kind == OperationKind::Create {
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} created");
            return Ok(());
        }
        ctx.state.clear_operation();
    }

    match resource.create(client).await {
        Ok(None) => {
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} created");
            Ok(())
        }
        Ok(Some(operation)) => {
            ctx.state.record_operation(
                operation.name.clone(),
                operation.scope(),
                OperationKind::Create,
            );
            OperationTracker::new(client).wait(operation).await?;
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} created");
            Ok(())
        }
        Err(GcpLifecycleError::Gcp(GcpError::AlreadyExists { .. })) => {
            ctx.state.record_created(descriptor.identifier.clone());
            info!("Resource {descriptor} already existed");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Drives a resource to the deleted state, one step per invocation, and
/// clears the runtime state once the delete is confirmed.
///
/// External resources are never deleted; a resource that is already
/// gone counts as success. A recorded operation left behind by an
/// abandoned create step is settled first, then the delete is still
/// submitted: only a confirmed *delete* operation clears the state.
///
/// # Errors
///
/// Returns a retryable [`GcpError::NotReady`] while the delete is in
/// flight; fatal errors propagate unchanged.
pub async fn ensure_deleted(
    ctx: &mut ExecutionContext,
    client: &GcpClient,
    resource: &dyn CloudResource,
) -> Result<()> {
    let descriptor = resource.descriptor();

    if resource.is_external() {
        info!("Leaving externally managed resource {descriptor} in place");
        ctx.state.clear();
        return Ok(());
    }

    if let Some(reference) = ctx.state.operation.clone() {
        OperationTracker::new(client).check(&reference).await?;
        if reference.kind == OperationKind::Delete {
            ctx.state.clear();
            info!("Resource {descriptor} deleted");
            return Ok(());
        }
        // A leftover create settled; the resource exists and the delete
        // still has to be submitted.
        ctx.state.clear_operation();
    }

    match resource.delete(client).await {
        Ok(None) | Err(GcpLifecycleError::Gcp(GcpError::NotFound { .. })) => {
            ctx.state.clear();
            info!("Resource {descriptor} deleted");
            Ok(())
        }
        Ok(Some(operation)) => {
            ctx.state.record_operation(
                operation.name.clone(),
                operation.scope(),
                OperationKind::Delete,
            );
            Err(ctx.retry_default(format!("deletion of {descriptor} in flight")))
        }
        Err(e) => Err(e),
    }
}

/// Like [`ensure_deleted`] but blocks until the delete settles.
///
/// # Errors
///
/// Fatal errors propagate unchanged.
pub async fn ensure_deleted_sync(
    ctx: &mut ExecutionContext,
    client: &GcpClient,
    resource: &dyn CloudResource,
) -> Result<()> {
    let descriptor = resource.descriptor();

    if resource.is_external() {
        return ensure_deleted(ctx, client, resource).await;
    }

    if let Some(reference) = ctx.state.operation.clone() {
        let operation = client.get_operation(&reference.scope, &reference.name).await?;
        OperationTracker::new(client).wait(operation).await?;
        if reference.kind == OperationKind::Delete {
            ctx.state.clear();
            info!("Resource {descriptor} deleted");
            return Ok(());
        }
        ctx.state.clear_operation();
    }

    match resource.delete(client).await {
        Ok(None) | Err(GcpLifecycleError::Gcp(GcpError::NotFound { .. })) => {
            ctx.state.clear();
            info!("Resource {descriptor} deleted");
            Ok(())
        }
        Ok(Some(operation)) => {
            OperationTracker::new(client).wait(operation).await?;
            ctx.state.clear();
            info!("Resource {descriptor} deleted");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
