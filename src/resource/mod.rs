//! Resource model: typed records, descriptors, and the capability seam
//! every managed resource implements.

pub mod instance;
pub mod project;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::gcp::GcpClient;
use types::{Operation, ResourceDescriptor};

pub use instance::{build_instance_body, InstanceResource, DEFAULT_NETWORK};
pub use project::ProjectResource;
pub use types::{ResourceKind, Scope};

/// Capability seam for a managed cloud resource.
///
/// A mutating call either settles synchronously (`Ok(None)`) or hands
/// back a long-running operation (`Ok(Some(op))`) for the caller to
/// track. Creates surface an existing resource as
/// [`crate::error::GcpError::AlreadyExists`] so resumed steps can treat
/// resubmission as success.
#[async_trait]
pub trait CloudResource: Send + Sync {
    /// Identity of the resource.
    fn descriptor(&self) -> ResourceDescriptor;

    /// Whether the resource is managed outside this deployment. External
    /// resources are looked up at create and never deleted.
    fn is_external(&self) -> bool {
        false
    }

    /// Submits creation of the resource.
    async fn create(&self, client: &GcpClient) -> Result<Option<Operation>>;

    /// Submits deletion of the resource.
    async fn delete(&self, client: &GcpClient) -> Result<Option<Operation>>;

    /// Looks the resource up.
    async fn exists(&self, client: &GcpClient) -> Result<bool>;
}
