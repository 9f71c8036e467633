//! Project resource.
//!
//! Project creation settles synchronously from the adapter's point of
//! view: the resource-manager call returns once the project is queued,
//! and readiness is confirmed by lookup.

use async_trait::async_trait;
use tracing::info;

use crate::config::spec::ProjectProperties;
use crate::error::{GcpError, GcpLifecycleError, Result};
use crate::gcp::GcpClient;
use crate::resource::types::{
    Operation, ProjectRequestBody, ResourceDescriptor, ResourceKind, Scope,
};

use super::CloudResource;

/// A managed (or externally managed) project.
#[derive(Debug, Clone)]
pub struct ProjectResource {
    props: ProjectProperties,
}

impl ProjectResource {
    /// Creates a project resource from its declarative properties.
    #[must_use]
    pub const fn new(props: ProjectProperties) -> Self {
        Self { props }
    }

    /// Returns the project ID.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.props.id
    }
}

#[async_trait]
impl CloudResource for ProjectResource {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new(
            ResourceKind::Project,
            &self.props.id,
            &self.props.id,
            Scope::Global,
        )
    }

    fn is_external(&self) -> bool {
        self.props.use_external_resource
    }

    async fn create(&self, client: &GcpClient) -> Result<Option<Operation>> {
        info!("Creating project {}", self.props.id);
        client
            .create_project(&ProjectRequestBody {
                name: self.props.display_name().to_string(),
                project_id: self.props.id.clone(),
            })
            .await?;
        Ok(None)
    }

    async fn delete(&self, client: &GcpClient) -> Result<Option<Operation>> {
        info!("Deleting project {}", self.props.id);
        client.delete_project(&self.props.id).await?;
        Ok(None)
    }

    async fn exists(&self, client: &GcpClient) -> Result<bool> {
        match client.get_project(&self.props.id).await {
            Ok(_) => Ok(true),
            Err(GcpLifecycleError::Gcp(GcpError::NotFound { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
