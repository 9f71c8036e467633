//! Deployment fan-out.
//!
//! Turns a discovery result into one deployment group and one batch of
//! member deployments on the companion orchestration service. However
//! many resources discovery found, the whole fan-out is exactly two
//! service calls: one group upsert and one bundled add-deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::spec::DiscoveryProperties;
use crate::context::ExecutionContext;
use crate::error::{DeployError, Result};
use crate::gcp::GcpClient;

use super::discovery::DiscoveryMap;

/// Label key marking a deployment group as an environment.
pub const ENV_TYPE_LABEL: &str = "csys-env-type";

/// Label value marking a deployment group as an environment.
pub const ENV_TYPE_VALUE: &str = "environment";

/// Label key linking a member deployment to its parent.
pub const PARENT_LABEL: &str = "csys-obj-parent";

/// Request timeout for deployment-service calls, in seconds.
const DEPLOY_TIMEOUT_SECS: u64 = 30;

/// A single key/value label on a group or deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label key.
    pub key: String,
    /// Label value.
    pub value: String,
}

/// A deployment group to upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentGroup {
    /// Group ID.
    pub id: String,
    /// Blueprint every member deployment is instantiated from.
    pub blueprint_id: String,
    /// Group labels.
    pub labels: Vec<Label>,
}

/// Inputs handed to each member deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInputs {
    /// Name of the discovered cluster the deployment manages.
    pub kubernetes_cluster_name: String,
    /// Zone the cluster lives in.
    pub zone: String,
}

/// A member deployment to create inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Deployment ID, `{group}-{resource}`.
    pub id: String,
    /// Blueprint inputs.
    pub inputs: DeploymentInputs,
    /// Deployment labels.
    pub labels: Vec<Label>,
}

/// A planned fan-out: the group plus its member deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentBatch {
    /// The group to upsert.
    pub group: DeploymentGroup,
    /// The member deployments to add, one per discovered resource.
    pub deployments: Vec<DeploymentSpec>,
}

/// Seam to the companion deployment-orchestration service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeploymentService: Send + Sync {
    /// Creates or updates a deployment group.
    async fn put_deployment_group(&self, group: &DeploymentGroup) -> Result<()>;

    /// Adds member deployments to a group in one call.
    async fn add_deployments(&self, group_id: &str, deployments: &[DeploymentSpec]) -> Result<()>;
}

/// Plans the fan-out for a discovery result.
///
/// Deployment IDs are `{parent}-{resource}`; the group is labeled as an
/// environment and every member carries a parent label, so the host UI
/// can render the hierarchy.
#[must_use]
pub fn plan_deployments(
    parent: &str,
    blueprint_id: &str,
    discovered: &DiscoveryMap,
) -> DeploymentBatch {
    let group = DeploymentGroup {
        id: parent.to_string(),
        blueprint_id: blueprint_id.to_string(),
        labels: vec![Label {
            key: ENV_TYPE_LABEL.to_string(),
            value: ENV_TYPE_VALUE.to_string(),
        }],
    };

    let deployments = discovered
        .iter()
        .flat_map(|(zone, per_type)| {
            per_type.values().flat_map(move |by_id| {
                by_id.values().map(move |resource| DeploymentSpec {
                    id: format!("{parent}-{}", resource.name),
                    inputs: DeploymentInputs {
                        kubernetes_cluster_name: resource.name.clone(),
                        zone: zone.clone(),
                    },
                    labels: vec![Label {
                        key: PARENT_LABEL.to_string(),
                        value: parent.to_string(),
                    }],
                })
            })
        })
        .collect();

    DeploymentBatch { group, deployments }
}

/// Executes a planned fan-out: one group upsert, then one bundled
/// add-deployments call when there is anything to add.
///
/// # Errors
///
/// Propagates deployment-service errors unchanged.
pub async fn deploy(service: &dyn DeploymentService, batch: &DeploymentBatch) -> Result<()> {
    service.put_deployment_group(&batch.group).await?;
    if batch.deployments.is_empty() {
        debug!("No resources discovered, group {} left empty", batch.group.id);
        return Ok(());
    }
    service
        .add_deployments(&batch.group.id, &batch.deployments)
        .await?;
    info!(
        "Added {} deployment(s) to group {}",
        batch.deployments.len(),
        batch.group.id
    );
    Ok(())
}

/// Discovers resources, persists the result in runtime state, and fans
/// out the deployments.
///
/// # Errors
///
/// Propagates discovery and deployment-service errors unchanged.
pub async fn discover_and_deploy(
    ctx: &mut ExecutionContext,
    client: &GcpClient,
    service: &dyn DeploymentService,
    props: &DiscoveryProperties,
) -> Result<DeploymentBatch> {
    let discovered = super::discovery::discover(client, props).await?;
    ctx.state.resources = discovered.clone();

    let batch = plan_deployments(&ctx.node_id, &props.blueprint_id, &discovered);
    deploy(service, &batch).await?;
    Ok(batch)
}

/// REST client for the companion deployment-orchestration service.
#[derive(Debug, Clone)]
pub struct RestDeploymentService {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestDeploymentService {
    /// Creates a client for the service at the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEPLOY_TIMEOUT_SECS))
            .build()
            .map_err(|e| DeployError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attaches an API token sent as a bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<()> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| DeployError::network(format!("{what} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeployError::request_failed(
            status.as_u16(),
            format!("{what}: {}", body.chars().take(200).collect::<String>()),
        )
        .into())
    }
}

#[async_trait]
impl DeploymentService for RestDeploymentService {
    async fn put_deployment_group(&self, group: &DeploymentGroup) -> Result<()> {
        let url = format!("{}/deployment-groups/{}", self.base_url, group.id);
        debug!("PUT {url}");
        self.send(self.http.put(&url).json(group), "deployment group upsert")
            .await
    }

    async fn add_deployments(&self, group_id: &str, deployments: &[DeploymentSpec]) -> Result<()> {
        #[derive(Serialize)]
        struct AddDeploymentsBody<'a> {
            deployments: &'a [DeploymentSpec],
        }

        let url = format!("{}/deployment-groups/{group_id}/deployments", self.base_url);
        debug!("POST {url}");
        self.send(
            self.http.post(&url).json(&AddDeploymentsBody { deployments }),
            "add deployments",
        )
        .await
    }
}
