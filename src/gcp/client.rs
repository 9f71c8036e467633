//! GCP REST API client.
//!
//! A thin typed client over the compute, resource-manager, and
//! container-engine APIs. Synchronous provider rejections map to fatal
//! errors here; long-running operation tracking lives in
//! [`super::operations`].

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{GcpError, Result};
use crate::iam::Policy;
use crate::resource::types::{
    AccessConfig, AttachedDisk, Cluster, Instance, InstanceRequestBody, Operation, Project,
    ProjectRequestBody, Scope, Tags,
};

use super::auth::GcpCredentials;

/// Compute API base URL.
pub const COMPUTE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Cloud Resource Manager API base URL.
pub const RESOURCE_MANAGER_API_BASE: &str = "https://cloudresourcemanager.googleapis.com/v1";

/// Container Engine API base URL.
pub const CONTAINER_API_BASE: &str = "https://container.googleapis.com/v1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Policy version requested on IAM policy reads.
const REQUESTED_POLICY_VERSION: u32 = 3;

/// Where API tokens come from.
#[derive(Debug, Clone)]
enum TokenSource {
    /// Application Default Credentials.
    Credentials(GcpCredentials),
    /// A fixed, pre-minted token (tests and short-lived tooling).
    Static(String),
}

/// Typed GCP API client.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: Client,
    token_source: TokenSource,
    project: String,
    compute_base: String,
    resource_manager_base: String,
    container_base: String,
}

impl GcpClient {
    /// Creates a client using Application Default Credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(credentials: GcpCredentials, project: &str) -> Result<Self> {
        Self::build(TokenSource::Credentials(credentials), project)
    }

    /// Creates a client with a fixed bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_static_token(token: &str, project: &str) -> Result<Self> {
        Self::build(TokenSource::Static(token.to_string()), project)
    }

    fn build(token_source: TokenSource, project: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| GcpError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_source,
            project: project.to_string(),
            compute_base: COMPUTE_API_BASE.to_string(),
            resource_manager_base: RESOURCE_MANAGER_API_BASE.to_string(),
            container_base: CONTAINER_API_BASE.to_string(),
        })
    }

    /// Overrides the compute API base URL.
    #[must_use]
    pub fn with_compute_base(mut self, base: &str) -> Self {
        self.compute_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Overrides the resource-manager API base URL.
    #[must_use]
    pub fn with_resource_manager_base(mut self, base: &str) -> Self {
        self.resource_manager_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Overrides the container-engine API base URL.
    #[must_use]
    pub fn with_container_base(mut self, base: &str) -> Self {
        self.container_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Returns the project this client issues calls against.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    async fn token(&self) -> Result<String> {
        match &self.token_source {
            TokenSource::Credentials(credentials) => credentials.token().await,
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }

    /// Sends a request and maps provider responses to the error taxonomy.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, resource: &str) -> Result<T> {
        let token = self.token().await?;

        let response = request.bearer_auth(token).send().await.map_err(|e| {
            GcpError::network(format!("Request for {resource} failed: {e}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GcpError::network(format!("Failed to read response for {resource}: {e}"))
        })?;

        trace!("GCP response for {resource}: {status}");

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(GcpError::RateLimited {
                    retry_after_secs: 60,
                }
                .into());
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(GcpError::AuthenticationFailed {
                    message: format!("{status} for {resource}"),
                }
                .into());
            }
            StatusCode::NOT_FOUND => {
                return Err(GcpError::NotFound {
                    resource: resource.to_string(),
                }
                .into());
            }
            StatusCode::CONFLICT => {
                return Err(GcpError::AlreadyExists {
                    resource: resource.to_string(),
                }
                .into());
            }
            StatusCode::PRECONDITION_FAILED => {
                return Err(GcpError::ConcurrentModification {
                    resource: resource.to_string(),
                }
                .into());
            }
            _ => {}
        }

        if !status.is_success() {
            return Err(GcpError::rejected(resource, status.as_u16(), extract_api_error(&body)).into());
        }

        let text = if body.is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(text).map_err(|e| {
            GcpError::invalid_response(format!("Failed to parse response for {resource}: {e}"))
                .into()
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T> {
        debug!("GET {url}");
        self.send(self.http.get(url), resource).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        url: &str,
        body: Option<&B>,
        resource: &str,
    ) -> Result<T> {
        debug!("POST {url}");
        let mut request = self.http.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request, resource).await
    }

    async fn delete_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T> {
        debug!("DELETE {url}");
        self.send(self.http.delete(url), resource).await
    }

    fn instances_url(&self, zone: &str) -> String {
        format!(
            "{}/projects/{}/zones/{zone}/instances",
            self.compute_base, self.project
        )
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Submits an instance insert. Returns the operation handle; a 409
    /// surfaces as [`GcpError::AlreadyExists`] so resumed creates can
    /// treat resubmission as success.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider rejects the request.
    pub async fn insert_instance(
        &self,
        zone: &str,
        body: &InstanceRequestBody,
    ) -> Result<Operation> {
        self.post_json(&self.instances_url(zone), Some(body), &body.name)
            .await
    }

    /// Fetches an instance.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::NotFound`] when the instance does not exist.
    pub async fn get_instance(&self, zone: &str, name: &str) -> Result<Instance> {
        let url = format!("{}/{name}", self.instances_url(zone));
        self.get_json(&url, name).await
    }

    /// Lists instances in a zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_instances(&self, zone: &str) -> Result<Vec<Instance>> {
        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            items: Vec<Instance>,
        }

        let response: ListResponse = self
            .get_json(&self.instances_url(zone), "instances")
            .await?;
        Ok(response.items)
    }

    /// Submits an instance delete.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::NotFound`] when the instance is already gone.
    pub async fn delete_instance(&self, zone: &str, name: &str) -> Result<Operation> {
        let url = format!("{}/{name}", self.instances_url(zone));
        self.delete_json(&url, name).await
    }

    /// Submits an instance start.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn start_instance(&self, zone: &str, name: &str) -> Result<Operation> {
        let url = format!("{}/{name}/start", self.instances_url(zone));
        self.post_json::<_, ()>(&url, None, name).await
    }

    /// Submits an instance stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn stop_instance(&self, zone: &str, name: &str) -> Result<Operation> {
        let url = format!("{}/{name}/stop", self.instances_url(zone));
        self.post_json::<_, ()>(&url, None, name).await
    }

    /// Submits a machine-type change for a stopped instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn set_machine_type(
        &self,
        zone: &str,
        name: &str,
        machine_type: &str,
    ) -> Result<Operation> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SetMachineTypeBody {
            machine_type: String,
        }

        let body = SetMachineTypeBody {
            machine_type: format!("zones/{zone}/machineTypes/{machine_type}"),
        };
        let url = format!("{}/{name}/setMachineType", self.instances_url(zone));
        self.post_json(&url, Some(&body), name).await
    }

    /// Writes the full tag set for an instance. The tags must carry the
    /// fingerprint from the preceding read; a stale fingerprint maps to
    /// [`GcpError::ConcurrentModification`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn set_instance_tags(&self, zone: &str, name: &str, tags: &Tags) -> Result<Operation> {
        let url = format!("{}/{name}/setTags", self.instances_url(zone));
        self.post_json(&url, Some(tags), name).await
    }

    /// Adds an external access config to a network interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn add_access_config(
        &self,
        zone: &str,
        name: &str,
        interface: &str,
        config: &AccessConfig,
    ) -> Result<Operation> {
        let url = format!(
            "{}/{name}/addAccessConfig?networkInterface={interface}",
            self.instances_url(zone)
        );
        self.post_json(&url, Some(config), name).await
    }

    /// Removes an external access config from a network interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn delete_access_config(
        &self,
        zone: &str,
        name: &str,
        interface: &str,
        config_name: &str,
    ) -> Result<Operation> {
        let url = format!(
            "{}/{name}/deleteAccessConfig?accessConfig={config_name}&networkInterface={interface}",
            self.instances_url(zone)
        );
        self.post_json::<_, ()>(&url, None, name).await
    }

    /// Attaches a disk to an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn attach_disk(
        &self,
        zone: &str,
        name: &str,
        disk: &AttachedDisk,
    ) -> Result<Operation> {
        let url = format!("{}/{name}/attachDisk", self.instances_url(zone));
        self.post_json(&url, Some(disk), name).await
    }

    /// Detaches a disk from an instance by device name.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn detach_disk(
        &self,
        zone: &str,
        name: &str,
        device_name: &str,
    ) -> Result<Operation> {
        let url = format!(
            "{}/{name}/detachDisk?deviceName={device_name}",
            self.instances_url(zone)
        );
        self.post_json::<_, ()>(&url, None, name).await
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Fetches the current status of a long-running operation within its
    /// scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn get_operation(&self, scope: &Scope, name: &str) -> Result<Operation> {
        let url = match scope {
            Scope::Zone(zone) => format!(
                "{}/projects/{}/zones/{zone}/operations/{name}",
                self.compute_base, self.project
            ),
            Scope::Region(region) => format!(
                "{}/projects/{}/regions/{region}/operations/{name}",
                self.compute_base, self.project
            ),
            Scope::Global => format!(
                "{}/projects/{}/global/operations/{name}",
                self.compute_base, self.project
            ),
        };
        self.get_json(&url, name).await
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Creates a project. A 409 surfaces as [`GcpError::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn create_project(&self, body: &ProjectRequestBody) -> Result<()> {
        let url = format!("{}/projects", self.resource_manager_base);
        let _: serde_json::Value = self.post_json(&url, Some(body), &body.project_id).await?;
        Ok(())
    }

    /// Fetches a project.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::NotFound`] when the project does not exist.
    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        let url = format!("{}/projects/{project_id}", self.resource_manager_base);
        self.get_json(&url, project_id).await
    }

    /// Requests project deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let url = format!("{}/projects/{project_id}", self.resource_manager_base);
        let _: serde_json::Value = self.delete_json(&url, project_id).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // IAM policies
    // ------------------------------------------------------------------

    /// Reads the IAM policy of a project, including its concurrency
    /// fingerprint (etag).
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn get_iam_policy(&self, project_id: &str) -> Result<Policy> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GetPolicyOptions {
            requested_policy_version: u32,
        }
        #[derive(Serialize)]
        struct GetPolicyBody {
            options: GetPolicyOptions,
        }

        let url = format!(
            "{}/projects/{project_id}:getIamPolicy",
            self.resource_manager_base
        );
        let body = GetPolicyBody {
            options: GetPolicyOptions {
                requested_policy_version: REQUESTED_POLICY_VERSION,
            },
        };
        self.post_json(&url, Some(&body), project_id).await
    }

    /// Writes the IAM policy of a project. The policy must echo the etag
    /// from the preceding read; a stale etag maps to
    /// [`GcpError::ConcurrentModification`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn set_iam_policy(&self, project_id: &str, policy: &Policy) -> Result<Policy> {
        #[derive(Serialize)]
        struct SetPolicyBody<'a> {
            policy: &'a Policy,
        }

        let url = format!(
            "{}/projects/{project_id}:setIamPolicy",
            self.resource_manager_base
        );
        let result: Result<Policy> = self
            .post_json(&url, Some(&SetPolicyBody { policy }), project_id)
            .await;

        // The provider reports a stale etag on policy writes as a conflict.
        match result {
            Err(crate::error::GcpLifecycleError::Gcp(GcpError::AlreadyExists { resource })) => {
                Err(GcpError::ConcurrentModification { resource }.into())
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Lists container-engine clusters in a zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_clusters(&self, zone: &str) -> Result<Vec<Cluster>> {
        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            clusters: Vec<Cluster>,
        }

        let url = format!(
            "{}/projects/{}/zones/{zone}/clusters",
            self.container_base, self.project
        );
        let response: ListResponse = self.get_json(&url, "clusters").await?;
        Ok(response.clusters)
    }
}

/// Pulls the provider's error message out of an error body, falling back
/// to the raw body.
fn extract_api_error(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorPayload,
    }
    #[derive(Deserialize)]
    struct ErrorPayload {
        #[serde(default)]
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_api_error_prefers_structured_message() {
        let body = r#"{"error": {"code": 400, "message": "Invalid value for field"}}"#;
        assert_eq!(extract_api_error(body), "Invalid value for field");
    }

    #[test]
    fn extract_api_error_falls_back_to_raw_body() {
        assert_eq!(extract_api_error("plain text"), "plain text");
    }

    #[test]
    fn base_url_overrides_trim_trailing_slash() {
        let client = GcpClient::with_static_token("token", "example-project")
            .expect("client builds")
            .with_compute_base("http://127.0.0.1:9000/compute/v1/");
        assert_eq!(
            client.instances_url("us-east1-b"),
            "http://127.0.0.1:9000/compute/v1/projects/example-project/zones/us-east1-b/instances"
        );
    }
}
