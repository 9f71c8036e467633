//! Typed GCP request/response records and resource descriptors.
//!
//! Every call carries an explicit serde record validated at the boundary
//! instead of loosely-typed JSON maps.

use serde::{Deserialize, Serialize};

/// Kinds of resources managed by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A cloud project.
    Project,
    /// A compute instance.
    Instance,
    /// A persistent disk.
    Disk,
    /// A network.
    Network,
    /// An IAM policy binding.
    PolicyBinding,
    /// A container-engine cluster (discovery only).
    Cluster,
}

/// Owning scope of a resource or operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Zonal resource.
    Zone(String),
    /// Regional resource.
    Region(String),
    /// Global resource.
    Global,
}

/// Identity of a managed resource: the tuple (kind, identifier, scope).
///
/// The identifier is assigned exactly once at create and is immutable;
/// every later operation addresses the resource by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Kind of resource.
    pub kind: ResourceKind,
    /// Provider-side identifier (name or ID).
    pub identifier: String,
    /// Owning project.
    pub project: String,
    /// Owning scope.
    pub scope: Scope,
}

impl ResourceDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        identifier: impl Into<String>,
        project: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            project: project.into(),
            scope,
        }
    }
}

impl std::fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}/{}", self.kind, self.project, self.identifier)
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zone(zone) => write!(f, "zone:{zone}"),
            Self::Region(region) => write!(f, "region:{region}"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Sanitizes a name into a provider-acceptable resource name: lowercase,
/// alphanumeric and hyphens, starting with a letter, at most 63 characters.
#[must_use]
pub fn sanitize_resource_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        } else {
            out.push('-');
        }
    }
    // Resource names must start with a letter.
    let trimmed: String = out
        .trim_start_matches(|c: char| !c.is_ascii_lowercase())
        .trim_end_matches('-')
        .chars()
        .take(63)
        .collect();
    trimmed.trim_end_matches('-').to_string()
}

/// Returns the last path segment of a resource link (e.g. the bare zone
/// name out of `projects/p/zones/us-east1-b`).
#[must_use]
pub fn basename(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

/// Network tags on an instance, with the concurrency fingerprint the
/// provider requires echoed back on writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tags {
    /// Tag values.
    #[serde(default)]
    pub items: Vec<String>,
    /// Concurrency fingerprint from the last read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// A single metadata key/value item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    /// Item key.
    pub key: String,
    /// Item value.
    pub value: String,
}

/// Instance metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Metadata items.
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

/// An access config granting external connectivity to a network interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    /// Access config name.
    pub name: String,
    /// Access config type.
    #[serde(rename = "type")]
    pub config_type: String,
    /// Static NAT IP, if one was reserved. Absent lets the provider
    /// assign one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat_ip: Option<String>,
}

/// A network interface attached to an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Network link.
    pub network: String,
    /// Subnetwork link, when a custom subnetwork is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    /// Internal IP, populated by the provider once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_ip: Option<String>,
    /// External access configs, present only when external connectivity
    /// was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_configs: Option<Vec<AccessConfig>>,
}

/// A service account granted to an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    /// Account email, `default` for the project default account.
    pub email: String,
    /// OAuth scopes granted.
    pub scopes: Vec<String>,
}

/// Parameters for a disk created inline with the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Image to initialize the disk from.
    pub source_image: String,
}

/// A disk attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    /// Whether this is the boot disk.
    #[serde(default)]
    pub boot: bool,
    /// Whether the disk is deleted with the instance.
    #[serde(default)]
    pub auto_delete: bool,
    /// Link to an existing disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Device name the guest sees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// Inline initialization parameters, for disks created with the
    /// instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialize_params: Option<InitializeParams>,
}

/// Request body for inserting an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequestBody {
    /// Instance name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the instance may forward packets.
    pub can_ip_forward: bool,
    /// Network tags.
    pub tags: Tags,
    /// Machine type link, `zones/{zone}/machineTypes/{type}`.
    pub machine_type: String,
    /// Network interfaces (the provider supports exactly one).
    pub network_interfaces: Vec<NetworkInterface>,
    /// Service accounts.
    pub service_accounts: Vec<ServiceAccount>,
    /// Metadata items.
    pub metadata: Metadata,
    /// Attached disks, boot disk first.
    pub disks: Vec<AttachedDisk>,
}

/// An instance as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Numeric provider ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Provider status string (`RUNNING`, `TERMINATED`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Machine type link.
    #[serde(default)]
    pub machine_type: Option<String>,
    /// Zone link.
    #[serde(default)]
    pub zone: Option<String>,
    /// Network interfaces.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    /// Network tags.
    #[serde(default)]
    pub tags: Tags,
    /// Metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Instance {
    /// Returns the internal IP of the first network interface, if the
    /// provider has assigned one yet.
    #[must_use]
    pub fn internal_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|nic| nic.network_ip.as_deref())
    }

    /// Returns the external NAT IP of the first access config, if any.
    #[must_use]
    pub fn external_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|nic| nic.access_configs.as_ref())
            .and_then(|configs| configs.first())
            .and_then(|config| config.nat_ip.as_deref())
    }
}

/// Status of a long-running operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// The operation is queued.
    #[default]
    Pending,
    /// The operation is executing.
    Running,
    /// The operation reached a terminal state (inspect `error`).
    Done,
}

/// A long-running operation handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name (the identifier used for polling).
    pub name: String,
    /// Current status.
    #[serde(default)]
    pub status: OperationStatus,
    /// Zone link for zonal operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Region link for regional operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Link to the resource the operation mutates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
    /// Error payload, present only on failed DONE operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

/// Error payload embedded in a failed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationError {
    /// Individual error entries.
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// A single error entry from a failed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationErrorDetail {
    /// Provider error code.
    #[serde(default)]
    pub code: String,
    /// Provider error message.
    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// Returns the scope this operation must be polled in, derived from
    /// its zone/region links.
    #[must_use]
    pub fn scope(&self) -> Scope {
        if let Some(zone) = &self.zone {
            Scope::Zone(basename(zone).to_string())
        } else if let Some(region) = &self.region {
            Scope::Region(basename(region).to_string())
        } else {
            Scope::Global
        }
    }

    /// Returns true if the operation reached a terminal state.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.status, OperationStatus::Done)
    }

    /// Returns the first embedded error, if the operation failed.
    #[must_use]
    pub fn error_detail(&self) -> Option<&OperationErrorDetail> {
        self.error.as_ref().and_then(|e| e.errors.first())
    }
}

/// Request body for creating a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequestBody {
    /// Display name.
    pub name: String,
    /// Project ID.
    pub project_id: String,
}

/// A project as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project ID.
    pub project_id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Lifecycle state (`ACTIVE`, `DELETE_REQUESTED`, ...).
    #[serde(default)]
    pub lifecycle_state: Option<String>,
}

/// A container-engine cluster, as listed during discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Cluster name.
    pub name: String,
    /// Zone or location of the cluster.
    #[serde(default)]
    pub zone: Option<String>,
    /// Cluster endpoint address.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Cluster status string.
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_replaces() {
        assert_eq!(sanitize_resource_name("My_Web Server"), "my-web-server");
        assert_eq!(sanitize_resource_name("web01"), "web01");
    }

    #[test]
    fn sanitize_strips_leading_non_letters() {
        assert_eq!(sanitize_resource_name("01-web"), "web");
        assert_eq!(sanitize_resource_name("--web--"), "web");
    }

    #[test]
    fn sanitize_truncates_to_63() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_resource_name(&long).len(), 63);
    }

    #[test]
    fn operation_scope_from_zone_link() {
        let op = Operation {
            name: String::from("operation-1"),
            status: OperationStatus::Pending,
            zone: Some(String::from(
                "https://compute.example/projects/p/zones/us-east1-b",
            )),
            region: None,
            target_link: None,
            error: None,
        };
        assert_eq!(op.scope(), Scope::Zone(String::from("us-east1-b")));
    }

    #[test]
    fn operation_scope_defaults_to_global() {
        let op = Operation {
            name: String::from("operation-2"),
            status: OperationStatus::Done,
            zone: None,
            region: None,
            target_link: None,
            error: None,
        };
        assert_eq!(op.scope(), Scope::Global);
    }

    #[test]
    fn instance_ip_accessors() {
        let instance = Instance {
            name: String::from("web"),
            id: None,
            status: Some(String::from("RUNNING")),
            machine_type: None,
            zone: None,
            network_interfaces: vec![NetworkInterface {
                network: String::from("global/networks/default"),
                subnetwork: None,
                network_ip: Some(String::from("10.0.0.2")),
                access_configs: Some(vec![AccessConfig {
                    name: String::from("External NAT"),
                    config_type: String::from("ONE_TO_ONE_NAT"),
                    nat_ip: Some(String::from("34.1.2.3")),
                }]),
            }],
            tags: Tags::default(),
            metadata: Metadata::default(),
        };
        assert_eq!(instance.internal_ip(), Some("10.0.0.2"));
        assert_eq!(instance.external_ip(), Some("34.1.2.3"));
    }
}
