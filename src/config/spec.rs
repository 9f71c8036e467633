//! Declarative node definition types.
//!
//! These types are the inbound interface of the adapter: property bags
//! describing the desired resources, as supplied by the host orchestration
//! runtime in its node definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Default machine type when none is requested.
pub const DEFAULT_MACHINE_TYPE: &str = "n1-standard-1";

/// Default API scopes granted to an instance's service account.
pub const DEFAULT_SERVICE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/devstorage.read_write",
    "https://www.googleapis.com/auth/logging.write",
];

/// Metadata key used for startup scripts when no explicit key is given.
pub const DEFAULT_STARTUP_SCRIPT_KEY: &str = "startup-script";

/// The full set of node definitions handled by the adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSet {
    /// Compute instance definitions.
    #[serde(default)]
    pub instances: Vec<InstanceProperties>,
    /// Project definitions.
    #[serde(default)]
    pub projects: Vec<ProjectProperties>,
    /// IAM policy binding definitions.
    #[serde(default)]
    pub bindings: Vec<PolicyBindingProperties>,
    /// Discovery/fan-out configuration, if any.
    #[serde(default)]
    pub discovery: Option<DiscoveryProperties>,
}

/// Declarative properties of a compute instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceProperties {
    /// Instance name.
    pub name: String,
    /// Machine type (short name, e.g. `n1-standard-1`).
    #[serde(default)]
    pub machine_type: Option<String>,
    /// Boot image reference. Mandatory when no disks are attached.
    #[serde(default)]
    pub image: Option<String>,
    /// Zone the instance lives in. Falls back to the context default.
    #[serde(default)]
    pub zone: Option<String>,
    /// Whether to attach an external IP access config.
    #[serde(default)]
    pub external_ip: bool,
    /// Whether the instance may forward packets.
    #[serde(default)]
    pub can_ip_forward: bool,
    /// Network tags. The instance name is always added as a base tag.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Service account API scopes. Defaults to [`DEFAULT_SERVICE_SCOPES`].
    #[serde(default)]
    pub scopes: Vec<String>,
    /// SSH public keys to place in instance metadata.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// Custom network. Defaults to the well-known default network.
    #[serde(default)]
    pub network: Option<String>,
    /// Custom subnetwork.
    #[serde(default)]
    pub subnetwork: Option<String>,
    /// Startup script, as a plain string or a typed descriptor.
    #[serde(default)]
    pub startup_script: Option<StartupScript>,
    /// Disks attached through relationships to disk nodes.
    #[serde(default)]
    pub disks: Vec<DiskSpec>,
    /// Operating system family (`linux` or `windows`). Controls how agent
    /// bootstrap scripts are merged into startup-script metadata.
    #[serde(default)]
    pub os_family: OsFamily,
    /// Whether an agent bootstrap script must be merged into the startup
    /// script.
    #[serde(default)]
    pub install_agent: bool,
    /// When set, the resource is managed outside this deployment: it is
    /// only looked up at create and never deleted.
    #[serde(default)]
    pub use_external_resource: bool,
    /// Additional key/value metadata items.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Operating system family of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux guest.
    #[default]
    Linux,
    /// Windows guest. Startup scripts use powershell markup keys.
    Windows,
}

/// A disk attached to an instance through a relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Name of the disk resource.
    pub name: String,
    /// Whether this is the boot disk.
    #[serde(default)]
    pub boot: bool,
    /// Whether the disk is deleted with the instance.
    #[serde(default = "default_true")]
    pub auto_delete: bool,
    /// Existing disk source link, if the disk already exists.
    #[serde(default)]
    pub source: Option<String>,
    /// Image to initialize the disk from, if it is created inline.
    #[serde(default)]
    pub image: Option<String>,
}

/// Startup script input: either a plain shell script string or a typed
/// descriptor selecting a file, a literal, or an inline value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartupScript {
    /// Plain script text.
    Plain(String),
    /// Typed descriptor.
    Typed(StartupScriptSpec),
}

/// Typed startup-script descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupScriptSpec {
    /// Metadata key to store the script under. Windows powershell keys
    /// change how agent scripts are merged.
    #[serde(default)]
    pub key: Option<String>,
    /// Kind of script source.
    #[serde(rename = "type", default)]
    pub kind: Option<ScriptKind>,
    /// Script path (for `file`) or script text (for `string`).
    #[serde(default)]
    pub script: Option<String>,
    /// Inline script value, used when no kind is given.
    #[serde(default)]
    pub value: Option<String>,
}

/// Kind of a typed startup-script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// Read the script from a file path.
    File,
    /// The `script` field holds the script text.
    String,
}

/// A startup script resolved to a metadata key and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    /// Metadata key.
    pub key: String,
    /// Script content.
    pub value: String,
}

/// Declarative properties of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectProperties {
    /// Project ID (unique, immutable).
    pub id: String,
    /// Display name. Defaults to the ID.
    #[serde(default)]
    pub name: Option<String>,
    /// When set, the project is managed outside this deployment.
    #[serde(default)]
    pub use_external_resource: bool,
}

/// Declarative properties of an IAM policy binding delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyBindingProperties {
    /// Resource (project ID) the policy applies to.
    pub resource: String,
    /// Desired bindings to add or remove.
    pub bindings: Vec<DesiredBinding>,
}

/// A single desired role/members binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredBinding {
    /// IAM role name.
    pub role: String,
    /// Members bound to the role.
    pub members: Vec<String>,
}

/// Discovery and fan-out deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryProperties {
    /// Zones or regions to scan.
    #[serde(default)]
    pub zones: Vec<String>,
    /// Resource types to discover (e.g. `projects.zones.clusters`).
    #[serde(default)]
    pub resource_types: Vec<String>,
    /// Blueprint to instantiate per discovered resource.
    pub blueprint_id: String,
}

const fn default_true() -> bool {
    true
}

impl StartupScript {
    /// Resolves the script to a metadata key/value pair, reading the
    /// script file for `file` descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StartupScriptUnreadable`] if a `file`
    /// descriptor points at an unreadable path.
    pub fn resolve(&self) -> Result<ResolvedScript> {
        match self {
            Self::Plain(value) => Ok(ResolvedScript {
                key: DEFAULT_STARTUP_SCRIPT_KEY.to_string(),
                value: value.clone(),
            }),
            Self::Typed(spec) => {
                let key = spec
                    .key
                    .clone()
                    .unwrap_or_else(|| DEFAULT_STARTUP_SCRIPT_KEY.to_string());
                let value = match spec.kind {
                    Some(ScriptKind::File) => {
                        let path = PathBuf::from(spec.script.clone().unwrap_or_default());
                        std::fs::read_to_string(&path).map_err(|e| {
                            ConfigError::StartupScriptUnreadable {
                                path,
                                message: e.to_string(),
                            }
                        })?
                    }
                    Some(ScriptKind::String) => spec.script.clone().unwrap_or_default(),
                    None => spec.value.clone().unwrap_or_default(),
                };
                Ok(ResolvedScript { key, value })
            }
        }
    }
}

impl InstanceProperties {
    /// Returns the requested machine type, falling back to the default.
    #[must_use]
    pub fn machine_type_or_default(&self) -> &str {
        self.machine_type.as_deref().unwrap_or(DEFAULT_MACHINE_TYPE)
    }

    /// Returns the requested scopes, falling back to the defaults.
    #[must_use]
    pub fn scopes_or_default(&self) -> Vec<String> {
        if self.scopes.is_empty() {
            DEFAULT_SERVICE_SCOPES
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            self.scopes.clone()
        }
    }
}

impl ProjectProperties {
    /// Returns the display name, falling back to the project ID.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_startup_script_resolves_to_default_key() {
        let script = StartupScript::Plain(String::from("#!/bin/sh\necho hi"));
        let resolved = script.resolve().expect("plain scripts always resolve");
        assert_eq!(resolved.key, DEFAULT_STARTUP_SCRIPT_KEY);
        assert_eq!(resolved.value, "#!/bin/sh\necho hi");
    }

    #[test]
    fn typed_string_script_uses_script_field() {
        let script = StartupScript::Typed(StartupScriptSpec {
            key: Some(String::from("windows-startup-script-ps1")),
            kind: Some(ScriptKind::String),
            script: Some(String::from("Write-Host hi")),
            value: None,
        });
        let resolved = script.resolve().expect("string scripts always resolve");
        assert_eq!(resolved.key, "windows-startup-script-ps1");
        assert_eq!(resolved.value, "Write-Host hi");
    }

    #[test]
    fn typed_script_without_kind_uses_value_field() {
        let script = StartupScript::Typed(StartupScriptSpec {
            key: None,
            kind: None,
            script: None,
            value: Some(String::from("echo inline")),
        });
        let resolved = script.resolve().expect("inline scripts always resolve");
        assert_eq!(resolved.key, DEFAULT_STARTUP_SCRIPT_KEY);
        assert_eq!(resolved.value, "echo inline");
    }

    #[test]
    fn missing_file_script_fails() {
        let script = StartupScript::Typed(StartupScriptSpec {
            key: None,
            kind: Some(ScriptKind::File),
            script: Some(String::from("/nonexistent/startup.sh")),
            value: None,
        });
        assert!(script.resolve().is_err());
    }

    #[test]
    fn scope_defaults_apply_when_empty() {
        let props = InstanceProperties {
            name: String::from("web"),
            machine_type: None,
            image: None,
            zone: None,
            external_ip: false,
            can_ip_forward: false,
            tags: vec![],
            scopes: vec![],
            ssh_keys: vec![],
            network: None,
            subnetwork: None,
            startup_script: None,
            disks: vec![],
            os_family: OsFamily::Linux,
            install_agent: false,
            use_external_resource: false,
            metadata: HashMap::new(),
        };
        assert_eq!(props.machine_type_or_default(), DEFAULT_MACHINE_TYPE);
        assert_eq!(props.scopes_or_default().len(), DEFAULT_SERVICE_SCOPES.len());
    }
}
