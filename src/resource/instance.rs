//! Instance request-body construction.
//!
//! Pure translation from declarative [`InstanceProperties`] to the typed
//! insert body, with no API calls. Keeping this side-effect free makes
//! every defaulting and merge rule directly testable.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::info;

use crate::config::spec::{InstanceProperties, OsFamily};
use crate::error::{ConfigError, GcpError, GcpLifecycleError, Result};
use crate::gcp::GcpClient;
use crate::resource::types::{
    sanitize_resource_name, AccessConfig, AttachedDisk, InitializeParams, InstanceRequestBody,
    Metadata, MetadataItem, NetworkInterface, Operation, ResourceDescriptor, ResourceKind,
    ServiceAccount, Scope, Tags,
};

use super::CloudResource;

/// Well-known default network link.
pub const DEFAULT_NETWORK: &str = "global/networks/default";

/// Access config name for an external NAT IP.
pub const EXTERNAL_NAT_NAME: &str = "External NAT";

/// Access config type for an external NAT IP.
pub const EXTERNAL_NAT_TYPE: &str = "ONE_TO_ONE_NAT";

/// Metadata key holding SSH public keys.
const SSH_KEYS_METADATA_KEY: &str = "ssh-keys";

/// Metadata key marking the agent package bucket (the owning project).
const BUCKET_METADATA_KEY: &str = "bucket";

/// Powershell block markers used by Windows startup-script metadata.
const PS_OPEN: &str = "<powershell>";
const PS_CLOSE: &str = "</powershell>";

/// Startup-script metadata keys interpreted as powershell on Windows.
const POWERSHELL_SCRIPT_KEYS: &[&str] =
    &["sysprep-specialize-script-ps1", "windows-startup-script-ps1"];

/// Builds the insert body for an instance.
///
/// Applies all defaulting rules: sanitized name, machine-type link in the
/// effective zone, default network, default service scopes, the name tag,
/// an external access config only when requested, and the boot disk first
/// in the disk list.
///
/// # Errors
///
/// Returns [`ConfigError::MultipleBootDisks`] when more than one disk is
/// marked as boot, and [`ConfigError::MissingBootImage`] when no boot
/// source can be determined.
pub fn build_instance_body(
    props: &InstanceProperties,
    project: &str,
    zone: &str,
    agent_init_script: Option<&str>,
) -> Result<InstanceRequestBody> {
    let name = sanitize_resource_name(&props.name);

    Ok(InstanceRequestBody {
        description: format!("Managed instance {name}"),
        can_ip_forward: props.can_ip_forward,
        tags: build_tags(props, &name),
        machine_type: format!("zones/{zone}/machineTypes/{}", props.machine_type_or_default()),
        network_interfaces: vec![build_network_interface(props)],
        service_accounts: vec![ServiceAccount {
            email: String::from("default"),
            scopes: props.scopes_or_default(),
        }],
        metadata: build_metadata(props, project, agent_init_script)?,
        disks: build_disks(props, &name)?,
        name,
    })
}

/// Network tags: the user tags unioned with the sanitized instance name,
/// deduplicated and sorted. No fingerprint on create.
fn build_tags(props: &InstanceProperties, name: &str) -> Tags {
    let items: BTreeSet<String> = props
        .tags
        .iter()
        .cloned()
        .chain(std::iter::once(name.to_string()))
        .collect();
    Tags {
        items: items.into_iter().collect(),
        fingerprint: None,
    }
}

/// The single network interface, with an external access config only when
/// external connectivity was requested.
fn build_network_interface(props: &InstanceProperties) -> NetworkInterface {
    let access_configs = props.external_ip.then(|| {
        vec![AccessConfig {
            name: EXTERNAL_NAT_NAME.to_string(),
            config_type: EXTERNAL_NAT_TYPE.to_string(),
            nat_ip: None,
        }]
    });

    NetworkInterface {
        network: props
            .network
            .clone()
            .unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
        subnetwork: props.subnetwork.clone(),
        network_ip: None,
        access_configs,
    }
}

/// Metadata items in deterministic order: the agent bucket marker, user
/// items sorted by key, then SSH keys, then the startup script with any
/// agent bootstrap merged in.
fn build_metadata(
    props: &InstanceProperties,
    project: &str,
    agent_init_script: Option<&str>,
) -> Result<Metadata> {
    let mut items: Vec<MetadataItem> = props
        .metadata
        .iter()
        .map(|(key, value)| MetadataItem {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    items.sort_by(|a, b| a.key.cmp(&b.key));

    if !project.is_empty() && !props.metadata.contains_key(BUCKET_METADATA_KEY) {
        items.insert(
            0,
            MetadataItem {
                key: BUCKET_METADATA_KEY.to_string(),
                value: project.to_string(),
            },
        );
    }

    if !props.ssh_keys.is_empty() {
        items.push(MetadataItem {
            key: SSH_KEYS_METADATA_KEY.to_string(),
            value: props.ssh_keys.join("\n"),
        });
    }

    let resolved = props
        .startup_script
        .as_ref()
        .map(crate::config::spec::StartupScript::resolve)
        .transpose()?;

    let agent = if props.install_agent {
        agent_init_script
    } else {
        None
    };

    match (resolved, agent) {
        (Some(script), Some(agent)) => {
            let value = merge_agent_script(&script.key, &script.value, agent, props.os_family);
            items.push(MetadataItem {
                key: script.key,
                value,
            });
        }
        (Some(script), None) => {
            items.push(MetadataItem {
                key: script.key,
                value: script.value,
            });
        }
        (None, Some(agent)) => {
            let (key, value) = match props.os_family {
                OsFamily::Windows => (
                    POWERSHELL_SCRIPT_KEYS[1].to_string(),
                    wrap_powershell("", agent),
                ),
                OsFamily::Linux => (
                    crate::config::spec::DEFAULT_STARTUP_SCRIPT_KEY.to_string(),
                    agent.to_string(),
                ),
            };
            items.push(MetadataItem { key, value });
        }
        (None, None) => {}
    }

    Ok(Metadata { items })
}

/// Merges an agent bootstrap script into an existing startup script.
///
/// For Windows powershell metadata keys both scripts end up inside a
/// single powershell block, the agent script after the user script.
/// Everywhere else the agent script is appended on its own line.
fn merge_agent_script(key: &str, existing: &str, agent: &str, os_family: OsFamily) -> String {
    if os_family == OsFamily::Windows && POWERSHELL_SCRIPT_KEYS.contains(&key) {
        return wrap_powershell(existing, agent);
    }
    if existing.is_empty() {
        agent.to_string()
    } else {
        format!("{existing}\n{agent}")
    }
}

/// Combines script bodies into one powershell block, stripping any
/// markers each body already carries.
fn wrap_powershell(existing: &str, agent: &str) -> String {
    let strip = |s: &str| -> String {
        s.trim()
            .trim_start_matches(PS_OPEN)
            .trim_end_matches(PS_CLOSE)
            .trim()
            .to_string()
    };
    let existing = strip(existing);
    let agent = strip(agent);
    let body = if existing.is_empty() {
        agent
    } else if agent.is_empty() {
        existing
    } else {
        format!("{existing}\n{agent}")
    };
    format!("{PS_OPEN}\n{body}\n{PS_CLOSE}")
}

/// Disk list with the boot disk first.
///
/// With no related disk nodes, an image reference is mandatory and turns
/// into an auto-deleted boot disk initialized from it. With related
/// disks, exactly one may be marked boot; the relative order of the
/// remaining disks is preserved.
fn build_disks(props: &InstanceProperties, name: &str) -> Result<Vec<AttachedDisk>> {
    if props.disks.is_empty() {
        let image = props.image.clone().ok_or(ConfigError::MissingBootImage)?;
        return Ok(vec![AttachedDisk {
            boot: true,
            auto_delete: true,
            source: None,
            device_name: Some(name.to_string()),
            initialize_params: Some(InitializeParams {
                source_image: image,
            }),
        }]);
    }

    let boot_count = props.disks.iter().filter(|d| d.boot).count();
    if boot_count > 1 {
        return Err(ConfigError::MultipleBootDisks { count: boot_count }.into());
    }
    if boot_count == 0 {
        return Err(ConfigError::MissingBootImage.into());
    }

    let to_attached = |spec: &crate::config::spec::DiskSpec| AttachedDisk {
        boot: spec.boot,
        auto_delete: spec.auto_delete,
        source: spec.source.clone(),
        device_name: Some(spec.name.clone()),
        initialize_params: spec.image.clone().map(|image| InitializeParams {
            source_image: image,
        }),
    };

    let mut disks: Vec<AttachedDisk> = props
        .disks
        .iter()
        .filter(|d| d.boot)
        .map(to_attached)
        .collect();
    disks.extend(props.disks.iter().filter(|d| !d.boot).map(to_attached));
    Ok(disks)
}

/// A managed (or externally managed) compute instance.
#[derive(Debug, Clone)]
pub struct InstanceResource {
    props: InstanceProperties,
    project: String,
    zone: String,
    agent_init_script: Option<String>,
}

impl InstanceResource {
    /// Creates an instance resource pinned to its owning project and
    /// effective zone.
    #[must_use]
    pub fn new(props: InstanceProperties, project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            props,
            project: project.into(),
            zone: zone.into(),
            agent_init_script: None,
        }
    }

    /// Attaches the agent bootstrap script supplied by the host runtime.
    #[must_use]
    pub fn with_agent_init_script(mut self, script: impl Into<String>) -> Self {
        self.agent_init_script = Some(script.into());
        self
    }

    /// Returns the sanitized instance name used on the provider side.
    #[must_use]
    pub fn instance_name(&self) -> String {
        sanitize_resource_name(&self.props.name)
    }

    /// Returns the effective zone.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Returns the declarative properties.
    #[must_use]
    pub const fn props(&self) -> &InstanceProperties {
        &self.props
    }
}

#[async_trait]
impl CloudResource for InstanceResource {
    fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor::new(
            ResourceKind::Instance,
            self.instance_name(),
            &self.project,
            Scope::Zone(self.zone.clone()),
        )
    }

    fn is_external(&self) -> bool {
        self.props.use_external_resource
    }

    async fn create(&self, client: &GcpClient) -> Result<Option<Operation>> {
        let body = build_instance_body(&self.props, &self.project, &self.zone, self.agent_init_script.as_deref())?;
        info!("Creating instance {} in {}", body.name, self.zone);
        let operation = client.insert_instance(&self.zone, &body).await?;
        Ok(Some(operation))
    }

    async fn delete(&self, client: &GcpClient) -> Result<Option<Operation>> {
        let name = self.instance_name();
        info!("Deleting instance {name} in {}", self.zone);
        let operation = client.delete_instance(&self.zone, &name).await?;
        Ok(Some(operation))
    }

    async fn exists(&self, client: &GcpClient) -> Result<bool> {
        match client.get_instance(&self.zone, &self.instance_name()).await {
            Ok(_) => Ok(true),
            Err(GcpLifecycleError::Gcp(GcpError::NotFound { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{DiskSpec, StartupScript};
    use crate::error::GcpLifecycleError;
    use std::collections::HashMap;

    fn base_props(name: &str) -> InstanceProperties {
        InstanceProperties {
            name: name.to_string(),
            machine_type: None,
            image: Some(String::from("projects/debian-cloud/global/images/family/debian-12")),
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
        }
    }

    fn disk(name: &str, boot: bool) -> DiskSpec {
        DiskSpec {
            name: name.to_string(),
            boot,
            auto_delete: true,
            source: Some(format!("zones/us-east1-b/disks/{name}")),
            image: None,
        }
    }

    #[test]
    fn defaults_applied() {
        let body = build_instance_body(&base_props("Web Server"), "example-project", "us-east1-b", None)
            .expect("valid properties build");
        assert_eq!(body.name, "web-server");
        assert_eq!(
            body.machine_type,
            "zones/us-east1-b/machineTypes/n1-standard-1"
        );
        assert_eq!(body.network_interfaces[0].network, DEFAULT_NETWORK);
        assert!(body.network_interfaces[0].access_configs.is_none());
        assert_eq!(body.service_accounts[0].email, "default");
        assert_eq!(body.service_accounts[0].scopes.len(), 2);
        assert_eq!(body.metadata.items[0].key, "bucket");
        assert_eq!(body.metadata.items[0].value, "example-project");
    }

    #[test]
    fn name_tag_unioned_with_user_tags() {
        let mut props = base_props("web");
        props.tags = vec![String::from("http"), String::from("web")];
        let body = build_instance_body(&props, "example-project", "us-east1-b", None).expect("builds");
        assert_eq!(body.tags.items, vec!["http", "web"]);
        assert!(body.tags.fingerprint.is_none());
    }

    #[test]
    fn external_ip_adds_nat_access_config() {
        let mut props = base_props("web");
        props.external_ip = true;
        let body = build_instance_body(&props, "example-project", "us-east1-b", None).expect("builds");
        let configs = body.network_interfaces[0]
            .access_configs
            .as_ref()
            .expect("access configs present");
        assert_eq!(configs[0].name, EXTERNAL_NAT_NAME);
        assert_eq!(configs[0].config_type, EXTERNAL_NAT_TYPE);
        assert!(configs[0].nat_ip.is_none());
    }

    #[test]
    fn image_becomes_boot_disk_when_no_disks() {
        let body = build_instance_body(&base_props("web"), "example-project", "us-east1-b", None).expect("builds");
        assert_eq!(body.disks.len(), 1);
        assert!(body.disks[0].boot);
        assert!(body.disks[0].auto_delete);
        assert!(body.disks[0]
            .initialize_params
            .as_ref()
            .is_some_and(|p| p.source_image.contains("debian")));
    }

    #[test]
    fn missing_image_and_disks_is_fatal() {
        let mut props = base_props("web");
        props.image = None;
        let err = build_instance_body(&props, "example-project", "us-east1-b", None).expect_err("must fail");
        assert!(matches!(
            err,
            GcpLifecycleError::Config(ConfigError::MissingBootImage)
        ));
    }

    #[test]
    fn boot_disk_ordered_first() {
        let mut props = base_props("web");
        props.disks = vec![disk("data-1", false), disk("boot", true), disk("data-2", false)];
        let body = build_instance_body(&props, "example-project", "us-east1-b", None).expect("builds");
        let names: Vec<_> = body
            .disks
            .iter()
            .map(|d| d.device_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["boot", "data-1", "data-2"]);
        assert!(body.disks[0].boot);
    }

    #[test]
    fn multiple_boot_disks_rejected() {
        let mut props = base_props("web");
        props.disks = vec![disk("a", true), disk("b", true)];
        let err = build_instance_body(&props, "example-project", "us-east1-b", None).expect_err("must fail");
        assert!(matches!(
            err,
            GcpLifecycleError::Config(ConfigError::MultipleBootDisks { count: 2 })
        ));
    }

    #[test]
    fn ssh_keys_joined_into_metadata() {
        let mut props = base_props("web");
        props.ssh_keys = vec![String::from("admin:ssh-rsa AAA"), String::from("dev:ssh-rsa BBB")];
        let body = build_instance_body(&props, "example-project", "us-east1-b", None).expect("builds");
        let item = body
            .metadata
            .items
            .iter()
            .find(|i| i.key == "ssh-keys")
            .expect("ssh-keys item present");
        assert_eq!(item.value, "admin:ssh-rsa AAA\ndev:ssh-rsa BBB");
    }

    #[test]
    fn agent_script_appended_on_linux() {
        let mut props = base_props("web");
        props.install_agent = true;
        props.startup_script = Some(StartupScript::Plain(String::from("echo user")));
        let body =
            build_instance_body(&props, "example-project", "us-east1-b", Some("echo agent")).expect("builds");
        let item = body
            .metadata
            .items
            .iter()
            .find(|i| i.key == "startup-script")
            .expect("startup-script item present");
        assert_eq!(item.value, "echo user\necho agent");
    }

    #[test]
    fn agent_script_ignored_unless_requested() {
        let mut props = base_props("web");
        props.startup_script = Some(StartupScript::Plain(String::from("echo user")));
        let body =
            build_instance_body(&props, "example-project", "us-east1-b", Some("echo agent")).expect("builds");
        let item = body
            .metadata
            .items
            .iter()
            .find(|i| i.key == "startup-script")
            .expect("startup-script item present");
        assert_eq!(item.value, "echo user");
    }

    #[test]
    fn powershell_scripts_merged_inside_one_block() {
        let merged = merge_agent_script(
            "windows-startup-script-ps1",
            "<powershell>\nWrite-Host user\n</powershell>",
            "<powershell>Write-Host agent</powershell>",
            OsFamily::Windows,
        );
        assert_eq!(
            merged,
            "<powershell>\nWrite-Host user\nWrite-Host agent\n</powershell>"
        );
    }

    #[test]
    fn non_powershell_key_on_windows_appends_plainly() {
        let merged = merge_agent_script("startup-script", "echo user", "echo agent", OsFamily::Windows);
        assert_eq!(merged, "echo user\necho agent");
    }
}
