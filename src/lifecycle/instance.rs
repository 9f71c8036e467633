//! Instance lifecycle operations.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::spec::InstanceProperties;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::gcp::{GcpClient, OperationTracker};
use crate::resource::instance::{InstanceResource, EXTERNAL_NAT_NAME, EXTERNAL_NAT_TYPE};
use crate::resource::types::{sanitize_resource_name, AccessConfig, AttachedDisk, Tags};

use super::{ensure_created, ensure_deleted};

/// Network interface the adapter manages access configs on.
const PRIMARY_INTERFACE: &str = "nic0";

/// Instance lifecycle operations over a [`GcpClient`].
#[derive(Debug, Clone, Copy)]
pub struct InstanceOps<'a> {
    client: &'a GcpClient,
}

impl<'a> InstanceOps<'a> {
    /// Creates the operations handle.
    #[must_use]
    pub const fn new(client: &'a GcpClient) -> Self {
        Self { client }
    }

    fn resource(&self, ctx: &ExecutionContext, props: &InstanceProperties) -> InstanceResource {
        let zone = ctx.effective_zone(props.zone.as_deref());
        let resource = InstanceResource::new(props.clone(), &ctx.project, zone);
        match (&ctx.agent_init_script, props.install_agent) {
            (Some(script), true) => resource.with_agent_init_script(script.clone()),
            _ => resource,
        }
    }

    /// Creates the instance, one step per invocation, and records its
    /// identity and addresses in runtime state.
    ///
    /// # Errors
    ///
    /// Returns a retryable not-ready while the create is in flight or
    /// while the provider has not assigned the internal IP yet.
    pub async fn create(&self, ctx: &mut ExecutionContext, props: &InstanceProperties) -> Result<()> {
        let resource = self.resource(ctx, props);
        let zone = resource.zone().to_string();
        let name = resource.instance_name();

        ensure_created(ctx, self.client, &resource).await?;

        ctx.state.zone = Some(zone.clone());
        ctx.state.name = Some(name.clone());
        ctx.state.machine_type = Some(props.machine_type_or_default().to_string());
        self.record_addresses(ctx, &zone, &name).await
    }

    /// Reads the instance and records its addresses, suspending while
    /// the internal IP is still unassigned.
    async fn record_addresses(
        &self,
        ctx: &mut ExecutionContext,
        zone: &str,
        name: &str,
    ) -> Result<()> {
        let instance = self.client.get_instance(zone, name).await?;

        let Some(ip) = instance.internal_ip() else {
            return Err(ctx.retry_default(format!("instance {name} has no internal IP yet")));
        };
        ctx.state.ip = Some(ip.to_string());
        ctx.state.public_ip_address = instance.external_ip().map(ToString::to_string);
        debug!("Instance {name} addresses recorded");
        Ok(())
    }

    /// Deletes the instance, one step per invocation, clearing runtime
    /// state once the delete is confirmed.
    ///
    /// # Errors
    ///
    /// Returns a retryable not-ready while the delete is in flight.
    pub async fn delete(&self, ctx: &mut ExecutionContext, props: &InstanceProperties) -> Result<()> {
        let resource = self.resource(ctx, props);
        ensure_deleted(ctx, self.client, &resource).await
    }

    /// Starts the instance and waits for the operation to settle.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call or the operation fails.
    pub async fn start(&self, ctx: &ExecutionContext, props: &InstanceProperties) -> Result<()> {
        let (zone, name) = target(ctx, props);
        info!("Starting instance {name}");
        let operation = self.client.start_instance(&zone, &name).await?;
        OperationTracker::new(self.client).wait(operation).await?;
        Ok(())
    }

    /// Stops the instance and waits for the operation to settle.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call or the operation fails.
    pub async fn stop(&self, ctx: &ExecutionContext, props: &InstanceProperties) -> Result<()> {
        let (zone, name) = target(ctx, props);
        info!("Stopping instance {name}");
        let operation = self.client.stop_instance(&zone, &name).await?;
        OperationTracker::new(self.client).wait(operation).await?;
        Ok(())
    }

    /// Resizes the instance: stop, change the machine type, start.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three steps fails.
    pub async fn resize(
        &self,
        ctx: &mut ExecutionContext,
        props: &InstanceProperties,
        machine_type: &str,
    ) -> Result<()> {
        let (zone, name) = target(ctx, props);
        info!("Resizing instance {name} to {machine_type}");

        self.stop(ctx, props).await?;
        let operation = self
            .client
            .set_machine_type(&zone, &name, machine_type)
            .await?;
        OperationTracker::new(self.client).wait(operation).await?;
        self.start(ctx, props).await?;

        ctx.state.machine_type = Some(machine_type.to_string());
        Ok(())
    }

    /// Adds network tags with a fingerprinted read-modify-write cycle.
    ///
    /// # Errors
    ///
    /// Returns a concurrent-modification error when the fingerprint went
    /// stale between the read and the write.
    pub async fn add_tags(
        &self,
        ctx: &ExecutionContext,
        props: &InstanceProperties,
        tags: &[String],
    ) -> Result<()> {
        self.update_tags(ctx, props, |items| {
            items.extend(tags.iter().cloned());
        })
        .await
    }

    /// Removes network tags with a fingerprinted read-modify-write cycle.
    /// Tags that are already absent are ignored.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::add_tags`].
    pub async fn remove_tags(
        &self,
        ctx: &ExecutionContext,
        props: &InstanceProperties,
        tags: &[String],
    ) -> Result<()> {
        self.update_tags(ctx, props, |items| {
            for tag in tags {
                items.remove(tag);
            }
        })
        .await
    }

    async fn update_tags(
        &self,
        ctx: &ExecutionContext,
        props: &InstanceProperties,
        mutate: impl FnOnce(&mut BTreeSet<String>),
    ) -> Result<()> {
        let (zone, name) = target(ctx, props);
        let instance = self.client.get_instance(&zone, &name).await?;

        let mut items: BTreeSet<String> = instance.tags.items.iter().cloned().collect();
        mutate(&mut items);
        let items: Vec<String> = items.into_iter().collect();

        if items == instance.tags.items {
            debug!("Tags on {name} already as desired");
            return Ok(());
        }

        let tags = Tags {
            items,
            fingerprint: instance.tags.fingerprint,
        };
        let operation = self.client.set_instance_tags(&zone, &name, &tags).await?;
        OperationTracker::new(self.client).wait(operation).await?;
        info!("Tags updated on {name}");
        Ok(())
    }

    /// Grants the instance an external NAT IP and records it in runtime
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call or the operation fails.
    pub async fn add_external_ip(
        &self,
        ctx: &mut ExecutionContext,
        props: &InstanceProperties,
    ) -> Result<()> {
        let (zone, name) = target(ctx, props);
        let config = AccessConfig {
            name: EXTERNAL_NAT_NAME.to_string(),
            config_type: EXTERNAL_NAT_TYPE.to_string(),
            nat_ip: None,
        };
        let operation = self
            .client
            .add_access_config(&zone, &name, PRIMARY_INTERFACE, &config)
            .await?;
        OperationTracker::new(self.client).wait(operation).await?;

        let instance = self.client.get_instance(&zone, &name).await?;
        ctx.state.public_ip_address = instance.external_ip().map(ToString::to_string);
        info!("External IP attached to {name}");
        Ok(())
    }

    /// Removes the external NAT IP from the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call or the operation fails.
    pub async fn remove_external_ip(
        &self,
        ctx: &mut ExecutionContext,
        props: &InstanceProperties,
    ) -> Result<()> {
        let (zone, name) = target(ctx, props);
        let operation = self
            .client
            .delete_access_config(&zone, &name, PRIMARY_INTERFACE, EXTERNAL_NAT_NAME)
            .await?;
        OperationTracker::new(self.client).wait(operation).await?;
        ctx.state.public_ip_address = None;
        info!("External IP removed from {name}");
        Ok(())
    }

    /// Attaches an existing disk to the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call or the operation fails.
    pub async fn attach_disk(
        &self,
        ctx: &ExecutionContext,
        props: &InstanceProperties,
        source: &str,
        device_name: &str,
    ) -> Result<()> {
        let (zone, name) = target(ctx, props);
        let disk = AttachedDisk {
            boot: false,
            auto_delete: false,
            source: Some(source.to_string()),
            device_name: Some(device_name.to_string()),
            initialize_params: None,
        };
        let operation = self.client.attach_disk(&zone, &name, &disk).await?;
        OperationTracker::new(self.client).wait(operation).await?;
        info!("Disk {device_name} attached to {name}");
        Ok(())
    }

    /// Detaches a disk from the instance by device name.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call or the operation fails.
    pub async fn detach_disk(
        &self,
        ctx: &ExecutionContext,
        props: &InstanceProperties,
        device_name: &str,
    ) -> Result<()> {
        let (zone, name) = target(ctx, props);
        let operation = self.client.detach_disk(&zone, &name, device_name).await?;
        OperationTracker::new(self.client).wait(operation).await?;
        info!("Disk {device_name} detached from {name}");
        Ok(())
    }
}

/// Resolves the (zone, provider name) pair for an instance, preferring
/// what was recorded at create.
fn target(ctx: &ExecutionContext, props: &InstanceProperties) -> (String, String) {
    let zone = ctx.effective_zone(props.zone.as_deref());
    let name = ctx
        .state
        .name
        .clone()
        .unwrap_or_else(|| sanitize_resource_name(&props.name));
    (zone, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeState;

    #[test]
    fn target_prefers_recorded_name() {
        let props = InstanceProperties {
            name: String::from("My Web Server"),
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
            os_family: crate::config::spec::OsFamily::Linux,
            install_agent: false,
            use_external_resource: false,
            metadata: std::collections::HashMap::new(),
        };

        let mut ctx = ExecutionContext::new("node-1", "example-project", "us-east1-b");
        assert_eq!(
            target(&ctx, &props),
            (String::from("us-east1-b"), String::from("my-web-server"))
        );

        let mut state = RuntimeState::new();
        state.name = Some(String::from("my-web-server-0"));
        state.zone = Some(String::from("us-west1-a"));
        ctx = ctx.with_state(state);
        assert_eq!(
            target(&ctx, &props),
            (String::from("us-west1-a"), String::from("my-web-server-0"))
        );
    }
}
