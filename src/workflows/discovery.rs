//! Resource discovery.
//!
//! Scans configured zones for existing resources (container-engine
//! clusters) and reports them as a nested map keyed by scope, then
//! resource type, then resource ID. Empty zones and zones that do not
//! exist produce empty maps rather than errors, so a scan over a
//! half-provisioned environment still succeeds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::spec::DiscoveryProperties;
use crate::error::{ConfigError, GcpError, GcpLifecycleError, Result};
use crate::gcp::GcpClient;

/// Resource type selector for container-engine clusters.
pub const CLUSTER_RESOURCE_TYPE: &str = "projects.zones.clusters";

/// Nested discovery result: scope, then resource type, then resource ID.
pub type DiscoveryMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, DiscoveredResource>>>;

/// A resource found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    /// Resource name (the ID within its scope).
    pub name: String,
    /// Resource type selector it was found under.
    pub resource_type: String,
    /// Zone the resource lives in.
    pub zone: String,
    /// Endpoint address, when the resource exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Provider status string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Scans the configured zones for the configured resource types.
///
/// # Errors
///
/// Returns a validation error for unsupported resource types; API
/// failures other than a missing zone propagate unchanged.
pub async fn discover(client: &GcpClient, props: &DiscoveryProperties) -> Result<DiscoveryMap> {
    let mut map = DiscoveryMap::new();

    for zone in &props.zones {
        let per_type = map.entry(zone.clone()).or_default();
        for resource_type in &props.resource_types {
            if resource_type != CLUSTER_RESOURCE_TYPE {
                return Err(ConfigError::validation(
                    format!("Unsupported discovery resource type: {resource_type}"),
                    "resource_types",
                )
                .into());
            }

            let clusters = match client.list_clusters(zone).await {
                Ok(clusters) => clusters,
                Err(GcpLifecycleError::Gcp(GcpError::NotFound { .. })) => {
                    warn!("Zone {zone} not found during discovery, skipping");
                    Vec::new()
                }
                Err(e) => return Err(e),
            };

            debug!("Found {} cluster(s) in {zone}", clusters.len());
            let by_id = per_type.entry(resource_type.clone()).or_default();
            for cluster in clusters {
                by_id.insert(
                    cluster.name.clone(),
                    DiscoveredResource {
                        name: cluster.name,
                        resource_type: resource_type.clone(),
                        zone: cluster.zone.unwrap_or_else(|| zone.clone()),
                        endpoint: cluster.endpoint,
                        status: cluster.status,
                    },
                );
            }
        }
    }

    let total: usize = map
        .values()
        .flat_map(BTreeMap::values)
        .map(BTreeMap::len)
        .sum();
    info!("Discovery found {total} resource(s) across {} zone(s)", props.zones.len());
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_resource_round_trips_through_state() {
        let resource = DiscoveredResource {
            name: String::from("kube-1"),
            resource_type: CLUSTER_RESOURCE_TYPE.to_string(),
            zone: String::from("us-east1-b"),
            endpoint: Some(String::from("35.1.2.3")),
            status: Some(String::from("RUNNING")),
        };
        let json = serde_json::to_string(&resource).expect("serializes");
        let back: DiscoveredResource = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, resource);
    }
}
