//! Environment workflows: discovery of existing resources and fan-out of
//! per-resource deployments onto the companion orchestration service.

pub mod deploy;
pub mod discovery;

pub use deploy::{
    deploy, discover_and_deploy, plan_deployments, DeploymentBatch, DeploymentGroup,
    DeploymentInputs, DeploymentService, DeploymentSpec, Label, RestDeploymentService,
};
pub use discovery::{discover, DiscoveredResource, DiscoveryMap, CLUSTER_RESOURCE_TYPE};
