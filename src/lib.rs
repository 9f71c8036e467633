// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![warn(warnings)]                    // Surface every warning
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # GCP Lifecycle
//!
//! A declarative, idempotent lifecycle adapter for Google Cloud resources.
//!
//! ## Overview
//!
//! The adapter translates declarative node definitions into GCP API calls
//! on behalf of a host orchestration runtime:
//!
//! - Build typed request bodies from property bags, applying all
//!   defaulting rules (networks, scopes, tags, boot disks, startup scripts)
//! - Track long-running operations, either blocking until they settle or
//!   suspending the step and re-attaching on the next invocation
//! - Merge IAM policy bindings idempotently with etag-guarded
//!   read-modify-write cycles
//! - Discover existing resources and fan out one deployment per discovery
//!   onto a companion orchestration service
//!
//! ## Architecture
//!
//! Every lifecycle operation receives an explicit [`ExecutionContext`]
//! carrying the node identity and its persisted [`RuntimeState`]; there
//! are no ambient globals. Re-entry is safe everywhere: a confirmed
//! resource is never created twice, and an in-flight operation recorded
//! in state is re-attached instead of resubmitted.
//!
//! ## Modules
//!
//! - [`config`]: Declarative node definitions and parsing
//! - [`context`]: Execution context and persisted runtime state
//! - [`gcp`]: Authentication, the typed REST client, operation tracking
//! - [`resource`]: Typed records, request builders, the resource seam
//! - [`iam`]: IAM policy merge and binding application
//! - [`lifecycle`]: Create/configure/delete operations per resource kind
//! - [`workflows`]: Discovery and deployment fan-out
//!
//! ## Example
//!
//! ```yaml
//! instances:
//!   - name: web-server
//!     machine_type: n1-standard-2
//!     image: projects/debian-cloud/global/images/family/debian-12
//!     external_ip: true
//!     tags: [http, https]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod context;
pub mod error;
pub mod gcp;
pub mod iam;
pub mod lifecycle;
pub mod resource;
pub mod workflows;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigParser, InstanceProperties, NodeSet, ProjectProperties};
pub use context::{ExecutionContext, OperationKind, OperationRef, RuntimeState};
pub use error::{ConfigError, DeployError, GcpError, GcpLifecycleError, Result};
pub use gcp::{GcpClient, GcpCredentials, OperationTracker};
pub use iam::{merge_add, merge_remove, Binding, Policy, PolicyBindingHandler};
pub use lifecycle::{
    ensure_created, ensure_created_sync, ensure_deleted, ensure_deleted_sync, BindingOps,
    InstanceOps, ProjectOps,
};
pub use resource::{
    build_instance_body, CloudResource, InstanceResource, ProjectResource, ResourceKind, Scope,
};
pub use workflows::{
    discover, discover_and_deploy, plan_deployments, DeploymentBatch, DeploymentService,
    DiscoveredResource, RestDeploymentService,
};
