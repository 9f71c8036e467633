//! GCP API access: authentication, the typed REST client, and
//! long-running operation tracking.

pub mod auth;
pub mod client;
pub mod operations;

pub use auth::{default_project, default_zone, GcpCredentials};
pub use client::GcpClient;
pub use operations::OperationTracker;
