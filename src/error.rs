//! Error types for the GCP lifecycle adapter.
//!
//! This module provides the error hierarchy for all operations in the
//! resource lifecycle: declarative configuration, GCP API calls,
//! long-running operations, IAM policy writes, and deployment fan-out.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the GCP lifecycle adapter.
#[derive(Debug, Error)]
pub enum GcpLifecycleError {
    /// Configuration-related errors (bad or missing declarative input).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// GCP API errors.
    #[error("GCP API error: {0}")]
    Gcp(#[from] GcpError),

    /// Deployment-orchestration service errors.
    #[error("Deployment service error: {0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
///
/// These are fatal: the declarative input is wrong and re-running the
/// operation without changing it cannot succeed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The node definition file was not found.
    #[error("Node definition file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The node definition could not be parsed.
    #[error("Failed to parse node definitions: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (instance, project, etc.).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// More than one disk is marked as the boot disk.
    #[error("Only one disk per instance may be a boot disk, found {count}")]
    MultipleBootDisks {
        /// Number of disks marked as boot.
        count: usize,
    },

    /// No disks were supplied and no image reference is available.
    #[error("A disk image ID must be provided when no disks are attached")]
    MissingBootImage,

    /// Startup script file could not be read.
    #[error("Failed to read startup script {path}: {message}")]
    StartupScriptUnreadable {
        /// Path to the script.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// GCP API errors.
#[derive(Debug, Error)]
pub enum GcpError {
    /// Authentication failed.
    #[error("GCP authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The provider rejected the request synchronously (quota, validation,
    /// permission). Fatal and never retried.
    #[error("GCP rejected request for {resource}: {status} - {message}")]
    Rejected {
        /// Resource the request addressed.
        resource: String,
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// An asynchronous operation reached DONE with an embedded error payload.
    /// Fatal: retrying a failed create could double-provision.
    #[error("GCP operation failed for {resource}: {code} - {message}")]
    OperationFailed {
        /// Resource the operation addressed.
        resource: String,
        /// Provider error code.
        code: String,
        /// Provider error message.
        message: String,
    },

    /// The resource or operation is not yet in a usable state. Retryable;
    /// the caller should suspend and re-invoke after the suggested delay.
    #[error("{resource} not ready: {message} (retry in {retry_after_secs}s)")]
    NotReady {
        /// Resource being waited on.
        resource: String,
        /// Description of what is still pending.
        message: String,
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The remote rejected a write because the concurrency fingerprint
    /// (etag) no longer matches. The caller must re-run the full
    /// read-modify-write cycle.
    #[error("Concurrent modification detected on {resource}")]
    ConcurrentModification {
        /// Resource whose fingerprint was stale.
        resource: String,
    },

    /// The resource already exists. Surfaced by create paths so resumed
    /// steps can treat resubmission as success.
    #[error("Resource already exists: {resource}")]
    AlreadyExists {
        /// Identifier of the existing resource.
        resource: String,
    },

    /// The resource was not found.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Identifier of the missing resource.
        resource: String,
    },

    /// Rate limited by the API.
    #[error("GCP API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with GCP: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from GCP API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors from the companion deployment-orchestration service.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The service rejected a request.
    #[error("Deployment service request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with deployment service: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the service.
    #[error("Invalid response from deployment service: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, GcpLifecycleError>;

impl GcpLifecycleError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    ///
    /// Retryable errors propagate to the host runtime as "retry-after"
    /// signals; everything else is unrecoverable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Gcp(
                GcpError::NotReady { .. }
                    | GcpError::RateLimited { .. }
                    | GcpError::NetworkError { .. }
            ) | Self::Deploy(DeployError::NetworkError { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Gcp(
                GcpError::NotReady {
                    retry_after_secs, ..
                }
                | GcpError::RateLimited { retry_after_secs },
            ) => Some(*retry_after_secs),
            Self::Gcp(GcpError::NetworkError { .. })
            | Self::Deploy(DeployError::NetworkError { .. }) => Some(5),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl GcpError {
    /// Creates a synchronous rejection error.
    #[must_use]
    pub fn rejected(resource: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            resource: resource.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-ready error with the given retry delay.
    #[must_use]
    pub fn not_ready(
        resource: impl Into<String>,
        message: impl Into<String>,
        retry_after_secs: u64,
    ) -> Self {
        Self::NotReady {
            resource: resource.into(),
            message: message.into(),
            retry_after_secs,
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl DeployError {
    /// Creates a request-failed error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
