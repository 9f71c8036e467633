//! GCP authentication.
//!
//! Tokens come from Application Default Credentials (service account keys,
//! workload identity, or gcloud CLI credentials) with expiry-buffered
//! caching so long polling loops do not hand out stale tokens.

use gcp_auth::TokenProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{GcpError, Result};

/// OAuth scopes requested for all API calls.
pub const AUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Refresh tokens this long before they actually expire.
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Conservative token TTL when the provider does not report expiry.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// GCP credentials holder with token caching.
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl std::fmt::Debug for GcpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpCredentials").finish_non_exhaustive()
    }
}

impl GcpCredentials {
    /// Creates credentials using Application Default Credentials.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::AuthenticationFailed`] when no credential
    /// source can be found.
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| {
            GcpError::AuthenticationFailed {
                message: format!(
                    "Failed to initialize GCP credentials \
                     (run 'gcloud auth application-default login'): {e}"
                ),
            }
        })?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns an access token, refreshing the cache when the current
    /// token is expired or about to expire.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::AuthenticationFailed`] when the provider
    /// cannot mint a token.
    pub async fn token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                debug!("Cached token expired, fetching a new one");
            }
        }

        let token = self.provider.token(AUTH_SCOPES).await.map_err(|e| {
            GcpError::AuthenticationFailed {
                message: format!("Failed to get access token: {e}"),
            }
        })?;

        let token_str = token.as_str().to_string();
        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        Ok(token_str)
    }

    /// Drops the cached token and fetches a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`GcpError::AuthenticationFailed`] when the provider
    /// cannot mint a token.
    pub async fn refresh(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.token().await
    }
}

/// Reads the default project from the environment
/// (`GOOGLE_CLOUD_PROJECT` and friends).
#[must_use]
pub fn default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if !project.is_empty() {
                return Some(project);
            }
        }
    }
    None
}

/// Reads the default compute zone from the environment.
#[must_use]
pub fn default_zone() -> Option<String> {
    std::env::var("CLOUDSDK_COMPUTE_ZONE")
        .ok()
        .filter(|z| !z.is_empty())
}
