//! # Bearer Token Providers
//!
//! The GCS adapter asks a [`TokenProvider`] for a token before every request.
//! Providers that mint tokens cache them until shortly before expiry.
//!
//! Sources, in the order the CLI considers them:
//! 1. an access token given directly ([`StaticToken`]),
//! 2. a service account key file ([`service_account::ServiceAccount`]),
//! 3. the GCE metadata server ([`metadata::MetadataServer`]).
//!
//! [`Anonymous`] sends no credentials and is meant for emulators.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use transfer_common::{Result, TransferError};

pub mod metadata;
pub mod service_account;

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.full_control";

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns `None` when requests should go out unauthenticated.
    async fn token(&self) -> Result<Option<String>>;

    fn describe(&self) -> String;
}

pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }

    fn describe(&self) -> String {
        "access token".to_owned()
    }
}

pub struct Anonymous;

#[async_trait]
impl TokenProvider for Anonymous {
    async fn token(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn describe(&self) -> String {
        "anonymous".to_owned()
    }
}

/// OAuth2 token endpoint response, shared by the service account and
/// metadata server flows.
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Holds the last minted token and its expiry.
#[derive(Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Returns the cached token, or mints a new one with `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<AccessTokenResponse>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > Utc::now() {
                return Ok(cached.value.clone());
            }
        }

        let response = fetch().await?;
        tracing::debug!(expires_in = response.expires_in, "minted access token");
        let cached = CachedToken {
            value: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        };
        let value = cached.value.clone();
        *slot = Some(cached);
        Ok(value)
    }
}

pub(crate) async fn read_token_response(
    response: reqwest::Response,
) -> Result<AccessTokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransferError::Auth(format!(
            "token endpoint returned {status}: {body}"
        )));
    }
    response
        .json::<AccessTokenResponse>()
        .await
        .map_err(|e| TransferError::Auth(format!("malformed token response: {e}")))
}

/// Where credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSource {
    Token(String),
    CredentialsFile(PathBuf),
    MetadataServer,
    Anonymous,
}

impl AuthSource {
    pub fn select(token: Option<String>, credentials: Option<PathBuf>, anonymous: bool) -> Self {
        if anonymous {
            return Self::Anonymous;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            return Self::Token(token);
        }
        if let Some(path) = credentials {
            return Self::CredentialsFile(path);
        }
        Self::MetadataServer
    }

    pub fn into_provider(self, http: reqwest::Client) -> Result<Arc<dyn TokenProvider>> {
        let provider: Arc<dyn TokenProvider> = match self {
            Self::Token(token) => Arc::new(StaticToken::new(token)),
            Self::CredentialsFile(path) => {
                Arc::new(service_account::ServiceAccount::from_file(&path, http)?)
            }
            Self::MetadataServer => Arc::new(metadata::MetadataServer::new(http)),
            Self::Anonymous => Arc::new(Anonymous),
        };
        Ok(provider)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
