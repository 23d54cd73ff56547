use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use transfer_common::{Result, TransferError};

use super::{AccessTokenResponse, STORAGE_SCOPE, TokenCache, TokenProvider, read_token_response};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

/// The fields of a service account key file that the JWT flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Exchanges a self-signed RS256 assertion for an access token.
pub struct ServiceAccount {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http: reqwest::Client,
    cache: TokenCache,
}

impl ServiceAccount {
    pub fn from_file(path: &Path, http: reqwest::Client) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let key: ServiceAccountKey = serde_json::from_str(&text).map_err(|e| {
            TransferError::Auth(format!("invalid key file {}: {e}", path.display()))
        })?;
        Self::new(key, http)
    }

    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| TransferError::Auth(format!("invalid private key: {e}")))?;
        Ok(Self {
            key,
            signing_key,
            http,
            cache: TokenCache::default(),
        })
    }

    fn assertion(&self) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: STORAGE_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ASSERTION_LIFETIME_SECS)).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| TransferError::Auth(format!("failed to sign assertion: {e}")))
    }

    async fn exchange(&self) -> Result<AccessTokenResponse> {
        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TransferError::Auth(format!("token exchange failed: {e}")))?;
        read_token_response(response).await
    }
}

#[async_trait]
impl TokenProvider for ServiceAccount {
    async fn token(&self) -> Result<Option<String>> {
        let token = self.cache.get_or_fetch(|| self.exchange()).await?;
        Ok(Some(token))
    }

    fn describe(&self) -> String {
        format!("service account {}", self.key.client_email)
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
