use async_trait::async_trait;

use transfer_common::{Result, TransferError};

use super::{AccessTokenResponse, TokenCache, TokenProvider, read_token_response};

const DEFAULT_HOST: &str = "metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens of the default service account of the GCE instance or GKE pod the
/// tool runs on. `GCE_METADATA_HOST` overrides the host.
pub struct MetadataServer {
    url: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl MetadataServer {
    pub fn new(http: reqwest::Client) -> Self {
        let host = std::env::var("GCE_METADATA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_owned());
        Self::with_host(&host, http)
    }

    pub fn with_host(host: &str, http: reqwest::Client) -> Self {
        let host = host.trim_end_matches('/');
        let url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}{TOKEN_PATH}")
        } else {
            format!("http://{host}{TOKEN_PATH}")
        };
        Self {
            url,
            http,
            cache: TokenCache::default(),
        }
    }

    async fn fetch(&self) -> Result<AccessTokenResponse> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                TransferError::Auth(format!(
                    "metadata server unreachable ({e}); \
                     pass --credentials or --access-token outside GCP"
                ))
            })?;
        read_token_response(response).await
    }
}

#[async_trait]
impl TokenProvider for MetadataServer {
    async fn token(&self) -> Result<Option<String>> {
        let token = self.cache.get_or_fetch(|| self.fetch()).await?;
        Ok(Some(token))
    }

    fn describe(&self) -> String {
        "metadata server".to_owned()
    }
}
