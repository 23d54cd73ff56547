//! # Google Cloud Storage Adapter
//!
//! Implements [`ObjectStore`] over the GCS JSON API (`/storage/v1`).
//! Every request carries a bearer token from the configured
//! [`TokenProvider`] and is retried with backoff on 408, 429 and 5xx responses
//! as well as on connection failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use transfer_common::config::Config;
use transfer_common::storage::{ObjectLocation, ObjectStore, RemoteObject, RewriteProgress};
use transfer_common::{Result, TransferError};

use crate::auth::{AuthSource, TokenProvider};

pub mod retry;
pub mod wire;

pub use retry::RetryPolicy;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const USER_AGENT: &str = concat!("bucket-transfer/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Upper bound for one API call. A single rewrite step may take a while on
/// the server before it answers.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Unreserved characters per RFC 3986; everything else in a name is escaped,
/// `/` included, so an object name stays one path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// HTTP client used for storage and token requests. Timed out requests
/// count as transient and are retried.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| TransferError::Http(e.to_string()))
}

/// What a request is about, used to turn a 404 into the right error.
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    Bucket(&'a str),
    Object(&'a ObjectLocation),
}

pub struct GcsStore {
    http: reqwest::Client,
    endpoint: String,
    auth: Arc<dyn TokenProvider>,
    billing_project: Option<String>,
    retry: RetryPolicy,
}

impl GcsStore {
    pub fn new(http: reqwest::Client, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            auth,
            billing_project: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Builds a store from the run configuration, resolving credentials from `auth`.
    pub fn from_config(cfg: &Config, auth: AuthSource) -> Result<Self> {
        let http = http_client(REQUEST_TIMEOUT)?;
        let provider = auth.into_provider(http.clone())?;

        let mut store = Self::new(http, provider)
            .with_retry(RetryPolicy::new(cfg.retries))
            .with_billing_project(cfg.requester_pays.then(|| cfg.project.clone()));
        if let Some(endpoint) = cfg.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            store = store.with_endpoint(endpoint);
        }
        Ok(store)
    }

    /// Points the store at another host, e.g. `http://localhost:4443` for an emulator.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        self.endpoint = if endpoint.contains("://") {
            endpoint.to_owned()
        } else {
            format!("http://{endpoint}")
        };
        self
    }

    /// Bills requests to `project` (`userProject`), needed for requester-pays buckets.
    pub fn with_billing_project(mut self, project: Option<String>) -> Self {
        self.billing_project = project;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth(&self) -> &dyn TokenProvider {
        self.auth.as_ref()
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}", self.endpoint, encode(bucket))
    }

    fn object_url(&self, location: &ObjectLocation) -> String {
        format!(
            "{}/o/{}",
            self.bucket_url(&location.bucket),
            encode(&location.path)
        )
    }

    fn rewrite_url(&self, source: &ObjectLocation, target: &ObjectLocation) -> String {
        format!(
            "{}/rewriteTo/b/{}/o/{}",
            self.object_url(source),
            encode(&target.bucket),
            encode(&target.path)
        )
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        subject: Subject<'_>,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut request = self.http.request(method.clone(), url).query(query);
            if let Some(project) = &self.billing_project {
                request = request.query(&[("userProject", project.as_str())]);
            }
            if let Some(token) = self.auth.token().await? {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                // An earlier attempt may have deleted the object before its answer was lost.
                Ok(response)
                    if method == Method::DELETE
                        && attempt > 1
                        && response.status() == StatusCode::NOT_FOUND =>
                {
                    debug!("{url} already gone after retried delete");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    if retry::is_retryable(status) && self.retry.allows_retry(attempt) {
                        let delay = self.retry.delay(attempt);
                        warn!(
                            "{method} {url} returned {status}, retry {attempt}/{} in {delay:?}",
                            self.retry.attempts
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(error_from_response(response, subject).await);
                }
                Err(e)
                    if (e.is_connect() || e.is_timeout()) && self.retry.allows_retry(attempt) =>
                {
                    let delay = self.retry.delay(attempt);
                    warn!("{method} {url} failed: {e}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(TransferError::Http(e.to_string())),
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, subject: Subject<'_>) -> Result<T> {
        let response = self.execute(Method::GET, url, &[], None, subject).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| TransferError::Decode(e.to_string()))
}

async fn error_from_response(response: Response, subject: Subject<'_>) -> TransferError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = wire::error_message(&body);

    match (status, subject) {
        (StatusCode::NOT_FOUND, Subject::Bucket(bucket)) => {
            TransferError::BucketNotFound(bucket.to_owned())
        }
        (StatusCode::NOT_FOUND, Subject::Object(location)) => {
            TransferError::ObjectNotFound(location.to_string())
        }
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            TransferError::PermissionDenied(message)
        }
        _ => TransferError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let url = self.bucket_url(bucket);
        self.execute(Method::GET, &url, &[("fields", "name")], None, Subject::Bucket(bucket))
            .await?;
        Ok(())
    }

    async fn stat(&self, location: &ObjectLocation) -> Result<RemoteObject> {
        let url = self.object_url(location);
        let resource: wire::ObjectResource =
            self.get_json(&url, Subject::Object(location)).await?;
        Ok(resource.into())
    }

    async fn rewrite(
        &self,
        source: &ObjectLocation,
        target: &ObjectLocation,
        token: Option<String>,
    ) -> Result<RewriteProgress> {
        let url = self.rewrite_url(source, target);
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = token.as_deref() {
            query.push(("rewriteToken", token));
        }

        debug!(%source, %target, resumed = token.is_some(), "rewrite call");
        let response = self
            .execute(Method::POST, &url, &query, Some(&json!({})), Subject::Object(source))
            .await?;
        let response: wire::RewriteResponse = decode(response).await?;
        Ok(response.into())
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<()> {
        let url = self.object_url(location);
        self.execute(Method::DELETE, &url, &[], None, Subject::Object(location))
            .await?;
        Ok(())
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
