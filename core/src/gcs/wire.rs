//! JSON shapes of the GCS JSON API responses we consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use transfer_common::storage::{RemoteObject, RewriteProgress};

/// GCS encodes 64-bit integers as decimal strings; plain numbers are accepted too.
fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Number(u64),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        Repr::Number(number) => Ok(number),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResource {
    pub id: String,
    pub name: String,
    pub bucket: String,
    #[serde(deserialize_with = "u64_from_string")]
    pub size: u64,
    pub md5_hash: Option<String>,
    pub crc32c: Option<String>,
    pub storage_class: Option<String>,
    pub time_created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub self_link: String,
    pub content_type: Option<String>,
}

impl From<ObjectResource> for RemoteObject {
    fn from(resource: ObjectResource) -> Self {
        Self {
            bucket: resource.bucket,
            name: resource.name,
            id: resource.id,
            size: resource.size,
            md5_hash: resource.md5_hash,
            crc32c: resource.crc32c,
            storage_class: resource.storage_class,
            time_created: resource.time_created,
            updated: resource.updated,
            self_link: resource.self_link,
            content_type: resource.content_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    #[serde(deserialize_with = "u64_from_string")]
    pub total_bytes_rewritten: u64,
    #[serde(deserialize_with = "u64_from_string")]
    pub object_size: u64,
    pub done: bool,
    pub rewrite_token: Option<String>,
}

impl From<RewriteResponse> for RewriteProgress {
    fn from(response: RewriteResponse) -> Self {
        Self {
            bytes_rewritten: response.total_bytes_rewritten,
            object_size: response.object_size,
            done: response.done,
            token: response.rewrite_token.filter(|token| !token.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Extracts `error.message` from an API error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}
