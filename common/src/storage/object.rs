//! # Object Models
//!
//! * [`ObjectLocation`]: where an object lives (`gs://bucket/path`).
//! * [`RemoteObject`]: what a store reports about an object.
//! * [`ObjectMetadata`]: the flattened record written to the meta outfile and
//!   compared between source and target.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PUBLIC_HOST: &str = "https://storage.googleapis.com";

/// Characters left untouched in public URLs; `/` keeps the object's directory layout.
const PUBLIC_URL_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'~')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub path: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub bucket: String,
    pub name: String,
    pub id: String,
    pub size: u64,
    pub md5_hash: Option<String>,
    pub crc32c: Option<String>,
    pub storage_class: Option<String>,
    pub time_created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub self_link: String,
    pub content_type: Option<String>,
}

/// The components of an object path.
///
/// `name` and `extension` split the basename on its *first* period, so
/// `reads.fastq.gz` has name `reads` and extension `fastq.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts<'a> {
    pub dirname: &'a str,
    pub basename: &'a str,
    pub name: &'a str,
    pub extension: &'a str,
}

pub fn split_path(path: &str) -> PathParts<'_> {
    let (head, basename) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };
    // Trailing slashes go, unless the head is nothing but slashes.
    let dirname = if head.bytes().all(|b| b == b'/') {
        head
    } else {
        head.trim_end_matches('/')
    };
    let (name, extension) = basename.split_once('.').unwrap_or((basename, ""));
    PathParts {
        dirname,
        basename,
        name,
        extension,
    }
}

/// Seconds since the Unix epoch, keeping sub-second precision.
pub fn epoch_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1_000_000_000.0
}

/// RFC 3339 with a `+00:00` offset. Fractions are printed as microseconds,
/// and omitted entirely on whole seconds.
pub fn iso_timestamp(time: &DateTime<Utc>) -> String {
    let format = if time.timestamp_subsec_micros() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    time.to_rfc3339_opts(format, false)
}

pub fn public_url(bucket: &str, path: &str) -> String {
    format!(
        "{PUBLIC_HOST}/{bucket}/{}",
        utf8_percent_encode(path, PUBLIC_URL_SET)
    )
}

/// Flat metadata record of one stored object.
///
/// The serialized key names are consumed by downstream tooling and must not
/// change, `crc23c` included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub path: String,
    pub dirname: String,
    pub basename: String,
    pub name: String,
    pub extension: String,
    #[serde(rename = "gcs-id")]
    pub gcs_id: String,
    pub size: u64,
    pub md5_hash: Option<String>,
    #[serde(rename = "crc23c")]
    pub crc32c: Option<String>,
    #[serde(rename = "gcs-storage-class")]
    pub storage_class: Option<String>,
    #[serde(rename = "time-created-epoch")]
    pub time_created_epoch: f64,
    #[serde(rename = "time-created-iso")]
    pub time_created_iso: String,
    #[serde(rename = "time-updated-epoch")]
    pub time_updated_epoch: f64,
    #[serde(rename = "time-updated-iso")]
    pub time_updated_iso: String,
    #[serde(rename = "self-link")]
    pub self_link: String,
    #[serde(rename = "public-url")]
    pub public_url: String,
    #[serde(rename = "content-type")]
    pub content_type: Option<String>,
}

impl ObjectMetadata {
    pub fn from_remote(object: &RemoteObject) -> Self {
        let parts = split_path(&object.name);
        Self {
            bucket: object.bucket.clone(),
            path: object.name.clone(),
            dirname: parts.dirname.to_owned(),
            basename: parts.basename.to_owned(),
            name: parts.name.to_owned(),
            extension: parts.extension.to_owned(),
            gcs_id: object.id.clone(),
            size: object.size,
            md5_hash: object.md5_hash.clone(),
            crc32c: object.crc32c.clone(),
            storage_class: object.storage_class.clone(),
            time_created_epoch: epoch_seconds(&object.time_created),
            time_created_iso: iso_timestamp(&object.time_created),
            time_updated_epoch: epoch_seconds(&object.updated),
            time_updated_iso: iso_timestamp(&object.updated),
            self_link: object.self_link.clone(),
            public_url: public_url(&object.bucket, &object.name),
            content_type: object.content_type.clone(),
        }
    }

    /// Field values keyed by their serialized names, in declaration order.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("bucket", Value::from(self.bucket.as_str())),
            ("path", Value::from(self.path.as_str())),
            ("dirname", Value::from(self.dirname.as_str())),
            ("basename", Value::from(self.basename.as_str())),
            ("name", Value::from(self.name.as_str())),
            ("extension", Value::from(self.extension.as_str())),
            ("gcs-id", Value::from(self.gcs_id.as_str())),
            ("size", Value::from(self.size)),
            ("md5_hash", Value::from(self.md5_hash.clone())),
            ("crc23c", Value::from(self.crc32c.clone())),
            ("gcs-storage-class", Value::from(self.storage_class.clone())),
            ("time-created-epoch", Value::from(self.time_created_epoch)),
            ("time-created-iso", Value::from(self.time_created_iso.as_str())),
            ("time-updated-epoch", Value::from(self.time_updated_epoch)),
            ("time-updated-iso", Value::from(self.time_updated_iso.as_str())),
            ("self-link", Value::from(self.self_link.as_str())),
            ("public-url", Value::from(self.public_url.as_str())),
            ("content-type", Value::from(self.content_type.clone())),
        ]
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
