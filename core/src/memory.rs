//! In-process [`ObjectStore`].
//!
//! Behaves like GCS where the transfer service can observe it: missing buckets
//! and objects, multi-call rewrites with continuation tokens, MD5 and CRC32C
//! checksums in base64. Faults can be injected to exercise failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use crc::{CRC_32_ISCSI, Crc};

use transfer_common::storage::{ObjectLocation, ObjectStore, RemoteObject, RewriteProgress};
use transfer_common::{Result, TransferError};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);
const DEFAULT_CHUNK: u64 = 1024 * 1024;
const STANDARD_CLASS: &str = "STANDARD";

pub fn md5_base64(content: &[u8]) -> String {
    STANDARD.encode(md5::compute(content).0)
}

pub fn crc32c_base64(content: &[u8]) -> String {
    STANDARD.encode(CASTAGNOLI.checksum(content).to_be_bytes())
}

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    content_type: Option<String>,
    generation: u64,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Faults {
    rewrite_content_type: Option<String>,
    failing_sources: HashSet<ObjectLocation>,
}

#[derive(Debug, Default)]
struct State {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    generation: u64,
    rewrite_calls: u64,
}

pub struct MemoryStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    chunk_size: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            faults: Mutex::new(Faults::default()),
            chunk_size: DEFAULT_CHUNK,
        }
    }

    /// Bytes copied per rewrite call. Objects larger than this need a token.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.state().buckets.entry(bucket.to_owned()).or_default();
    }

    pub fn put(&self, location: &ObjectLocation, content: &[u8], content_type: Option<&str>) {
        let mut state = self.state();
        state.generation += 1;
        let object = StoredObject {
            content: content.to_vec(),
            content_type: content_type.map(str::to_owned),
            generation: state.generation,
            created: Utc::now(),
            updated: Utc::now(),
        };
        state
            .buckets
            .entry(location.bucket.clone())
            .or_default()
            .insert(location.path.clone(), object);
    }

    pub fn contains(&self, location: &ObjectLocation) -> bool {
        self.state()
            .buckets
            .get(&location.bucket)
            .is_some_and(|objects| objects.contains_key(&location.path))
    }

    pub fn content(&self, location: &ObjectLocation) -> Option<Vec<u8>> {
        self.state()
            .buckets
            .get(&location.bucket)?
            .get(&location.path)
            .map(|object| object.content.clone())
    }

    pub fn rewrite_calls(&self) -> u64 {
        self.state().rewrite_calls
    }

    /// Makes every finished rewrite store `content_type` on the target.
    pub fn corrupt_content_type_on_rewrite(&self, content_type: &str) {
        self.faults().rewrite_content_type = Some(content_type.to_owned());
    }

    /// Makes rewrites from `source` fail with a server error.
    pub fn fail_rewrites_from(&self, source: &ObjectLocation) {
        self.faults().failing_sources.insert(source.clone());
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(bucket: &str, name: &str, object: &StoredObject) -> RemoteObject {
        RemoteObject {
            bucket: bucket.to_owned(),
            name: name.to_owned(),
            id: format!("{bucket}/{name}/{}", object.generation),
            size: object.content.len() as u64,
            md5_hash: Some(md5_base64(&object.content)),
            crc32c: Some(crc32c_base64(&object.content)),
            storage_class: Some(STANDARD_CLASS.to_owned()),
            time_created: object.created,
            updated: object.updated,
            self_link: format!("memory://{bucket}/{name}"),
            content_type: object.content_type.clone(),
        }
    }
}

fn parse_offset(token: Option<&str>) -> Result<u64> {
    match token {
        None => Ok(0),
        Some(token) => token
            .strip_prefix("offset:")
            .and_then(|offset| offset.parse::<u64>().ok())
            .ok_or_else(|| TransferError::Api {
                status: 400,
                message: format!("invalid rewrite token '{token}'"),
            }),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self.state().buckets.contains_key(bucket) {
            Ok(())
        } else {
            Err(TransferError::BucketNotFound(bucket.to_owned()))
        }
    }

    async fn stat(&self, location: &ObjectLocation) -> Result<RemoteObject> {
        let state = self.state();
        let objects = state
            .buckets
            .get(&location.bucket)
            .ok_or_else(|| TransferError::BucketNotFound(location.bucket.clone()))?;
        let object = objects
            .get(&location.path)
            .ok_or_else(|| TransferError::ObjectNotFound(location.to_string()))?;
        Ok(Self::describe(&location.bucket, &location.path, object))
    }

    async fn rewrite(
        &self,
        source: &ObjectLocation,
        target: &ObjectLocation,
        token: Option<String>,
    ) -> Result<RewriteProgress> {
        let corrupt_type = {
            let faults = self.faults();
            if faults.failing_sources.contains(source) {
                return Err(TransferError::Api {
                    status: 500,
                    message: format!("backend error rewriting {source}"),
                });
            }
            faults.rewrite_content_type.clone()
        };

        let mut state = self.state();
        state.rewrite_calls += 1;

        if !state.buckets.contains_key(&target.bucket) {
            return Err(TransferError::BucketNotFound(target.bucket.clone()));
        }
        let object = state
            .buckets
            .get(&source.bucket)
            .and_then(|objects| objects.get(&source.path))
            .cloned()
            .ok_or_else(|| TransferError::ObjectNotFound(source.to_string()))?;

        let object_size = object.content.len() as u64;
        let offset = parse_offset(token.as_deref())?;
        let bytes_rewritten = offset.saturating_add(self.chunk_size).min(object_size);

        if bytes_rewritten < object_size {
            return Ok(RewriteProgress {
                bytes_rewritten,
                object_size,
                done: false,
                token: Some(format!("offset:{bytes_rewritten}")),
            });
        }

        state.generation += 1;
        let now = Utc::now();
        let copy = StoredObject {
            content: object.content,
            content_type: corrupt_type.or(object.content_type),
            generation: state.generation,
            created: now,
            updated: now,
        };
        if let Some(objects) = state.buckets.get_mut(&target.bucket) {
            objects.insert(target.path.clone(), copy);
        }

        Ok(RewriteProgress {
            bytes_rewritten,
            object_size,
            done: true,
            token: None,
        })
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<()> {
        self.state()
            .buckets
            .get_mut(&location.bucket)
            .and_then(|objects| objects.remove(&location.path))
            .map(|_| ())
            .ok_or_else(|| TransferError::ObjectNotFound(location.to_string()))
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
