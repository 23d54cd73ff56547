//! # Transfer Manifest
//!
//! The input file is a JSON array of records, each pointing at one stored
//! object:
//!
//! ```json
//! [{ "id": 17, "node": { "bucket": "src-bucket", "path": "dir/file.bam" } }]
//! ```
//!
//! `id` is opaque and copied verbatim to the output record, so results can be
//! joined back to whatever produced the manifest. Keys in `node` other than
//! `bucket` and `path` are ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TransferError};
use crate::storage::{ObjectLocation, ObjectMetadata};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: Value,
    pub node: ManifestNode,
}

impl ManifestEntry {
    pub fn source(&self) -> ObjectLocation {
        ObjectLocation::new(&self.node.bucket, &self.node.path)
    }
}

/// The output counterpart of a [`ManifestEntry`]: same `id`, `node` replaced
/// by the metadata of the transferred object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Value,
    pub node: ObjectMetadata,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            TransferError::Manifest(msg) => {
                TransferError::Manifest(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parses and validates manifest text. Every failure is a
    /// [`TransferError::Manifest`].
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(text).map_err(|e| TransferError::Manifest(e.to_string()))?;

        for (idx, entry) in entries.iter().enumerate() {
            if entry.node.bucket.trim().is_empty() {
                return Err(TransferError::Manifest(format!("entry {idx} has an empty bucket")));
            }
            if entry.node.path.is_empty() {
                return Err(TransferError::Manifest(format!("entry {idx} has an empty path")));
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
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
