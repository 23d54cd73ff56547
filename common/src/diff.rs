//! Field-by-field comparison of object metadata.
//!
//! A rewrite legitimately changes some fields (bucket, id, timestamps, links).
//! The fields in [`CONTENT_FIELDS`] identify the bytes themselves; any change
//! there means the target does not hold the same content as the source.

use std::fmt;

use serde_json::Value;

use crate::storage::ObjectMetadata;

pub const CONTENT_FIELDS: &[&str] = &["md5_hash", "crc23c", "content-type"];

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataChange {
    pub field: &'static str,
    pub before: Value,
    pub after: Value,
}

impl MetadataChange {
    pub fn is_content_change(&self) -> bool {
        CONTENT_FIELDS.contains(&self.field)
    }
}

impl fmt::Display for MetadataChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.field, self.before, self.after)
    }
}

pub fn diff(source: &ObjectMetadata, target: &ObjectMetadata) -> Vec<MetadataChange> {
    source
        .fields()
        .into_iter()
        .zip(target.fields())
        .filter(|((_, before), (_, after))| before != after)
        .map(|((field, before), (_, after))| MetadataChange {
            field,
            before,
            after,
        })
        .collect()
}

/// Changes among `changes` that touch content identity.
pub fn content_changes(changes: &[MetadataChange]) -> Vec<&MetadataChange> {
    changes.iter().filter(|c| c.is_content_change()).collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
