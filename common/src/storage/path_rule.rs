//! Rules that reshape object paths on their way to the target bucket.
//!
//! Some source buckets carry a fixed directory prefix that has no meaning in
//! the target layout, e.g. `data/bina-deliverables/401593083/.../alignments.bam`
//! should land as `401593083/.../alignments.bam`. A [`PathRule`] scoped to that
//! source bucket strips the leading components.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::{Result, TransferError};
use crate::storage::ObjectLocation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathRuleError {
    #[error("expected BUCKET:COUNT, got '{0}'")]
    MissingSeparator(String),
    #[error("empty bucket name in '{0}'")]
    EmptyBucket(String),
    #[error("invalid component count in '{input}': {reason}")]
    InvalidCount { input: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub bucket: String,
    pub strip_components: usize,
}

impl PathRule {
    pub fn new(bucket: impl Into<String>, strip_components: usize) -> Self {
        Self {
            bucket: bucket.into(),
            strip_components,
        }
    }

    pub fn matches(&self, source: &ObjectLocation) -> bool {
        self.bucket == source.bucket
    }

    /// Drops the leading `strip_components` components of `path`.
    pub fn apply(&self, path: &str) -> String {
        path.split('/')
            .skip(self.strip_components)
            .collect::<Vec<&str>>()
            .join("/")
    }
}

impl FromStr for PathRule {
    type Err = PathRuleError;

    /// Parses `BUCKET:COUNT`, e.g. `gbsc-gcp-project-mvp-phase-2-data:2`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let Some((bucket, count)) = s.rsplit_once(':') else {
            return Err(PathRuleError::MissingSeparator(s.to_owned()));
        };

        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(PathRuleError::EmptyBucket(s.to_owned()));
        }

        let strip_components =
            count
                .trim()
                .parse::<usize>()
                .map_err(|e| PathRuleError::InvalidCount {
                    input: s.to_owned(),
                    reason: e.to_string(),
                })?;

        Ok(Self::new(bucket, strip_components))
    }
}

impl fmt::Display for PathRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bucket, self.strip_components)
    }
}

/// Resolves the target path for `source`. The first matching rule wins; with
/// no match the path is kept as is.
pub fn resolve_target_path(rules: &[PathRule], source: &ObjectLocation) -> Result<String> {
    let Some(rule) = rules.iter().find(|rule| rule.matches(source)) else {
        return Ok(source.path.clone());
    };

    let target = rule.apply(&source.path);
    if target.is_empty() {
        return Err(TransferError::EmptyTargetPath(source.to_string()));
    }

    tracing::debug!(%rule, from = %source.path, to = %target, "applied path rule");
    Ok(target)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
