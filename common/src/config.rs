use std::path::PathBuf;

use crate::storage::PathRule;

pub const DEFAULT_RETRIES: u32 = 5;

/// Runtime options of a transfer run, as collected by the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project the storage client acts for.
    ///
    /// Only sent to the API as the billing project when `requester_pays` is set.
    pub project: String,
    /// JSON file listing the objects to move.
    pub manifest: PathBuf,
    pub target_bucket: String,
    /// JSON Lines file the target metadata is appended to.
    pub meta_outfile: PathBuf,
    pub delete_source: bool,
    pub path_rules: Vec<PathRule>,
    /// Continue with the next entry after a failed one.
    pub keep_going: bool,
    /// Attempts for requests failing with 429 or 5xx.
    pub retries: u32,
    pub requester_pays: bool,
    /// Overrides `https://storage.googleapis.com`, e.g. for an emulator.
    pub endpoint: Option<String>,
    pub quiet: u8,
}

impl Config {
    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            target_bucket: self.target_bucket.clone(),
            delete_source: self.delete_source,
            path_rules: self.path_rules.clone(),
            keep_going: self.keep_going,
        }
    }
}

/// The subset of [`Config`] the transfer service acts on.
#[derive(Debug, Clone, Default)]
pub struct TransferSettings {
    pub target_bucket: String,
    pub delete_source: bool,
    pub path_rules: Vec<PathRule>,
    pub keep_going: bool,
}

impl TransferSettings {
    pub fn new(target_bucket: impl Into<String>) -> Self {
        Self {
            target_bucket: target_bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_delete_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    pub fn with_path_rules(mut self, path_rules: Vec<PathRule>) -> Self {
        self.path_rules = path_rules;
        self
    }

    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }
}
