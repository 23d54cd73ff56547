//! # Transfer Service
//!
//! Implements the "move objects into one bucket" use case.
//!
//! For each manifest entry the service:
//! 1. resolves the target path (applying [`PathRule`]s),
//! 2. reads the source metadata,
//! 3. drives the server-side rewrite until the store reports it done,
//! 4. reads the target metadata and diffs it against the source,
//! 5. rejects the result if content identifying fields changed,
//! 6. optionally deletes the source, and
//! 7. emits a [`TransferRecord`] mirroring the manifest entry.
//!
//! The storage itself is reached only through the [`ObjectStore`] port.
//!
//! [`PathRule`]: transfer_common::storage::PathRule

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use transfer_common::config::TransferSettings;
use transfer_common::diff::{self, MetadataChange};
use transfer_common::manifest::{Manifest, ManifestEntry, TransferRecord};
use transfer_common::storage::path_rule::resolve_target_path;
use transfer_common::storage::{ObjectLocation, ObjectMetadata, ObjectStore, RewriteProgress};
use transfer_common::{Result, TransferError};

use crate::output::RecordSink;

/// Notifications emitted while a run progresses.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    Started {
        index: usize,
        total: usize,
        source: &'a ObjectLocation,
        target: &'a ObjectLocation,
        size: u64,
    },
    Rewriting {
        index: usize,
        progress: &'a RewriteProgress,
    },
    Completed {
        index: usize,
        report: &'a EntryReport,
    },
    Failed {
        index: usize,
        source: &'a ObjectLocation,
        error: &'a TransferError,
    },
}

pub type ProgressCallback = Box<dyn Fn(ProgressEvent<'_>) + Send + Sync>;

/// Outcome of one successfully transferred entry.
#[derive(Debug, Clone)]
pub struct EntryReport {
    pub index: usize,
    pub source: ObjectLocation,
    pub target: ObjectLocation,
    pub record: TransferRecord,
    pub changes: Vec<MetadataChange>,
    pub rewrite_calls: u32,
    pub source_deleted: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct FailedEntry {
    pub index: usize,
    pub source: ObjectLocation,
    pub error: TransferError,
}

#[derive(Debug, Default)]
pub struct TransferSummary {
    pub total: usize,
    pub completed: Vec<EntryReport>,
    pub failed: Vec<FailedEntry>,
    /// Entries never attempted because the run stopped early.
    pub skipped: usize,
    pub elapsed: Duration,
}

impl TransferSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.completed.iter().map(|r| r.record.node.size).sum()
    }

    pub fn deleted_sources(&self) -> usize {
        self.completed.iter().filter(|r| r.source_deleted).count()
    }
}

pub struct TransferService<S: ObjectStore> {
    store: S,
    settings: TransferSettings,
    on_progress: Option<ProgressCallback>,
    known_buckets: Mutex<HashSet<String>>,
}

impl<S: ObjectStore> TransferService<S> {
    pub fn new(store: S, settings: TransferSettings) -> Self {
        Self {
            store,
            settings,
            on_progress: None,
            known_buckets: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn emit(&self, event: ProgressEvent<'_>) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }

    /// Checks a bucket once per run.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let known = self
            .known_buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(bucket);
        if known {
            return Ok(());
        }

        self.store.ensure_bucket(bucket).await?;
        self.known_buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket.to_owned());
        Ok(())
    }

    /// Verifies the target bucket before any object is touched.
    pub async fn prepare(&self) -> Result<()> {
        info!("Checking target bucket {}", self.settings.target_bucket);
        self.ensure_bucket(&self.settings.target_bucket).await
    }

    /// Transfers one manifest entry. `index` only labels progress events.
    pub async fn transfer_entry(
        &self,
        index: usize,
        total: usize,
        entry: &ManifestEntry,
    ) -> Result<EntryReport> {
        let mut report = self.copy_entry(index, total, entry).await?;
        self.release_source(&mut report).await?;
        Ok(report)
    }

    /// Copies and verifies one entry. The source is left in place.
    async fn copy_entry(
        &self,
        index: usize,
        total: usize,
        entry: &ManifestEntry,
    ) -> Result<EntryReport> {
        let start = Instant::now();
        let source = entry.source();
        let target = ObjectLocation::new(
            &self.settings.target_bucket,
            resolve_target_path(&self.settings.path_rules, &source)?,
        );

        if source == target {
            return Err(TransferError::SameLocation(source.to_string()));
        }

        info!(
            "Beginning transfer of {} from {} to {}",
            source.path, source.bucket, target.bucket
        );

        self.ensure_bucket(&source.bucket).await?;
        let source_object = self.store.stat(&source).await?;
        let source_meta = ObjectMetadata::from_remote(&source_object);
        debug!("Source metadata: {source_meta:?}");

        self.emit(ProgressEvent::Started {
            index,
            total,
            source: &source,
            target: &target,
            size: source_object.size,
        });

        info!("Rewriting {source} to {target}");
        let rewrite_calls = self.rewrite(index, &source, &target).await?;

        let target_meta = ObjectMetadata::from_remote(&self.store.stat(&target).await?);
        let changes = diff::diff(&source_meta, &target_meta);
        for change in &changes {
            info!("Changed metadata: {change}");
        }

        let content = diff::content_changes(&changes);
        if !content.is_empty() {
            for change in &content {
                error!("Content changed: {change}");
            }
            return Err(TransferError::ContentChanged {
                target: target.to_string(),
                fields: content
                    .iter()
                    .map(|c| c.field)
                    .collect::<Vec<&str>>()
                    .join(", "),
            });
        }

        Ok(EntryReport {
            index,
            source,
            target,
            record: TransferRecord {
                id: entry.id.clone(),
                node: target_meta,
            },
            changes,
            rewrite_calls,
            source_deleted: false,
            elapsed: start.elapsed(),
        })
    }

    /// Deletes the source of a verified copy when `delete_source` is set.
    async fn release_source(&self, report: &mut EntryReport) -> Result<()> {
        if self.settings.delete_source {
            info!("Deleting source {}", report.source);
            self.store.delete(&report.source).await?;
            report.source_deleted = true;
        }
        Ok(())
    }

    /// Calls rewrite until the store reports completion. Returns the number of calls.
    async fn rewrite(
        &self,
        index: usize,
        source: &ObjectLocation,
        target: &ObjectLocation,
    ) -> Result<u32> {
        let mut token: Option<String> = None;
        let mut calls: u32 = 0;

        loop {
            let progress = self.store.rewrite(source, target, token.take()).await?;
            calls += 1;
            self.emit(ProgressEvent::Rewriting {
                index,
                progress: &progress,
            });

            if progress.done {
                info!(
                    "Rewrite complete. {} of {} total bytes written.",
                    progress.bytes_rewritten, progress.object_size
                );
                return Ok(calls);
            }

            info!(
                "Rewrite status: {} of {} total bytes written ({:.1}%).",
                progress.bytes_rewritten,
                progress.object_size,
                progress.percent()
            );
            match progress.token {
                Some(next) => token = Some(next),
                None => {
                    return Err(TransferError::Decode(format!(
                        "rewrite of {source} not done but no token returned"
                    )));
                }
            }
        }
    }

    /// Transfers every entry of `manifest` in order, appending each record to
    /// `sink` as soon as it completes.
    ///
    /// Entry failures are collected in the summary. Unless `keep_going` is
    /// set, the first failure ends the run. Errors from `prepare` or from the
    /// sink are returned directly.
    ///
    /// A record reaches the sink before its source is deleted, so a sink
    /// failure never loses the metadata of a moved object.
    pub async fn run(
        &self,
        manifest: &Manifest,
        sink: &mut dyn RecordSink,
    ) -> Result<TransferSummary> {
        let start = Instant::now();
        let total = manifest.len();
        let mut summary = TransferSummary {
            total,
            ..TransferSummary::default()
        };

        info!("Found {total} objects to transfer");
        self.prepare().await?;

        for (index, entry) in manifest.entries().iter().enumerate() {
            let outcome = match self.copy_entry(index, total, entry).await {
                Ok(mut report) => {
                    sink.append(&report.record)?;
                    self.release_source(&mut report).await.map(|()| report)
                }
                Err(error) => Err(error),
            };

            match outcome {
                Ok(report) => {
                    self.emit(ProgressEvent::Completed {
                        index,
                        report: &report,
                    });
                    summary.completed.push(report);
                }
                Err(error) => {
                    let source = entry.source();
                    error!("Transfer of {source} failed: {error}");
                    self.emit(ProgressEvent::Failed {
                        index,
                        source: &source,
                        error: &error,
                    });
                    summary.failed.push(FailedEntry {
                        index,
                        source,
                        error,
                    });

                    if !self.settings.keep_going {
                        summary.skipped = total - index - 1;
                        if summary.skipped > 0 {
                            warn!(
                                "Stopping after failure, {} entries not attempted",
                                summary.skipped
                            );
                        }
                        break;
                    }
                }
            }
        }

        summary.elapsed = start.elapsed();
        Ok(summary)
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
