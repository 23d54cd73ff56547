//! # Transfer Common
//!
//! Shared building blocks for `bucket-transfer`.
//!
//! * **[`storage`]**: the [`storage::ObjectStore`] port plus object models and path rules.
//! * **[`manifest`]**: the input list of objects and the records written back out.
//! * **[`diff`]**: comparison of source and target metadata.
//! * **[`config`]**: options shared between the CLI and the transfer service.
//! * **[`error`]**: the error taxonomy used across crates.

pub mod config;
pub mod diff;
pub mod error;
pub mod manifest;
pub mod storage;

pub use error::{Result, TransferError};
