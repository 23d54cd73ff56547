//! # Transfer Core
//!
//! * **[`transfer`]**: the transfer use case, driving any
//!   [`transfer_common::storage::ObjectStore`].
//! * **[`gcs`]**: the Google Cloud Storage JSON API adapter.
//! * **[`auth`]**: bearer token providers for the GCS adapter.
//! * **[`memory`]**: an in-process store for tests and dry runs against fixtures.
//! * **[`output`]**: where transfer records are written.

pub mod auth;
pub mod gcs;
pub mod memory;
pub mod output;
pub mod transfer;
