//! The storage **port**.
//!
//! The transfer service only talks to object storage through [`ObjectStore`].
//! Concrete stores (the GCS JSON API, the in-memory store used by tests) live
//! in `transfer-core` and are swapped in by whoever builds the service.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub mod object;
pub mod path_rule;

pub use object::{ObjectLocation, ObjectMetadata, RemoteObject};
pub use path_rule::PathRule;

/// State of a server-side rewrite after one call.
///
/// A rewrite of a large object may take several calls. While `done` is false
/// the caller must call again passing `token` back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteProgress {
    pub bytes_rewritten: u64,
    pub object_size: u64,
    pub done: bool,
    pub token: Option<String>,
}

impl RewriteProgress {
    pub fn percent(&self) -> f64 {
        if self.object_size == 0 {
            return 100.0;
        }
        self.bytes_rewritten as f64 * 100.0 / self.object_size as f64
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fails with [`crate::TransferError::BucketNotFound`] if `bucket` does not exist.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// Fetches the current metadata of an object.
    async fn stat(&self, location: &ObjectLocation) -> Result<RemoteObject>;

    /// Performs one step of a server-side copy from `source` to `target`.
    async fn rewrite(
        &self,
        source: &ObjectLocation,
        target: &ObjectLocation,
        token: Option<String>,
    ) -> Result<RewriteProgress>;

    async fn delete(&self, location: &ObjectLocation) -> Result<()>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        (**self).ensure_bucket(bucket).await
    }

    async fn stat(&self, location: &ObjectLocation) -> Result<RemoteObject> {
        (**self).stat(location).await
    }

    async fn rewrite(
        &self,
        source: &ObjectLocation,
        target: &ObjectLocation,
        token: Option<String>,
    ) -> Result<RewriteProgress> {
        (**self).rewrite(source, target, token).await
    }

    async fn delete(&self, location: &ObjectLocation) -> Result<()> {
        (**self).delete(location).await
    }
}
