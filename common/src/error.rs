use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("bucket '{0}' not found")]
    BucketNotFound(String),

    #[error("object {0} not found")]
    ObjectNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("storage API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("failed to decode storage response: {0}")]
    Decode(String),

    /// Content identifying fields differ between source and target.
    #[error("content changed while transferring to {target}: {fields}")]
    ContentChanged { target: String, fields: String },

    #[error("source and target are the same object: {0}")]
    SameLocation(String),

    #[error("path rule strips every component of {0}")]
    EmptyTargetPath(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransferError {
    /// Whether a bucket or object was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BucketNotFound(_) | Self::ObjectNotFound(_))
    }
}
