use thiserror::Error;

use crate::metadata::MetadataError;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Failures raised by the index core.
///
/// `BadRequest` and `Forbidden` are outcomes the caller is expected to
/// recover from by fixing its request; everything else is fatal for the
/// request that produced it.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Content store error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// True for outcomes that are reported back to the caller verbatim.
    pub fn is_client_error(&self) -> bool {
        matches!(self, IndexError::BadRequest(_) | IndexError::Forbidden(_))
    }
}

impl From<MetadataError> for IndexError {
    fn from(err: MetadataError) -> Self {
        IndexError::BadRequest(err.to_string())
    }
}
