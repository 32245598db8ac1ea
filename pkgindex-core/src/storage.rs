//! Binary content storage seam.
//!
//! The index only records where uploaded artifacts live. Writing the bytes
//! is delegated to a [`ContentStore`], which hands back a stable relative
//! path that download URLs are built from.

use serde::{Deserialize, Serialize};

/// Location and size of stored upload content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    /// Path relative to the store root, `/`-separated.
    pub path: String,
    pub size: u64,
}

/// Destination for uploaded distribution files.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request handler.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist `data` as `filename` of release `version` of `package`.
    ///
    /// Distinct releases may carry files with the same name, so the
    /// returned path must be unique per `(package, version, filename)`.
    async fn save(
        &self,
        package: &str,
        version: &str,
        filename: &str,
        data: &[u8],
    ) -> anyhow::Result<StoredContent>;

    /// Delete previously saved content. Used to undo a save whose
    /// transaction did not commit.
    async fn remove(&self, path: &str) -> anyhow::Result<()>;
}
