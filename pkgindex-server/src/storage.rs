//! Filesystem content store.
//!
//! Uploads land at `<root>/<package>/<version>/<filename>`; the recorded
//! content path is the `<package>/<version>/<filename>` part, which is also
//! the download route.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use pkgindex_core::{ContentStore, StoredContent};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::validate_filename;

pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored file. Every segment must be a plain
    /// file name.
    pub fn path_for(&self, package: &str, version: &str, filename: &str) -> anyhow::Result<PathBuf> {
        validate_filename(package).context("invalid package directory")?;
        validate_filename(version).context("invalid version directory")?;
        validate_filename(filename).context("invalid filename")?;
        Ok(self.root.join(package).join(version).join(filename))
    }

    /// Read a stored file, `None` when it does not exist.
    pub async fn read(
        &self,
        package: &str,
        version: &str,
        filename: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(package, version, filename)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[async_trait::async_trait]
impl ContentStore for FsContentStore {
    async fn save(
        &self,
        package: &str,
        version: &str,
        filename: &str,
        data: &[u8],
    ) -> anyhow::Result<StoredContent> {
        let path = self.path_for(package, version, filename)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Created package directory");
        }

        // Never clobber content a committed distribution references.
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                bail!("{} already exists in the content store", path.display())
            }
            Err(e) => return Err(e).with_context(|| format!("creating {}", path.display())),
        };
        file.write_all(data).await?;
        file.flush().await?;

        info!(path = %path.display(), size = data.len(), "File saved successfully");
        Ok(StoredContent {
            path: format!("{package}/{version}/{filename}"),
            size: data.len() as u64,
        })
    }

    async fn remove(&self, path: &str) -> anyhow::Result<()> {
        let mut segments = path.splitn(3, '/');
        let (Some(package), Some(version), Some(filename)) =
            (segments.next(), segments.next(), segments.next())
        else {
            bail!("malformed content path '{path}'");
        };
        let full = self.path_for(package, version, filename)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                info!(path = %full.display(), "Removed stored file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", full.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_read_remove() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::new(dir.path());

        let stored = store.save("foo", "1.0", "foo-1.0.tar.gz", b"tarball").await.unwrap();

        assert_eq!(stored.path, "foo/1.0/foo-1.0.tar.gz");
        assert_eq!(stored.size, 7);
        assert!(dir.path().join("foo/1.0/foo-1.0.tar.gz").exists());
        assert_eq!(
            store.read("foo", "1.0", "foo-1.0.tar.gz").await.unwrap(),
            Some(b"tarball".to_vec())
        );

        store.remove(&stored.path).await.unwrap();
        assert_eq!(store.read("foo", "1.0", "foo-1.0.tar.gz").await.unwrap(), None);
        // Removing twice is fine.
        store.remove(&stored.path).await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::new(dir.path());

        store.save("foo", "1.0", "foo.zip", b"first").await.unwrap();
        assert!(store.save("foo", "1.0", "foo.zip", b"second").await.is_err());
        assert_eq!(
            store.read("foo", "1.0", "foo.zip").await.unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[tokio::test]
    async fn test_same_filename_in_two_versions() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::new(dir.path());

        let first = store.save("foo", "1.0", "foo.zip", b"one").await.unwrap();
        let second = store.save("foo", "2.0", "foo.zip", b"two").await.unwrap();

        assert_ne!(first.path, second.path);
        assert_eq!(
            store.read("foo", "1.0", "foo.zip").await.unwrap(),
            Some(b"one".to_vec())
        );
        assert_eq!(
            store.read("foo", "2.0", "foo.zip").await.unwrap(),
            Some(b"two".to_vec())
        );
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsContentStore::new(dir.path());

        assert!(store.save("..", "1.0", "passwd", b"x").await.is_err());
        assert!(store.save("foo", "..", "passwd", b"x").await.is_err());
        assert!(store.read("foo", "1.0", "../../etc/passwd").await.is_err());
        assert!(store.remove("foo/passwd").await.is_err());
    }
}
