//! Shared fixtures for pkgindex-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pkgindex_core::db::{create_memory_pool, run_migrations};
use pkgindex_core::{
    Actor, ContentStore, FormFields, StoredContent, UploadPipeline, UploadRequest, UploadedFile,
};
use sqlx::SqlitePool;

pub async fn test_db() -> SqlitePool {
    let pool = create_memory_pool().await.expect("Failed to create database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

/// Content store keeping files in a map. Like the filesystem store it never
/// overwrites a path; `fail_saves` refuses every save.
#[derive(Default)]
pub struct RecordingStore {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_saves: bool,
}

impl RecordingStore {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait::async_trait]
impl ContentStore for RecordingStore {
    async fn save(
        &self,
        package: &str,
        version: &str,
        filename: &str,
        data: &[u8],
    ) -> anyhow::Result<StoredContent> {
        if self.fail_saves {
            anyhow::bail!("disk full");
        }
        let path = format!("{package}/{version}/{filename}");
        let mut files = self.files.lock().unwrap();
        if files.contains_key(&path) {
            anyhow::bail!("{path} already exists");
        }
        files.insert(path.clone(), data.to_vec());
        Ok(StoredContent {
            path,
            size: data.len() as u64,
        })
    }

    async fn remove(&self, path: &str) -> anyhow::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

pub struct TestIndex {
    pub pool: SqlitePool,
    pub store: Arc<RecordingStore>,
    pub pipeline: UploadPipeline,
}

impl TestIndex {
    pub async fn new() -> Self {
        Self::with_store(RecordingStore::default()).await
    }

    pub async fn with_store(store: RecordingStore) -> Self {
        let pool = test_db().await;
        let store = Arc::new(store);
        let pipeline = UploadPipeline::new(pool.clone(), store.clone());
        Self {
            pool,
            store,
            pipeline,
        }
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

pub fn form(pairs: &[(&str, &str)]) -> FormFields {
    pairs.iter().copied().collect()
}

/// Minimal `submit` form for `name` `version`.
pub fn submit(name: &str, version: &str) -> FormFields {
    form(&[
        (":action", "submit"),
        ("metadata_version", "1.0"),
        ("name", name),
        ("version", version),
        ("summary", "A test package"),
    ])
}

pub fn register(user: &str, fields: FormFields) -> UploadRequest {
    UploadRequest::form_post(Actor::new(user), fields, None)
}

pub fn upload(user: &str, fields: FormFields, filename: &str, data: &[u8]) -> UploadRequest {
    UploadRequest::form_post(
        Actor::new(user),
        fields,
        Some(UploadedFile::new(filename, data)),
    )
}
