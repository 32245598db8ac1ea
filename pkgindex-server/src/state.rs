//! # Application State Management
//!
//! [`AppState`] is built once at startup and cloned into every handler. All
//! of its members are cheap handles (pool, `Arc`s).

use std::path::PathBuf;
use std::sync::Arc;

use pkgindex_core::{QueryService, UploadPipeline};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::storage::FsContentStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub pipeline: UploadPipeline,
    pub queries: QueryService,
    pub store: Arc<FsContentStore>,
    pub config: Arc<Config>,
    /// Base directory holding the database and uploaded files
    pub data_dir: PathBuf,
}

impl AppState {
    /// Wire the core services onto `pool`, storing uploads under the
    /// configured packages directory of `data_dir`.
    pub fn new(pool: SqlitePool, config: Config, data_dir: PathBuf) -> Self {
        let store = Arc::new(FsContentStore::new(config.packages_path(&data_dir)));
        let pipeline = UploadPipeline::new(pool.clone(), store.clone());
        let queries = QueryService::new(pool.clone());

        Self {
            pool,
            pipeline,
            queries,
            store,
            config: Arc::new(config),
            data_dir,
        }
    }

    /// `<scheme>://<host>` for absolute URLs. `host` is the request's Host
    /// header when present.
    pub fn base_url(&self, host: Option<&str>) -> String {
        let scheme = &self.config.server.scheme;
        match host {
            Some(host) if !host.is_empty() => format!("{scheme}://{host}"),
            _ => format!(
                "{scheme}://{}:{}",
                self.config.server.default_host, self.config.server.default_port
            ),
        }
    }
}
