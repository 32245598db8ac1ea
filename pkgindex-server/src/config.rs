//! # Configuration Management
//!
//! Server configuration is a single JSON document with four sections:
//!
//! - [`ServerConfig`]: bind address defaults and the URL scheme used when
//!   building absolute download URLs
//! - [`StorageConfig`]: data directory, database file and package directory
//! - [`LimitsConfig`]: upload size limit
//! - [`SecurityConfig`]: Basic auth realm and the accounts allowed to publish
//!
//! ```rust,no_run
//! # use pkgindex_server::config::Config;
//! // Load from file with fallback to defaults
//! let config = Config::load_or_default("config.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure for the package index server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Default host/IP address to bind to (e.g., "0.0.0.0" or "localhost")
    pub default_host: String,
    pub default_port: u16,
    /// URL scheme ("http" or "https")
    pub scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory holding the database and uploaded files
    pub data_dir: PathBuf,
    /// Database file name, relative to `data_dir`
    pub database_file: PathBuf,
    /// Upload directory name, relative to `data_dir`
    pub packages_dir: PathBuf,
}

/// Upload and request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_size_mb: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            max_upload_size_mb: 100,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Realm advertised in the Basic auth challenge
    pub realm: String,
    pub users: Vec<UserAccount>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            realm: "pypi".to_string(),
            users: Vec::new(),
        }
    }
}

/// An account allowed to publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    /// Hex SHA-256 of the password, as printed by `pkgindex hash-password`
    pub password_sha256: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not match the expected
    /// configuration format.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Load configuration from file, or the built-in defaults when the file
    /// doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> usize {
        self.limits.max_upload_size_mb * 1024 * 1024
    }

    /// Database path inside `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage.database_file)
    }

    /// Upload directory inside `data_dir`.
    pub fn packages_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage.packages_dir)
    }

    pub fn find_user(&self, username: &str) -> Option<&UserAccount> {
        self.security
            .users
            .iter()
            .find(|user| user.username == username)
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str(include_str!("../config.json"))
            .expect("Failed to parse embedded config.json")
    }
}
