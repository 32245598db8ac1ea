//! # Registration and Upload Pipeline
//!
//! One distutils `submit` or `file_upload` request is processed as a strict
//! sequence of states, each gating the next:
//!
//! ```text
//! RequestShapeCheck -> PackageResolution -> AuthorizationCheck
//!     -> ReleaseResolution -> MetadataApplication -> UploadHandling
//! ```
//!
//! All states run inside a single database transaction. The transaction is
//! committed only when every state succeeded; any failure rolls back every
//! row written by the request, including a package or release the request
//! itself created. Content written to the [`ContentStore`] before a failure
//! is removed again.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};

use crate::access;
use crate::error::{IndexError, Result};
use crate::metadata;
use crate::model::{Actor, FormFields, UploadedFile};
use crate::resolver::{
    resolve_or_create, DistributionTypeKey, PackageKey, PlatformKey, PythonVersionKey, ReleaseKey,
};
use crate::storage::{ContentStore, StoredContent};

/// One inbound registration or upload, already decoded by the transport.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// HTTP method the request arrived with.
    pub method: String,
    /// Whether the body was `application/x-www-form-urlencoded` or
    /// `multipart/form-data`.
    pub form_encoded: bool,
    pub actor: Actor,
    pub fields: FormFields,
    /// The `content` file part, when one was sent.
    pub content: Option<UploadedFile>,
}

impl UploadRequest {
    /// A form-encoded POST from `actor`.
    pub fn form_post(actor: Actor, fields: FormFields, content: Option<UploadedFile>) -> Self {
        Self {
            method: "POST".to_string(),
            form_encoded: true,
            actor,
            fields,
            content,
        }
    }
}

/// Successful end states of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Metadata-only registration.
    ReleaseRegistered,
    /// A new distribution file was stored.
    UploadAccepted,
}

impl UploadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadOutcome::ReleaseRegistered => "release registered",
            UploadOutcome::UploadAccepted => "upload accepted",
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct PackageRef {
    id: i64,
    name: String,
}

#[derive(Debug, Clone)]
struct ReleaseRef {
    id: i64,
    version: String,
}

#[derive(Clone)]
pub struct UploadPipeline {
    pool: SqlitePool,
    store: Arc<dyn ContentStore>,
}

impl UploadPipeline {
    pub fn new(pool: SqlitePool, store: Arc<dyn ContentStore>) -> Self {
        Self { pool, store }
    }

    /// Run the whole pipeline for one request under one transaction.
    ///
    /// `BadRequest` and `Forbidden` errors are meant to be shown to the
    /// caller; any other error is fatal for the request. Either way nothing
    /// the request wrote survives.
    pub async fn register_or_upload(&self, request: &UploadRequest) -> Result<UploadOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut stored = None;

        match self.run_states(&mut tx, request, &mut stored).await {
            Ok(outcome) => {
                if let Err(e) = tx.commit().await {
                    error!(error = %e, "Failed to commit upload transaction");
                    self.discard(stored).await;
                    return Err(e.into());
                }
                info!(
                    username = %request.actor.username,
                    outcome = %outcome,
                    "Upload request committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    error!(error = %e, "Failed to roll back upload transaction");
                }
                self.discard(stored).await;

                if err.is_client_error() {
                    warn!(username = %request.actor.username, error = %err, "Upload request rejected");
                } else {
                    error!(username = %request.actor.username, error = %err, "Upload request failed");
                }
                Err(err)
            }
        }
    }

    async fn run_states(
        &self,
        conn: &mut SqliteConnection,
        request: &UploadRequest,
        stored: &mut Option<StoredContent>,
    ) -> Result<UploadOutcome> {
        check_request_shape(request)?;

        let package = resolve_package(conn, request).await?;
        debug!(package = %package.name, "Package resolved");

        access::authorize(conn, package.id, &package.name, &request.actor).await?;

        let release = resolve_release(conn, &package, &request.fields).await?;
        debug!(package = %package.name, release_id = release.id, "Release resolved");

        apply_metadata(conn, release.id, &request.fields).await?;

        self.handle_upload(conn, &package, &release, request, stored)
            .await
    }

    async fn handle_upload(
        &self,
        conn: &mut SqliteConnection,
        package: &PackageRef,
        release: &ReleaseRef,
        request: &UploadRequest,
        stored: &mut Option<StoredContent>,
    ) -> Result<UploadOutcome> {
        let Some(upload) = &request.content else {
            return Ok(UploadOutcome::ReleaseRegistered);
        };
        let filename = upload.basename();
        let fields = &request.fields;

        detect_duplicate_upload(conn, release.id, filename).await?;

        let filetype = resolve_or_create(
            conn,
            &DistributionTypeKey::from_declared(fields.get("filetype")),
        )
        .await?;

        let pyversion_id = match PythonVersionKey::parse(fields.get("pyversion").unwrap_or(""))? {
            Some(key) => Some(resolve_or_create(conn, &key).await?.id),
            None => None,
        };

        let platform_id = match PlatformKey::from_filename(filename) {
            Some(key) => Some(resolve_or_create(conn, &key).await?.id),
            None => None,
        };

        let content = self
            .store
            .save(&package.name, &release.version, filename, &upload.data)
            .await
            .map_err(IndexError::Storage)?;
        let content_path = content.path.clone();
        let size = content.size as i64;
        *stored = Some(content);

        sqlx::query(
            r#"
            INSERT INTO distributions
                (release_id, filename, content_path, size, filetype_id, pyversion_id,
                 platform_id, uploader, comment, signature, md5_digest, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(release.id)
        .bind(filename)
        .bind(&content_path)
        .bind(size)
        .bind(filetype.id)
        .bind(pyversion_id)
        .bind(platform_id)
        .bind(&request.actor.username)
        .bind(fields.get("comment").unwrap_or(""))
        .bind(fields.get("gpg_signature").unwrap_or(""))
        .bind(fields.get("md5_digest").unwrap_or(""))
        .bind(Utc::now().timestamp())
        .execute(&mut *conn)
        .await?;

        info!(package = %package.name, filename = %filename, size, "Distribution stored");
        Ok(UploadOutcome::UploadAccepted)
    }

    async fn discard(&self, stored: Option<StoredContent>) {
        let Some(content) = stored else {
            return;
        };
        if let Err(e) = self.store.remove(&content.path).await {
            warn!(path = %content.path, error = %e, "Failed to remove content of aborted upload");
        }
    }
}

fn check_request_shape(request: &UploadRequest) -> Result<()> {
    if !request.method.eq_ignore_ascii_case("POST") || !request.form_encoded {
        return Err(IndexError::BadRequest(
            "Only post requests are supported".to_string(),
        ));
    }
    Ok(())
}

async fn resolve_package(conn: &mut SqliteConnection, request: &UploadRequest) -> Result<PackageRef> {
    let name = request.fields.get("name").unwrap_or("").trim();
    if name.is_empty() {
        return Err(IndexError::BadRequest(
            "No package name specified".to_string(),
        ));
    }

    // First write of the transaction; takes the database write lock.
    access::ensure_actor(conn, &request.actor).await?;

    let package = resolve_or_create(conn, &PackageKey(name)).await?;
    if package.created {
        info!(package = %name, username = %request.actor.username, "Registered new package");
        access::grant_creator(conn, package.id, &request.actor).await?;
    }

    Ok(PackageRef {
        id: package.id,
        name: name.to_string(),
    })
}

async fn resolve_release(
    conn: &mut SqliteConnection,
    package: &PackageRef,
    fields: &FormFields,
) -> Result<ReleaseRef> {
    let version = fields.get("version").unwrap_or("").trim();
    if version.is_empty() {
        return Err(IndexError::BadRequest(
            "Release version must be specified".to_string(),
        ));
    }

    let release = resolve_or_create(
        conn,
        &ReleaseKey {
            package_id: package.id,
            version,
        },
    )
    .await?;

    if release.created {
        info!(package = %package.name, version = %version, "Registered new release");
    }
    Ok(ReleaseRef {
        id: release.id,
        version: version.to_string(),
    })
}

async fn apply_metadata(
    conn: &mut SqliteConnection,
    release_id: i64,
    fields: &FormFields,
) -> Result<()> {
    let normalized = metadata::normalize(fields.get("metadata_version"), fields)?;
    let package_info = serde_json::to_string(&normalized.info)?;

    sqlx::query("UPDATE releases SET metadata_version = ?, package_info = ? WHERE id = ?")
        .bind(normalized.version.as_str())
        .bind(&package_info)
        .bind(release_id)
        .execute(&mut *conn)
        .await?;

    debug!(
        release_id,
        metadata_version = %normalized.version,
        fields = normalized.info.len(),
        "Metadata applied"
    );
    Ok(())
}

async fn detect_duplicate_upload(
    conn: &mut SqliteConnection,
    release_id: i64,
    filename: &str,
) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM distributions WHERE release_id = ? AND filename = ?)",
    )
    .bind(release_id)
    .bind(filename)
    .fetch_one(&mut *conn)
    .await?;

    if exists {
        return Err(IndexError::BadRequest(
            "That file has already been uploaded...".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, form_encoded: bool) -> UploadRequest {
        UploadRequest {
            method: method.to_string(),
            form_encoded,
            actor: Actor::new("alice"),
            fields: FormFields::new(),
            content: None,
        }
    }

    #[test]
    fn test_request_shape_requires_form_post() {
        assert!(check_request_shape(&request("POST", true)).is_ok());
        assert!(check_request_shape(&request("post", true)).is_ok());
        assert!(matches!(
            check_request_shape(&request("GET", true)),
            Err(IndexError::BadRequest(_))
        ));
        assert!(matches!(
            check_request_shape(&request("POST", false)),
            Err(IndexError::BadRequest(_))
        ));
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(UploadOutcome::ReleaseRegistered.to_string(), "release registered");
        assert_eq!(UploadOutcome::UploadAccepted.to_string(), "upload accepted");
    }
}
