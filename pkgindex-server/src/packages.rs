//! Per-package routes: file downloads, search documents and release
//! visibility.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use pkgindex_core::{visibility, SearchDocument};
use tracing::{debug, info};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::validate_filename;

/// `GET /packages/{package}/{version}/{filename}`
pub async fn download_file(
    State(state): State<AppState>,
    Path((package, version, filename)): Path<(String, String, String)>,
) -> AppResult<Response> {
    validate_filename(&package)?;
    validate_filename(&version)?;
    validate_filename(&filename)?;

    let data = state
        .store
        .read(&package, &version, &filename)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("File not found: {package}/{version}/{filename}"))
        })?;
    debug!(
        package = %package,
        version = %version,
        filename = %filename,
        size = data.len(),
        "Serving file"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response())
}

/// `GET /packages/{package}/document`
pub async fn search_document(
    State(state): State<AppState>,
    Path(package): Path<String>,
) -> AppResult<Json<SearchDocument>> {
    let document = state
        .queries
        .search_document(&package)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unknown package {package}")))?;

    Ok(Json(document))
}

/// `POST /packages/{package}/{version}/hide`
pub async fn hide_release(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Path((package, version)): Path<(String, String)>,
) -> AppResult<Response> {
    visibility::set_release_hidden(&state.pool, &package, &version, &actor, true).await?;
    info!(package = %package, version = %version, "Release hidden");
    Ok((StatusCode::OK, "release hidden").into_response())
}

/// `POST /packages/{package}/{version}/unhide`
pub async fn unhide_release(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Path((package, version)): Path<(String, String)>,
) -> AppResult<Response> {
    visibility::set_release_hidden(&state.pool, &package, &version, &actor, false).await?;
    info!(package = %package, version = %version, "Release unhidden");
    Ok((StatusCode::OK, "release visible").into_response())
}
