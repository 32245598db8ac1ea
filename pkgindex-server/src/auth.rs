//! HTTP Basic authentication for publishing endpoints
//!
//! Credentials are checked against the accounts listed in
//! `security.users`, which store the hex SHA-256 of each password.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pkgindex_core::Actor;
use tracing::{debug, warn};

use crate::{config::Config, error::AppError, sha256_hash, state::AppState};

#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub Actor);

/// Extract `(username, password)` from a Basic Authorization header
fn extract_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Resolve the request's credentials to an actor, or fail with a Basic
/// challenge.
pub fn authenticate(headers: &HeaderMap, config: &Config) -> Result<Actor, AppError> {
    let unauthorized = |message: &str| AppError::Unauthorized {
        realm: config.security.realm.clone(),
        message: message.to_string(),
    };

    let (username, password) = extract_basic_credentials(headers)
        .ok_or_else(|| unauthorized("Missing or invalid Authorization header"))?;

    let account = config.find_user(&username).ok_or_else(|| {
        warn!(username = %username, "Unknown user");
        unauthorized("Invalid username or password")
    })?;

    if !sha256_hash(password.as_bytes()).eq_ignore_ascii_case(&account.password_sha256) {
        warn!(username = %username, "Password mismatch");
        return Err(unauthorized("Invalid username or password"));
    }

    debug!(username = %username, "Authenticated");
    Ok(Actor {
        username: account.username.clone(),
        full_name: account.full_name.clone(),
        email: account.email.clone(),
    })
}

/// Middleware for routes that always require a publisher
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let actor = authenticate(req.headers(), &state.config)?;
    req.extensions_mut().insert(AuthenticatedUser(actor));
    Ok(next.run(req).await)
}
