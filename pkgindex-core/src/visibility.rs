//! Release visibility. Hidden releases stay downloadable but are left out
//! of default release listings and search.

use sqlx::SqlitePool;
use tracing::info;

use crate::access;
use crate::error::{IndexError, Result};
use crate::model::Actor;
use crate::resolver::{lookup, PackageKey, ReleaseKey};

/// Set the hidden flag of one release. Only owners and maintainers of the
/// package may change it.
pub async fn set_release_hidden(
    pool: &SqlitePool,
    name: &str,
    version: &str,
    actor: &Actor,
    hidden: bool,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let Some(package_id) = lookup(&mut tx, &PackageKey(name)).await? else {
        return Err(IndexError::BadRequest(format!("Unknown package {name}")));
    };
    access::authorize(&mut tx, package_id, name, actor).await?;

    let release_key = ReleaseKey {
        package_id,
        version,
    };
    let Some(release_id) = lookup(&mut tx, &release_key).await? else {
        return Err(IndexError::BadRequest(format!(
            "Unknown release {name} {version}"
        )));
    };

    sqlx::query("UPDATE releases SET hidden = ? WHERE id = ?")
        .bind(hidden)
        .bind(release_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(package = %name, version = %version, hidden, username = %actor.username, "Release visibility changed");
    Ok(())
}
