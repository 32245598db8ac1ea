//! Owner/maintainer bookkeeping and the single authorization rule the index
//! enforces: only an owner or maintainer of a package may write to it.

use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::model::Actor;

/// Record the actor's identity, refreshing its display details.
pub async fn ensure_actor(conn: &mut SqliteConnection, actor: &Actor) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (username, full_name, email)
        VALUES (?, ?, ?)
        ON CONFLICT (username) DO UPDATE
            SET full_name = excluded.full_name, email = excluded.email
        "#,
    )
    .bind(&actor.username)
    .bind(&actor.full_name)
    .bind(&actor.email)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Make the actor both owner and maintainer of a freshly created package.
pub async fn grant_creator(
    conn: &mut SqliteConnection,
    package_id: i64,
    actor: &Actor,
) -> Result<()> {
    for table in ["package_owners", "package_maintainers"] {
        sqlx::query(&format!(
            "INSERT INTO {table} (package_id, username) VALUES (?, ?) ON CONFLICT DO NOTHING"
        ))
        .bind(package_id)
        .bind(&actor.username)
        .execute(&mut *conn)
        .await?;
    }

    debug!(package_id, username = %actor.username, "Granted owner and maintainer rights");
    Ok(())
}

/// Fail with `Forbidden` unless the actor owns or maintains the package.
pub async fn authorize(
    conn: &mut SqliteConnection,
    package_id: i64,
    package_name: &str,
    actor: &Actor,
) -> Result<()> {
    let allowed: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM package_owners WHERE package_id = ?1 AND username = ?2
            UNION ALL
            SELECT 1 FROM package_maintainers WHERE package_id = ?1 AND username = ?2
        )
        "#,
    )
    .bind(package_id)
    .bind(&actor.username)
    .fetch_one(&mut *conn)
    .await?;

    if !allowed {
        warn!(package = %package_name, username = %actor.username, "Actor is neither owner nor maintainer");
        return Err(IndexError::Forbidden(format!(
            "You are not an owner/maintainer of {package_name}"
        )));
    }

    Ok(())
}

/// Usernames holding owner rights on the package, sorted.
pub async fn owners(conn: &mut SqliteConnection, package_id: i64) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        "SELECT username FROM package_owners WHERE package_id = ? ORDER BY username",
    )
    .bind(package_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(names)
}

/// Usernames holding maintainer rights on the package, sorted.
pub async fn maintainers(conn: &mut SqliteConnection, package_id: i64) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        "SELECT username FROM package_maintainers WHERE package_id = ? ORDER BY username",
    )
    .bind(package_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(names)
}
