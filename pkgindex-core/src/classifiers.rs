//! Trove classifier catalogue served by `list_classifiers`.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// Every known classifier, sorted by name.
pub async fn list_classifiers(pool: &SqlitePool) -> Result<Vec<String>> {
    let names = sqlx::query_scalar("SELECT name FROM classifiers ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(names)
}

/// Add classifiers to the catalogue, skipping names already present.
/// Returns how many were added.
pub async fn import_classifiers<I, S>(pool: &SqlitePool, names: I) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tx = pool.begin().await?;
    let mut added = 0;

    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        let result = sqlx::query("INSERT INTO classifiers (name) VALUES (?) ON CONFLICT DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        added += result.rows_affected() as usize;
    }

    tx.commit().await?;

    info!(added, "Imported classifiers");
    Ok(added)
}

/// Classifier names from a text listing: one per line, blank lines and
/// `#` comments ignored.
pub fn parse_listing(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
