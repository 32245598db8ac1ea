//! # Query Handlers
//!
//! Read-only lookups answering the query protocol. Absence is never an
//! error here: an unknown package or release yields an empty list or an
//! all-defaults record, matching the permissive legacy API.

use indexmap::IndexMap;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::access;
use crate::error::Result;
use crate::metadata::{MetadataField, PackageInfo};

/// Keys of the `release_data` record, each defaulting to an empty string.
pub const RELEASE_DATA_FIELDS: [&str; 24] = [
    "name",
    "version",
    "stable_version",
    "author",
    "author_email",
    "maintainer",
    "maintainer_email",
    "home_page",
    "license",
    "summary",
    "description",
    "keywords",
    "platform",
    "download_url",
    "classifiers",
    "requires",
    "requires_dist",
    "provides",
    "provides_dist",
    "requires_external",
    "requires_python",
    "obsoletes",
    "obsoletes_dist",
    "project_url",
];

/// One downloadable file of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseUrl {
    pub url: String,
    pub packagetype: String,
    pub filename: String,
    pub size: i64,
    pub md5_digest: String,
    pub downloads: i64,
    pub has_sig: bool,
    pub python_version: String,
    pub comment_text: String,
}

/// A `release_data` value: single-valued fields are plain text, list
/// fields stay lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReleaseDataValue {
    Text(String),
    List(Vec<String>),
}

impl ReleaseDataValue {
    fn empty() -> Self {
        ReleaseDataValue::Text(String::new())
    }
}

/// Fixed-shape release metadata record.
pub type ReleaseData = IndexMap<String, ReleaseDataValue>;

/// Row returned by `search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub version: String,
    pub summary: String,
}

/// How multiple search criteria combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchOperator {
    #[default]
    Or,
    And,
}

impl SearchOperator {
    /// Parse the protocol's operator argument. Anything other than `and`
    /// falls back to `or`.
    pub fn parse(operator: &str) -> Self {
        if operator.eq_ignore_ascii_case("and") {
            SearchOperator::And
        } else {
            SearchOperator::Or
        }
    }
}

/// Criteria understood by `search`. Each list matches when any of its terms
/// is a case-insensitive substring of the target; empty lists are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSpec {
    pub names: Vec<String>,
    pub summaries: Vec<String>,
    pub operator: SearchOperator,
}

impl SearchSpec {
    fn matches(&self, name: &str, summary: &str) -> bool {
        let mut criteria = Vec::with_capacity(2);
        if !self.names.is_empty() {
            criteria.push(contains_any(name, &self.names));
        }
        if !self.summaries.is_empty() {
            criteria.push(contains_any(summary, &self.summaries));
        }

        match self.operator {
            _ if criteria.is_empty() => false,
            SearchOperator::Or => criteria.iter().any(|hit| *hit),
            SearchOperator::And => criteria.iter().all(|hit| *hit),
        }
    }
}

fn contains_any(haystack: &str, terms: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    terms
        .iter()
        .any(|term| haystack.contains(&term.to_lowercase()))
}

/// Text a search indexer needs to build a document for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchDocument {
    pub name: String,
    pub authors: Vec<String>,
    pub classifiers: Vec<String>,
    pub summary: String,
    pub description: String,
}

#[derive(sqlx::FromRow)]
struct DistributionRow {
    filename: String,
    content_path: String,
    size: i64,
    md5_digest: String,
    signature: String,
    comment: String,
    filetype: String,
    py_major: Option<i64>,
    py_minor: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct ReleaseRow {
    name: String,
    version: String,
    package_info: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    full_name: String,
    email: String,
}

#[derive(Clone)]
pub struct QueryService {
    pool: SqlitePool,
}

impl QueryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All package names, sorted.
    pub async fn list_packages(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM packages ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        Ok(names)
    }

    /// Version strings of a package in creation order. Hidden releases are
    /// only included when `show_hidden` is set.
    ///
    /// `show_hidden = true` widens the listing to every release; it does not
    /// narrow it to the hidden ones, which is how the legacy index filtered.
    pub async fn package_releases(&self, name: &str, show_hidden: bool) -> Result<Vec<String>> {
        let versions = sqlx::query_scalar(
            r#"
            SELECT r.version
            FROM releases r
            JOIN packages p ON p.id = r.package_id
            WHERE p.name = ? AND (? OR r.hidden = 0)
            ORDER BY r.id
            "#,
        )
        .bind(name)
        .bind(show_hidden)
        .fetch_all(&self.pool)
        .await?;

        Ok(versions)
    }

    /// Download records for every file of a release. `download_base` is the
    /// absolute URL that stored content paths are relative to.
    pub async fn release_urls(
        &self,
        name: &str,
        version: &str,
        download_base: &str,
    ) -> Result<Vec<ReleaseUrl>> {
        let rows = sqlx::query_as::<_, DistributionRow>(
            r#"
            SELECT d.filename, d.content_path, d.size, d.md5_digest, d.signature, d.comment,
                   t.key AS filetype, v.major AS py_major, v.minor AS py_minor
            FROM distributions d
            JOIN releases r ON r.id = d.release_id
            JOIN packages p ON p.id = r.package_id
            JOIN distribution_types t ON t.id = d.filetype_id
            LEFT JOIN python_versions v ON v.id = d.pyversion_id
            WHERE p.name = ? AND r.version = ?
            ORDER BY d.id
            "#,
        )
        .bind(name)
        .bind(version)
        .fetch_all(&self.pool)
        .await?;

        let base = download_base.trim_end_matches('/');
        let urls = rows
            .into_iter()
            .map(|row| ReleaseUrl {
                url: format!("{base}/{}", row.content_path),
                packagetype: row.filetype,
                filename: row.filename,
                size: row.size,
                md5_digest: row.md5_digest,
                downloads: 0,
                has_sig: !row.signature.is_empty(),
                python_version: match (row.py_major, row.py_minor) {
                    (Some(major), Some(minor)) => format!("{major}.{minor}"),
                    _ => String::new(),
                },
                comment_text: row.comment,
            })
            .collect();

        Ok(urls)
    }

    /// Metadata record of a release. Unknown releases produce the record
    /// with every field empty.
    pub async fn release_data(&self, name: &str, version: &str) -> Result<ReleaseData> {
        let mut output: ReleaseData = RELEASE_DATA_FIELDS
            .iter()
            .map(|key| (key.to_string(), ReleaseDataValue::empty()))
            .collect();

        let stored: Option<String> = sqlx::query_scalar(
            r#"
            SELECT r.package_info
            FROM releases r
            JOIN packages p ON p.id = r.package_id
            WHERE p.name = ? AND r.version = ?
            "#,
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        let Some(stored) = stored else {
            debug!(package = %name, version = %version, "release_data for unknown release");
            return Ok(output);
        };

        let info: PackageInfo = serde_json::from_str(&stored)?;
        for (field, values) in info.iter() {
            output.insert(release_data_key(field).to_string(), release_data_value(field, values));
        }
        output.insert("name".to_string(), ReleaseDataValue::Text(name.to_string()));
        output.insert(
            "version".to_string(),
            ReleaseDataValue::Text(version.to_string()),
        );

        Ok(output)
    }

    /// Visible releases whose package name or summary match `spec`, in
    /// package name then creation order.
    pub async fn search(&self, spec: &SearchSpec) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query_as::<_, ReleaseRow>(
            r#"
            SELECT p.name, r.version, r.package_info
            FROM releases r
            JOIN packages p ON p.id = r.package_id
            WHERE r.hidden = 0
            ORDER BY p.name, r.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::new();
        for row in rows {
            let info: PackageInfo = serde_json::from_str(&row.package_info)?;
            let summary = info
                .get_last(MetadataField::Summary)
                .unwrap_or_default()
                .to_string();

            if spec.matches(&row.name, &summary) {
                hits.push(SearchHit {
                    name: row.name,
                    version: row.version,
                    summary,
                });
            }
        }

        debug!(hits = hits.len(), "Search completed");
        Ok(hits)
    }

    /// Indexable text for a package, drawn from its owners, maintainers and
    /// latest release. `None` when the package does not exist.
    pub async fn search_document(&self, name: &str) -> Result<Option<SearchDocument>> {
        let mut conn = self.pool.acquire().await?;

        let package_id: Option<i64> = sqlx::query_scalar("SELECT id FROM packages WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(package_id) = package_id else {
            return Ok(None);
        };

        let mut document = SearchDocument {
            name: name.to_string(),
            ..Default::default()
        };

        let mut usernames = access::owners(&mut conn, package_id).await?;
        usernames.extend(access::maintainers(&mut conn, package_id).await?);
        for username in usernames {
            let user = sqlx::query_as::<_, UserRow>(
                "SELECT full_name, email FROM users WHERE username = ?",
            )
            .bind(&username)
            .fetch_optional(&mut *conn)
            .await?;

            let Some(user) = user else { continue };
            if user.full_name.is_empty() {
                document.authors.push(username);
            } else {
                document.authors.push(user.full_name);
            }
            if !user.email.is_empty() {
                document.authors.push(user.email);
            }
        }

        let latest: Option<String> = sqlx::query_scalar(
            "SELECT package_info FROM releases WHERE package_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(package_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(latest) = latest {
            let info: PackageInfo = serde_json::from_str(&latest)?;
            for field in [
                MetadataField::Author,
                MetadataField::AuthorEmail,
                MetadataField::Maintainer,
                MetadataField::MaintainerEmail,
            ] {
                if let Some(value) = info.get_last(field).filter(|value| !value.is_empty()) {
                    document.authors.push(value.to_string());
                }
            }
            document.classifiers = info.get(MetadataField::Classifier).to_vec();
            document.summary = info
                .get_last(MetadataField::Summary)
                .unwrap_or_default()
                .to_string();
            document.description = info
                .get_last(MetadataField::Description)
                .unwrap_or_default()
                .to_string();
        }

        Ok(Some(document))
    }
}

/// The canonical `classifier` field is published under its legacy plural.
fn release_data_key(field: MetadataField) -> &'static str {
    match field {
        MetadataField::Classifier => "classifiers",
        other => other.key(),
    }
}

fn release_data_value(field: MetadataField, values: &[String]) -> ReleaseDataValue {
    if field.is_multi_valued() {
        ReleaseDataValue::List(values.to_vec())
    } else {
        ReleaseDataValue::Text(values.last().cloned().unwrap_or_default())
    }
}
