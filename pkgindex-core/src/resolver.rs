//! # Entity Resolution
//!
//! Packages, releases and the small lookup tables (distribution types,
//! Python versions, platform names) are all created lazily on first
//! reference. Each kind has a natural key backed by a unique constraint, and
//! [`resolve_or_create`] is the single get-or-create routine for all of them:
//! it attempts an `INSERT ... ON CONFLICT DO NOTHING RETURNING id` and falls
//! back to a `SELECT` when the row already exists. Concurrent first use of
//! the same key therefore still yields exactly one row.

use std::sync::OnceLock;

use regex::Regex;
use sqlx::query::QueryScalar;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqliteConnection};
use tracing::debug;

use crate::error::{IndexError, Result};

/// Filetype recorded when an upload does not declare one.
pub const DEFAULT_FILETYPE: &str = "sdist";

/// Row located or created by [`resolve_or_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: i64,
    pub created: bool,
}

/// A natural key for one entity kind.
pub trait NaturalKey: Send + Sync {
    /// Kind name used in logs.
    const KIND: &'static str;
    /// Insert that yields the new id, or no row when the key exists.
    const INSERT_SQL: &'static str;
    /// Lookup of the id by key.
    const SELECT_SQL: &'static str;

    /// Bind the key columns, in the order both statements expect them.
    fn bind<'q, O>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>;
}

/// Fetch the row for `key`, creating it if absent.
pub async fn resolve_or_create<K: NaturalKey>(
    conn: &mut SqliteConnection,
    key: &K,
) -> Result<Resolved> {
    let inserted: Option<i64> = key
        .bind(sqlx::query_scalar(K::INSERT_SQL))
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(id) = inserted {
        debug!(kind = K::KIND, id, "Created entity");
        return Ok(Resolved { id, created: true });
    }

    let id: i64 = key
        .bind(sqlx::query_scalar(K::SELECT_SQL))
        .fetch_one(&mut *conn)
        .await?;

    Ok(Resolved { id, created: false })
}

/// Fetch the id for `key` without creating anything.
pub async fn lookup<K: NaturalKey>(conn: &mut SqliteConnection, key: &K) -> Result<Option<i64>> {
    let id = key
        .bind(sqlx::query_scalar(K::SELECT_SQL))
        .fetch_optional(&mut *conn)
        .await?;

    Ok(id)
}

/// Package, keyed by exact (case-sensitive) name.
#[derive(Debug, Clone, Copy)]
pub struct PackageKey<'a>(pub &'a str);

impl NaturalKey for PackageKey<'_> {
    const KIND: &'static str = "package";
    const INSERT_SQL: &'static str =
        "INSERT INTO packages (name) VALUES (?) ON CONFLICT (name) DO NOTHING RETURNING id";
    const SELECT_SQL: &'static str = "SELECT id FROM packages WHERE name = ?";

    fn bind<'q, O>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        query.bind(self.0)
    }
}

/// Release, keyed by its package and version string.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseKey<'a> {
    pub package_id: i64,
    pub version: &'a str,
}

impl NaturalKey for ReleaseKey<'_> {
    const KIND: &'static str = "release";
    const INSERT_SQL: &'static str = "INSERT INTO releases (package_id, version) VALUES (?, ?) \
         ON CONFLICT (package_id, version) DO NOTHING RETURNING id";
    const SELECT_SQL: &'static str =
        "SELECT id FROM releases WHERE package_id = ? AND version = ?";

    fn bind<'q, O>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        query.bind(self.package_id).bind(self.version)
    }
}

/// Distribution type such as `sdist` or `bdist_wheel`.
#[derive(Debug, Clone, Copy)]
pub struct DistributionTypeKey<'a>(pub &'a str);

impl<'a> DistributionTypeKey<'a> {
    /// Declared filetype, or [`DEFAULT_FILETYPE`] when none was sent.
    pub fn from_declared(filetype: Option<&'a str>) -> Self {
        match filetype.map(str::trim) {
            Some(filetype) if !filetype.is_empty() => Self(filetype),
            _ => Self(DEFAULT_FILETYPE),
        }
    }
}

impl NaturalKey for DistributionTypeKey<'_> {
    const KIND: &'static str = "distribution_type";
    const INSERT_SQL: &'static str =
        "INSERT INTO distribution_types (key) VALUES (?) ON CONFLICT (key) DO NOTHING RETURNING id";
    const SELECT_SQL: &'static str = "SELECT id FROM distribution_types WHERE key = ?";

    fn bind<'q, O>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        query.bind(self.0)
    }
}

/// Python version as a `(major, minor)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PythonVersionKey {
    pub major: i64,
    pub minor: i64,
}

impl PythonVersionKey {
    /// Parse a `"major.minor"` string. An empty string means the upload
    /// declared no Python version.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        if text.is_empty() {
            return Ok(None);
        }

        let invalid = || IndexError::BadRequest(format!("Invalid Python version number '{text}'"));

        let mut parts = text.split('.');
        let (Some(major), Some(minor), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        let major = major.trim().parse().map_err(|_| invalid())?;
        let minor = minor.trim().parse().map_err(|_| invalid())?;

        Ok(Some(Self { major, minor }))
    }
}

impl NaturalKey for PythonVersionKey {
    const KIND: &'static str = "python_version";
    const INSERT_SQL: &'static str = "INSERT INTO python_versions (major, minor) VALUES (?, ?) \
         ON CONFLICT (major, minor) DO NOTHING RETURNING id";
    const SELECT_SQL: &'static str =
        "SELECT id FROM python_versions WHERE major = ? AND minor = ?";

    fn bind<'q, O>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        query.bind(self.major).bind(self.minor)
    }
}

/// Platform name deduced from an uploaded filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformKey(pub String);

impl PlatformKey {
    /// Deduce the platform from a filename shaped like
    /// `<name>-<version>-py<major.minor>-<platform>.<ext>`.
    ///
    /// Only the last extension is stripped before matching. Filenames that
    /// do not follow the pattern carry no platform.
    pub fn from_filename(filename: &str) -> Option<Self> {
        static PLATFORM_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = PLATFORM_REGEX.get_or_init(|| {
            Regex::new(
                r"^(?P<package_name>[\w.]+)-(?P<version>[\w.]+)-py(?P<python_version>\d+\.\d+)-(?P<platform_key>[\w.-]+)$",
            )
            .unwrap_or_else(|e| {
                panic!("Failed to compile platform filename regex: {}. This is a bug in the code - the regex pattern should be valid.", e)
            })
        });

        let stem = strip_extension(filename);
        re.captures(stem)
            .and_then(|caps| caps.name("platform_key"))
            .map(|platform| Self(platform.as_str().to_string()))
    }
}

impl NaturalKey for PlatformKey {
    const KIND: &'static str = "platform_name";
    const INSERT_SQL: &'static str =
        "INSERT INTO platform_names (key) VALUES (?) ON CONFLICT (key) DO NOTHING RETURNING id";
    const SELECT_SQL: &'static str = "SELECT id FROM platform_names WHERE key = ?";

    fn bind<'q, O>(
        &'q self,
        query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        query.bind(self.0.as_str())
    }
}

/// Drop the final extension. A leading dot is part of the name, not an
/// extension.
fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos > 0 && !filename[..pos].ends_with(['/', '\\']) => &filename[..pos],
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_db;

    #[test]
    fn test_python_version_parsing() {
        assert_eq!(PythonVersionKey::parse("").unwrap(), None);
        assert_eq!(
            PythonVersionKey::parse("2.7").unwrap(),
            Some(PythonVersionKey { major: 2, minor: 7 })
        );
        assert_eq!(
            PythonVersionKey::parse("3.12").unwrap(),
            Some(PythonVersionKey {
                major: 3,
                minor: 12
            })
        );

        for bad in ["3.x", "3", "3.7.1", "source", "any", ".7", "3."] {
            let err = PythonVersionKey::parse(bad).unwrap_err();
            assert!(
                matches!(err, IndexError::BadRequest(ref msg) if msg.contains(bad)),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn test_platform_from_filename() {
        assert_eq!(
            PlatformKey::from_filename("foo-1.0-py2.7-linux_x86_64.whl"),
            Some(PlatformKey("linux_x86_64".to_string()))
        );
        assert_eq!(
            PlatformKey::from_filename("foo-1.0-py2.7-macosx-10.9-x86_64.egg"),
            Some(PlatformKey("macosx-10.9-x86_64".to_string()))
        );
        assert_eq!(PlatformKey::from_filename("foo-1.0.tar.gz"), None);
        assert_eq!(PlatformKey::from_filename("foo-1.0-py3-none-any.whl"), None);
        assert_eq!(PlatformKey::from_filename("foo-1.0-py2.7.egg"), None);
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("foo-1.0.tar.gz"), "foo-1.0.tar");
        assert_eq!(strip_extension("foo"), "foo");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn test_filetype_defaults_to_sdist() {
        assert_eq!(DistributionTypeKey::from_declared(None).0, "sdist");
        assert_eq!(DistributionTypeKey::from_declared(Some(" ")).0, "sdist");
        assert_eq!(
            DistributionTypeKey::from_declared(Some("bdist_wheel")).0,
            "bdist_wheel"
        );
    }

    #[tokio::test]
    async fn test_resolve_or_create_is_idempotent() {
        let pool = create_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = resolve_or_create(&mut conn, &DistributionTypeKey("sdist"))
            .await
            .unwrap();
        let second = resolve_or_create(&mut conn, &DistributionTypeKey("sdist"))
            .await
            .unwrap();
        let other = resolve_or_create(&mut conn, &DistributionTypeKey("bdist_egg"))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM distribution_types")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_composite_keys_resolve_independently() {
        let pool = create_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let py27 = PythonVersionKey { major: 2, minor: 7 };
        let py35 = PythonVersionKey { major: 3, minor: 5 };

        let a = resolve_or_create(&mut conn, &py27).await.unwrap();
        let b = resolve_or_create(&mut conn, &py35).await.unwrap();
        let c = resolve_or_create(&mut conn, &py27).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.id, c.id);
        assert_eq!(lookup(&mut conn, &py35).await.unwrap(), Some(b.id));
        assert_eq!(
            lookup(&mut conn, &PythonVersionKey { major: 4, minor: 0 })
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_release_key_is_scoped_to_package() {
        let pool = create_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let foo = resolve_or_create(&mut conn, &PackageKey("foo")).await.unwrap();
        let bar = resolve_or_create(&mut conn, &PackageKey("bar")).await.unwrap();

        let foo_1 = resolve_or_create(
            &mut conn,
            &ReleaseKey {
                package_id: foo.id,
                version: "1.0",
            },
        )
        .await
        .unwrap();
        let bar_1 = resolve_or_create(
            &mut conn,
            &ReleaseKey {
                package_id: bar.id,
                version: "1.0",
            },
        )
        .await
        .unwrap();

        assert!(foo_1.created && bar_1.created);
        assert_ne!(foo_1.id, bar_1.id);
    }
}
