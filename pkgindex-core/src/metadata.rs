//! # Metadata Normalization
//!
//! Releases store a filtered view of the metadata a publisher posted. Which
//! fields are legal depends on the declared metadata version, so the
//! whitelist for every version is fixed data in this module rather than
//! something computed per request.
//!
//! Normalization runs in four steps:
//!
//! 1. The declared version must be one of [`MetadataVersion`].
//! 2. A `1.0` declaration that carries `classifiers` or `download_url` is
//!    upgraded to `1.1`, since those fields only exist from 1.1 onward and
//!    publishing tools send them regardless.
//! 3. The legacy `classifiers` form field is aliased onto the canonical
//!    `classifier` metadata field.
//! 4. Fields outside the version's whitelist are dropped and every
//!    `"UNKNOWN"` placeholder value is removed.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::FormFields;

/// Placeholder distutils writes for metadata the author left unset.
pub const UNKNOWN_VALUE: &str = "UNKNOWN";

/// Legacy form name of the classifier list.
const LEGACY_CLASSIFIERS_FIELD: &str = "classifiers";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Metadata version must be present and one of: {}", MetadataVersion::supported_list())]
    InvalidMetadataVersion,
}

/// Recognized metadata schema versions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "2.0")]
    V2_0,
}

impl MetadataVersion {
    pub const ALL: [MetadataVersion; 4] = [
        MetadataVersion::V1_0,
        MetadataVersion::V1_1,
        MetadataVersion::V1_2,
        MetadataVersion::V2_0,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataVersion::V1_0 => "1.0",
            MetadataVersion::V1_1 => "1.1",
            MetadataVersion::V1_2 => "1.2",
            MetadataVersion::V2_0 => "2.0",
        }
    }

    /// Fields a release may carry under this version.
    pub fn fields(&self) -> &'static [MetadataField] {
        use MetadataField::*;

        match self {
            MetadataVersion::V1_0 => &[
                Platform,
                Summary,
                Description,
                Keywords,
                HomePage,
                Author,
                AuthorEmail,
                License,
            ],
            MetadataVersion::V1_1 => &[
                Platform,
                SupportedPlatform,
                Summary,
                Description,
                Keywords,
                HomePage,
                DownloadUrl,
                Author,
                AuthorEmail,
                License,
                Classifier,
                Requires,
                Provides,
                Obsoletes,
            ],
            MetadataVersion::V1_2 => &[
                Platform,
                SupportedPlatform,
                Summary,
                Description,
                Keywords,
                HomePage,
                DownloadUrl,
                Author,
                AuthorEmail,
                Maintainer,
                MaintainerEmail,
                License,
                Classifier,
                RequiresDist,
                ProvidesDist,
                ObsoletesDist,
                RequiresPython,
                RequiresExternal,
                ProjectUrl,
            ],
            MetadataVersion::V2_0 => &[
                Platform,
                SupportedPlatform,
                Summary,
                Description,
                DescriptionContentType,
                Keywords,
                HomePage,
                DownloadUrl,
                Author,
                AuthorEmail,
                Maintainer,
                MaintainerEmail,
                License,
                Classifier,
                RequiresDist,
                ProvidesDist,
                ObsoletesDist,
                RequiresPython,
                RequiresExternal,
                ProjectUrl,
                ProvidesExtra,
            ],
        }
    }

    pub fn allows(&self, field: MetadataField) -> bool {
        self.fields().contains(&field)
    }

    fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(MetadataVersion::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataVersion {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|version| version.as_str() == s)
            .ok_or(MetadataError::InvalidMetadataVersion)
    }
}

/// Every metadata field known to any supported version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Platform,
    SupportedPlatform,
    Summary,
    Description,
    DescriptionContentType,
    Keywords,
    HomePage,
    DownloadUrl,
    Author,
    AuthorEmail,
    Maintainer,
    MaintainerEmail,
    License,
    Classifier,
    Requires,
    Provides,
    Obsoletes,
    RequiresDist,
    ProvidesDist,
    ObsoletesDist,
    RequiresPython,
    RequiresExternal,
    ProjectUrl,
    ProvidesExtra,
}

impl MetadataField {
    const ALL: [MetadataField; 24] = [
        MetadataField::Platform,
        MetadataField::SupportedPlatform,
        MetadataField::Summary,
        MetadataField::Description,
        MetadataField::DescriptionContentType,
        MetadataField::Keywords,
        MetadataField::HomePage,
        MetadataField::DownloadUrl,
        MetadataField::Author,
        MetadataField::AuthorEmail,
        MetadataField::Maintainer,
        MetadataField::MaintainerEmail,
        MetadataField::License,
        MetadataField::Classifier,
        MetadataField::Requires,
        MetadataField::Provides,
        MetadataField::Obsoletes,
        MetadataField::RequiresDist,
        MetadataField::ProvidesDist,
        MetadataField::ObsoletesDist,
        MetadataField::RequiresPython,
        MetadataField::RequiresExternal,
        MetadataField::ProjectUrl,
        MetadataField::ProvidesExtra,
    ];

    /// Form and storage key of the field.
    pub fn key(&self) -> &'static str {
        match self {
            MetadataField::Platform => "platform",
            MetadataField::SupportedPlatform => "supported_platform",
            MetadataField::Summary => "summary",
            MetadataField::Description => "description",
            MetadataField::DescriptionContentType => "description_content_type",
            MetadataField::Keywords => "keywords",
            MetadataField::HomePage => "home_page",
            MetadataField::DownloadUrl => "download_url",
            MetadataField::Author => "author",
            MetadataField::AuthorEmail => "author_email",
            MetadataField::Maintainer => "maintainer",
            MetadataField::MaintainerEmail => "maintainer_email",
            MetadataField::License => "license",
            MetadataField::Classifier => "classifier",
            MetadataField::Requires => "requires",
            MetadataField::Provides => "provides",
            MetadataField::Obsoletes => "obsoletes",
            MetadataField::RequiresDist => "requires_dist",
            MetadataField::ProvidesDist => "provides_dist",
            MetadataField::ObsoletesDist => "obsoletes_dist",
            MetadataField::RequiresPython => "requires_python",
            MetadataField::RequiresExternal => "requires_external",
            MetadataField::ProjectUrl => "project_url",
            MetadataField::ProvidesExtra => "provides_extra",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Whether the field is a list in its own right rather than a single
    /// value that happens to be stored as a one-element list.
    pub fn is_multi_valued(&self) -> bool {
        matches!(
            self,
            MetadataField::Platform
                | MetadataField::SupportedPlatform
                | MetadataField::Classifier
                | MetadataField::Requires
                | MetadataField::Provides
                | MetadataField::Obsoletes
                | MetadataField::RequiresDist
                | MetadataField::ProvidesDist
                | MetadataField::ObsoletesDist
                | MetadataField::RequiresExternal
                | MetadataField::ProjectUrl
                | MetadataField::ProvidesExtra
        )
    }
}

/// Whitelisted metadata of one release: field to values, in the order the
/// fields were first posted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageInfo(IndexMap<MetadataField, Vec<String>>);

impl PackageInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: MetadataField) -> &[String] {
        self.0.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Last stored value of a field, the way single-valued fields are read.
    pub fn get_last(&self, field: MetadataField) -> Option<&str> {
        self.get(field).last().map(String::as_str)
    }

    pub fn contains(&self, field: MetadataField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn insert(&mut self, field: MetadataField, values: Vec<String>) {
        self.0.insert(field, values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataField, &[String])> {
        self.0
            .iter()
            .map(|(field, values)| (*field, values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of normalization: the effective version and the filtered fields,
/// both persisted onto the release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMetadata {
    pub version: MetadataVersion,
    pub info: PackageInfo,
}

/// Validate, upgrade and filter posted metadata.
pub fn normalize(
    declared_version: Option<&str>,
    fields: &FormFields,
) -> Result<NormalizedMetadata, MetadataError> {
    let declared: MetadataVersion = declared_version
        .map(str::trim)
        .ok_or(MetadataError::InvalidMetadataVersion)?
        .parse()?;

    let version = effective_version(declared, fields);

    let mut info = PackageInfo::new();
    for (key, values) in fields.iter() {
        let Some(field) = MetadataField::from_key(key) else {
            continue;
        };
        if field == MetadataField::Classifier && fields.contains(LEGACY_CLASSIFIERS_FIELD) {
            continue;
        }
        if version.allows(field) {
            info.insert(field, strip_unknown(values));
        }
    }

    if fields.contains(LEGACY_CLASSIFIERS_FIELD) && version.allows(MetadataField::Classifier) {
        info.insert(
            MetadataField::Classifier,
            strip_unknown(fields.get_list(LEGACY_CLASSIFIERS_FIELD)),
        );
    }

    Ok(NormalizedMetadata { version, info })
}

fn effective_version(declared: MetadataVersion, fields: &FormFields) -> MetadataVersion {
    let uses_newer_fields = fields.contains(LEGACY_CLASSIFIERS_FIELD)
        || fields.contains(MetadataField::DownloadUrl.key());

    if declared == MetadataVersion::V1_0 && uses_newer_fields {
        MetadataVersion::V1_1
    } else {
        declared
    }
}

fn strip_unknown(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|value| value.as_str() != UNKNOWN_VALUE)
        .cloned()
        .collect()
}
