//! Package index core
//!
//! This crate holds the business logic of a distutils-compatible package
//! index: the registration/upload transaction pipeline that turns one form
//! POST into a versioned package record, and the read-side handlers used by
//! the query protocol. It is consumed by `pkgindex-server` but has no
//! dependency on any HTTP framework.

pub mod access;
pub mod classifiers;
pub mod db;
pub mod error;
pub mod metadata;
pub mod model;
pub mod query;
pub mod resolver;
pub mod storage;
pub mod upload;
pub mod visibility;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{IndexError, Result};
pub use metadata::{MetadataField, MetadataVersion, NormalizedMetadata, PackageInfo};
pub use model::{Actor, FormFields, UploadedFile};
pub use query::{
    QueryService, ReleaseData, ReleaseDataValue, ReleaseUrl, SearchDocument, SearchHit,
    SearchOperator, SearchSpec,
};
pub use storage::{ContentStore, StoredContent};
pub use upload::{UploadOutcome, UploadPipeline, UploadRequest};
