//! Clients for the metadata source and the catalog, plus the media-type classifier.
//!
//! Each external system sits behind a trait so the sync pipeline can run against
//! in-memory doubles in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use stashtag_core::{
    CatalogEntry, Fingerprint, MediaKind, PostRecord, SceneSearch, SceneUpdate,
};
use stashtag_io::FetchError;
use thiserror::Error;

mod classify;
mod party;
mod stash;

pub use classify::MimeClassifier;
pub use party::{PartyClient, SourceClientConfig, DEFAULT_SOURCE_URL};
pub use stash::{CatalogClientConfig, StashClient, API_KEY_ENV};

pub const CRATE_NAME: &str = "stashtag-adapters";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("graphql errors: {0}")]
    GraphQl(String),
    #[error("graphql response has no {0}")]
    MissingData(&'static str),
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("cannot determine media type of {}", .0.display())]
    Unknown(PathBuf),
}

/// Hash-addressed lookup of published posts.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Posts whose attached file has this fingerprint. Empty means no match.
    async fn lookup_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<PostRecord>, LookupError>;
}

/// Scene catalog that can be searched by path and patched field by field.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `pattern` is a regular expression matched against stored file paths by the catalog.
    async fn find_scenes_by_path_regex(&self, pattern: &str) -> Result<SceneSearch, CatalogError>;

    async fn update_scene(&self, update: &SceneUpdate) -> Result<CatalogEntry, CatalogError>;
}

pub trait ContentClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> Result<MediaKind, ClassificationError>;
}
