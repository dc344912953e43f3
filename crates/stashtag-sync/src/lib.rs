//! Enrichment run: correlate local files with posts by content hash, find their scenes
//! in the catalog and fill in missing scene metadata.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use stashtag_adapters::{
    Catalog, CatalogClientConfig, ContentClassifier, MetadataSource, MimeClassifier, PartyClient,
    SourceClientConfig, StashClient, API_KEY_ENV, DEFAULT_SOURCE_URL,
};
use stashtag_core::{CatalogEntry, DateParseError, PostRecord};
use stashtag_io::HttpClientConfig;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod correlate;
pub mod merge;

pub use correlate::{
    enumerate_candidates, is_video, lookup_file, normalize_catalog_path, resolve_ambiguity,
    Ambiguity, Correlation, FileError,
};
pub use merge::{apply_decision, merge_fields, merge_fields_with, DatePolicy, MergeOutcome};

pub const CRATE_NAME: &str = "stashtag-sync";

/// Per-run behaviour independent of which remote systems are used.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Local paths are made relative to this before catalog lookup.
    pub base_path: Option<PathBuf>,
    pub date_policy: DatePolicy,
    pub dry_run: bool,
    /// Files fingerprinted and looked up at once; 1 keeps the walk strictly sequential.
    pub lookup_concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            date_policy: DatePolicy::Abort,
            dry_run: false,
            lookup_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub source_url: String,
    pub catalog_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub run: RunConfig,
}

impl EnrichConfig {
    pub fn from_env(catalog_url: impl Into<String>) -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            catalog_url: catalog_url.into(),
            api_key: std::env::var(API_KEY_ENV).ok().filter(|v| !v.trim().is_empty()),
            user_agent: std::env::var("STASHTAG_USER_AGENT")
                .unwrap_or_else(|_| concat!("stashtag/", env!("CARGO_PKG_VERSION")).to_string()),
            http_timeout_secs: std::env::var("STASHTAG_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            run: RunConfig::default(),
        }
    }

    fn http(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            max_concurrency: self.run.lookup_concurrency.max(1),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("input path {} does not exist", .0.display())]
    InputNotFound(PathBuf),
    #[error("cannot list {}: {source}", path.display())]
    Enumerate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("merging post {post_id} into scene {scene_id}: {source}")]
    DateParse {
        scene_id: i64,
        post_id: String,
        #[source]
        source: DateParseError,
    },
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_scanned: usize,
    pub fingerprint_failures: usize,
    pub lookup_failures: usize,
    pub non_video: usize,
    pub no_match: usize,
    pub ambiguous: usize,
    pub catalog_lookups: usize,
    pub catalog_query_failures: usize,
    pub scenes_matched: usize,
    pub scenes_updated: usize,
    pub scenes_unchanged: usize,
    pub update_failures: usize,
    pub dry_run_skips: usize,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            files_scanned: 0,
            fingerprint_failures: 0,
            lookup_failures: 0,
            non_video: 0,
            no_match: 0,
            ambiguous: 0,
            catalog_lookups: 0,
            catalog_query_failures: 0,
            scenes_matched: 0,
            scenes_updated: 0,
            scenes_unchanged: 0,
            update_failures: 0,
            dry_run_skips: 0,
        }
    }
}

pub struct Enricher {
    source: Arc<dyn MetadataSource>,
    catalog: Arc<dyn Catalog>,
    classifier: Arc<dyn ContentClassifier>,
    config: RunConfig,
}

impl Enricher {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        catalog: Arc<dyn Catalog>,
        classifier: Arc<dyn ContentClassifier>,
        config: RunConfig,
    ) -> Self {
        Self {
            source,
            catalog,
            classifier,
            config,
        }
    }

    /// Wire the party and Stash HTTP clients from configuration.
    pub fn from_config(config: EnrichConfig) -> anyhow::Result<Self> {
        let http = config.http();
        let source = PartyClient::new(SourceClientConfig {
            base_url: config.source_url.clone(),
            http: http.clone(),
        })?;
        let catalog = StashClient::new(CatalogClientConfig {
            url: config.catalog_url.clone(),
            api_key: config.api_key.clone(),
            http,
        })?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(catalog),
            Arc::new(MimeClassifier),
            config.run,
        ))
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Walk `root` one file at a time: every catalog search sees the writes made for the
    /// files before it.
    pub async fn run(&self, root: &Path) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("enrich_run", %run_id, root = %root.display());
        async {
            let mut summary = RunSummary::new(run_id);
            if !root.exists() {
                return Err(RunError::InputNotFound(root.to_path_buf()));
            }
            let (root, base) = self.resolve_paths(root);

            let files = enumerate_candidates(&root).map_err(|source| RunError::Enumerate {
                path: root.clone(),
                source,
            })?;
            summary.files_scanned = files.len();
            info!(files = files.len(), "scanning candidates");

            let limit = self.config.lookup_concurrency.max(1);
            if limit == 1 {
                for path in files {
                    let span = info_span!("file", path = %path.display());
                    let looked_up = lookup_file(self.source.as_ref(), &path)
                        .instrument(span.clone())
                        .await;
                    self.process_file(looked_up, base.as_deref(), &mut summary)
                        .instrument(span)
                        .await?;
                }
            } else {
                for looked_up in self.lookup_concurrently(files, limit, &mut summary).await {
                    self.process_file(looked_up, base.as_deref(), &mut summary).await?;
                }
            }

            summary.finished_at = Utc::now();
            info!(
                files = summary.files_scanned,
                matched = summary.scenes_matched,
                updated = summary.scenes_updated,
                "enrichment run complete"
            );
            Ok::<_, RunError>(summary)
        }
        .instrument(span)
        .await
    }

    /// Classify, disambiguate, search the catalog and merge into every scene found.
    async fn process_file(
        &self,
        looked_up: Result<Correlation, FileError>,
        base: Option<&Path>,
        summary: &mut RunSummary,
    ) -> Result<(), RunError> {
        let correlation = match looked_up {
            Ok(correlation) => correlation,
            Err(err @ FileError::Fingerprint { .. }) => {
                error!(%err, "skipping unreadable file");
                summary.fingerprint_failures += 1;
                return Ok(());
            }
            Err(err @ FileError::Lookup { .. }) => {
                error!(%err, "skipping file");
                summary.lookup_failures += 1;
                return Ok(());
            }
        };

        let path = correlation.path;
        if !is_video(self.classifier.as_ref(), &path) {
            info!(path = %path.display(), "skipping non-video file");
            summary.non_video += 1;
            return Ok(());
        }

        let post = match resolve_ambiguity(correlation.posts) {
            Ambiguity::Unique(post) => post,
            Ambiguity::NoMatch => {
                info!(
                    path = %path.display(),
                    fingerprint = %correlation.fingerprint,
                    "no posts found for file"
                );
                summary.no_match += 1;
                return Ok(());
            }
            Ambiguity::Ambiguous(count) => {
                warn!(
                    path = %path.display(),
                    fingerprint = %correlation.fingerprint,
                    count,
                    "several posts share this file; skipping"
                );
                summary.ambiguous += 1;
                return Ok(());
            }
        };

        let catalog_path = normalize_catalog_path(&path, base);
        summary.catalog_lookups += 1;
        let search = match self.catalog.find_scenes_by_path_regex(&catalog_path).await {
            Ok(search) => search,
            Err(err) => {
                error!(path = %catalog_path, %err, "scene search failed");
                summary.catalog_query_failures += 1;
                return Ok(());
            }
        };
        if search.scenes.is_empty() {
            warn!(path = %catalog_path, "found no scene in catalog");
        }

        // A scene listed twice merges against its written state the second time.
        let mut written: Vec<CatalogEntry> = Vec::new();
        for entry in search.scenes {
            summary.scenes_matched += 1;
            let current = written
                .iter()
                .find(|w| w.id == entry.id)
                .cloned()
                .unwrap_or(entry);
            if let Some(updated) = self.merge_scene(&current, &post, summary).await? {
                written.retain(|w| w.id != updated.id);
                written.push(updated);
            }
        }
        Ok(())
    }

    /// Returns the scene as written when an update went through.
    async fn merge_scene(
        &self,
        entry: &CatalogEntry,
        post: &PostRecord,
        summary: &mut RunSummary,
    ) -> Result<Option<CatalogEntry>, RunError> {
        let decision = merge_fields_with(entry, post, self.config.date_policy).map_err(|source| {
            RunError::DateParse {
                scene_id: entry.id,
                post_id: post.external_id.clone(),
                source,
            }
        })?;

        let outcome =
            apply_decision(self.catalog.as_ref(), entry, decision, self.config.dry_run).await;
        Ok(match outcome {
            MergeOutcome::Unchanged => {
                summary.scenes_unchanged += 1;
                None
            }
            MergeOutcome::DryRun(_) => {
                summary.dry_run_skips += 1;
                None
            }
            MergeOutcome::Updated(updated) => {
                summary.scenes_updated += 1;
                Some(updated)
            }
            MergeOutcome::Failed(_) => {
                summary.update_failures += 1;
                None
            }
        })
    }

    // Relativizing needs both sides in the same form, so make them absolute when a base is set.
    fn resolve_paths(&self, root: &Path) -> (PathBuf, Option<PathBuf>) {
        match &self.config.base_path {
            Some(base) => (absolute_or_same(root), Some(absolute_or_same(base))),
            None => (root.to_path_buf(), None),
        }
    }

    /// Fingerprint and look up up to `limit` files at once; results come back in input order.
    async fn lookup_concurrently(
        &self,
        files: Vec<PathBuf>,
        limit: usize,
        summary: &mut RunSummary,
    ) -> Vec<Result<Correlation, FileError>> {
        let permits = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        for (idx, path) in files.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let span = info_span!("file", path = %path.display());
            tasks.spawn(
                async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .expect("lookup semaphore is never closed");
                    (idx, lookup_file(source.as_ref(), &path).await)
                }
                .instrument(span),
            );
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => {
                    error!(%err, "lookup task failed");
                    summary.lookup_failures += 1;
                }
            }
        }
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }
}

fn absolute_or_same(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
