//! Client for the party archive's `search_hash` endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use stashtag_core::{Fingerprint, PostRecord};
use stashtag_io::{HttpClientConfig, HttpFetcher};
use tracing::debug;

use crate::{LookupError, MetadataSource};

pub const DEFAULT_SOURCE_URL: &str = "https://coomer.su/api/v1";

#[derive(Debug, Clone)]
pub struct SourceClientConfig {
    pub base_url: String,
    pub http: HttpClientConfig,
}

impl Default for SourceClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOURCE_URL.to_string(),
            http: HttpClientConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHashResponse {
    posts: Vec<PostDto>,
}

// Only the top-level post fields; nested `file`/`attachments` are ignored.
#[derive(Debug, Deserialize)]
struct PostDto {
    #[serde(default)]
    file_id: Option<i64>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    substring: Option<String>,
}

impl From<PostDto> for PostRecord {
    fn from(dto: PostDto) -> Self {
        Self {
            source_file_id: dto.file_id.unwrap_or_default(),
            external_id: dto.id.unwrap_or_default(),
            user: dto.user.unwrap_or_default(),
            service: dto.service.unwrap_or_default(),
            title: dto.title.unwrap_or_default(),
            published_at: dto.published.unwrap_or_default(),
            description: dto.substring.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartyClient {
    base_url: String,
    http: HttpFetcher,
}

impl PartyClient {
    pub fn new(config: SourceClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http: HttpFetcher::new(config.http)?,
        })
    }

    fn search_url(&self, fingerprint: &Fingerprint) -> String {
        format!("{}/search_hash/{}", self.base_url, fingerprint)
    }
}

#[async_trait]
impl MetadataSource for PartyClient {
    async fn lookup_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<PostRecord>, LookupError> {
        let response: SearchHashResponse = self.http.get_json(&self.search_url(fingerprint)).await?;
        debug!(%fingerprint, posts = response.posts.len(), "hash search complete");
        Ok(response.posts.into_iter().map(PostRecord::from).collect())
    }
}
