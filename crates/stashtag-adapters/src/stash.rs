//! GraphQL client for a Stash server.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stashtag_core::{CatalogEntry, SceneSearch, SceneUpdate};
use stashtag_io::{HttpClientConfig, HttpFetcher};
use tracing::debug;

use crate::{Catalog, CatalogError};

/// Environment variable holding the Stash API key.
pub const API_KEY_ENV: &str = "STASH_API_KEY";

const FIND_SCENES_BY_PATH_REGEX_QUERY: &str = r#"
query FindScenesByPathRegex($filter: FindFilterType) {
  findScenesByPathRegex(filter: $filter) {
    count
    duration
    filesize
    scenes { id title details urls date }
  }
}
"#;

const SCENE_UPDATE_MUTATION: &str = r#"
mutation SceneUpdate($input: SceneUpdateInput!) {
  sceneUpdate(input: $input) {
    id
    title
    details
    date
    urls
  }
}
"#;

#[derive(Debug, Clone)]
pub struct CatalogClientConfig {
    /// Server root; `/graphql` is appended.
    pub url: String,
    pub api_key: Option<String>,
    pub http: HttpClientConfig,
}

impl CatalogClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            http: HttpClientConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> Result<T, CatalogError> {
        if !self.errors.is_empty() {
            let messages: Vec<_> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(CatalogError::GraphQl(messages.join("; ")));
        }
        self.data.ok_or(CatalogError::MissingData("data"))
    }
}

#[derive(Debug, Deserialize)]
struct FindScenesData {
    #[serde(rename = "findScenesByPathRegex")]
    find_scenes_by_path_regex: SceneSearch,
}

#[derive(Debug, Deserialize)]
struct SceneUpdateData {
    #[serde(rename = "sceneUpdate")]
    scene_update: Option<CatalogEntry>,
}

#[derive(Debug, Clone)]
pub struct StashClient {
    endpoint: String,
    http: HttpFetcher,
}

impl StashClient {
    pub fn new(config: CatalogClientConfig) -> anyhow::Result<Self> {
        let mut http = config.http;
        if let Some(key) = config.api_key {
            http.headers.push(("ApiKey".to_string(), key));
        }
        Ok(Self {
            endpoint: format!("{}/graphql", config.url.trim_end_matches('/')),
            http: HttpFetcher::new(http)?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Catalog for StashClient {
    async fn find_scenes_by_path_regex(&self, pattern: &str) -> Result<SceneSearch, CatalogError> {
        let body = json!({
            "query": FIND_SCENES_BY_PATH_REGEX_QUERY,
            "variables": { "filter": { "q": pattern, "per_page": -1 } },
        });
        let response: GraphQlResponse<FindScenesData> =
            self.http.post_json(&self.endpoint, &body).await?;
        let search = response.into_data()?.find_scenes_by_path_regex;
        debug!(pattern, count = search.count, "scene search complete");
        Ok(search)
    }

    async fn update_scene(&self, update: &SceneUpdate) -> Result<CatalogEntry, CatalogError> {
        let body = json!({
            "query": SCENE_UPDATE_MUTATION,
            "variables": { "input": update },
        });
        let response: GraphQlResponse<SceneUpdateData> =
            self.http.post_json(&self.endpoint, &body).await?;
        response
            .into_data()?
            .scene_update
            .ok_or(CatalogError::MissingData("sceneUpdate"))
    }
}
