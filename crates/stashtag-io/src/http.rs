use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info_span, Instrument};

const BODY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_concurrency: usize,
    /// Headers attached to every request, e.g. an API key.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: Some(
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            ),
            max_concurrency: 4,
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}: {body}")]
    HttpStatus { status: u16, url: String, body: String },
    #[error("invalid json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Thin JSON-over-HTTP client. Every call is a single attempt; there is no retry layer.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name {name:?}"))?;
            let mut value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .timeout(config.timeout)
            .default_headers(headers);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            limit: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.send_json::<(), T>(Method::GET, url, None).await
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, url, Some(body)).await
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<T, FetchError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let span = info_span!("http_request", %method, url);
        async {
            let _permit = self
                .limit
                .acquire()
                .await
                .expect("http semaphore is never closed");

            let mut request = self.client.request(method, url);
            if let Some(body) = body {
                request = request.header(CONTENT_TYPE, "application/json").json(body);
            }

            let response = request.send().await.map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

            if !status.is_success() {
                return Err(status_error(status, url, &bytes));
            }

            debug!(status = status.as_u16(), bytes = bytes.len(), "response received");
            serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })
        }
        .instrument(span)
        .await
    }
}

fn status_error(status: StatusCode, url: &str, body: &[u8]) -> FetchError {
    FetchError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
        body: String::from_utf8_lossy(body)
            .chars()
            .take(BODY_SNIPPET_CHARS)
            .collect(),
    }
}
