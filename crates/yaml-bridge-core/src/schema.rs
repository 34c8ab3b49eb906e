//! Schema resolution for the language service.
//!
//! When the language service needs the text of a JSON schema it asks the
//! bridge through [`SchemaRequestService`]. [`HttpSchemaFetcher`] answers
//! over HTTP with ETag / Last-Modified revalidation, and reads `file://`
//! schemas from disk.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode, Url, header};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maximum number of cached schemas to prevent unbounded memory growth.
const MAX_CACHE_ENTRIES: usize = 256;

/// Answers schema requests coming from the language service.
///
/// Given a URL, returns the schema document's text or fails.
#[async_trait]
pub trait SchemaRequestService: Send + Sync {
    async fn request_schema(&self, url: &str) -> Result<String>;
}

/// Resolves a schema reference relative to the resource that mentions it.
///
/// # Examples
///
/// ```
/// use yaml_bridge_core::schema::resolve_relative_path;
///
/// let resolved = resolve_relative_path(
///     "definitions.json",
///     "https://example.com/schemas/all.json",
/// ).unwrap();
/// assert_eq!(resolved, "https://example.com/schemas/definitions.json");
/// ```
pub fn resolve_relative_path(relative_path: &str, resource: &str) -> Result<String> {
    let base = Url::parse(resource).map_err(|e| BridgeError::InvalidUri(format!("{resource}: {e}")))?;
    base.join(relative_path)
        .map(String::from)
        .map_err(|e| BridgeError::InvalidUri(format!("{relative_path}: {e}")))
}

/// Cached schema body with validation headers.
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub body: Arc<str>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: Instant,
}

/// HTTP schema fetcher with conditional-request caching.
///
/// The first request for a URL fetches it and stores the body together with
/// its `ETag` / `Last-Modified` headers. Later requests revalidate with
/// `If-None-Match` / `If-Modified-Since`; a `304 Not Modified` answer reuses
/// the cached body. If revalidation fails at the transport level the cached
/// body is served instead.
pub struct HttpSchemaFetcher {
    entries: DashMap<String, CachedSchema>,
    client: Client,
}

impl HttpSchemaFetcher {
    /// Creates a fetcher with a 30-second request timeout.
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("yaml-bridge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");

        Self {
            entries: DashMap::new(),
            client,
        }
    }

    /// Fetches the schema at `url`, revalidating any cached copy.
    pub async fn fetch(&self, url: &str) -> Result<Arc<str>> {
        if self.entries.len() >= MAX_CACHE_ENTRIES {
            self.evict_entries();
        }

        // Clone out of the map so no shard lock is held across the request.
        let cached = self.entries.get(url).map(|entry| entry.value().clone());

        if let Some(cached) = cached {
            return match self.conditional_request(url, &cached).await {
                Ok(Some(body)) => Ok(body),
                Ok(None) => Ok(cached.body),
                Err(e) => {
                    tracing::warn!("schema revalidation failed, using cache: {}", e);
                    Ok(cached.body)
                }
            };
        }

        self.fetch_and_store(url).await
    }

    async fn conditional_request(
        &self,
        url: &str,
        cached: &CachedSchema,
    ) -> Result<Option<Arc<str>>> {
        let mut request = self.client.get(url);

        if let Some(etag) = &cached.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &cached.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(|e| BridgeError::SchemaRequest {
            url: url.to_string(),
            source: e,
        })?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }

        self.store_response(url, response).await.map(Some)
    }

    pub(crate) async fn fetch_and_store(&self, url: &str) -> Result<Arc<str>> {
        tracing::debug!("resolving schema {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BridgeError::SchemaRequest {
                url: url.to_string(),
                source: e,
            })?;

        self.store_response(url, response).await
    }

    async fn store_response(&self, url: &str, response: reqwest::Response) -> Result<Arc<str>> {
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::SchemaStatus {
                url: url.to_string(),
                status: status.to_string(),
            });
        }

        let etag = header_string(&response, header::ETAG);
        let last_modified = header_string(&response, header::LAST_MODIFIED);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::SchemaRequest {
                url: url.to_string(),
                source: e,
            })?;

        let text = String::from_utf8(bytes.to_vec()).map_err(|_| BridgeError::InvalidSchema {
            url: url.to_string(),
        })?;
        let body: Arc<str> = Arc::from(text);

        self.entries.insert(
            url.to_string(),
            CachedSchema {
                body: Arc::clone(&body),
                etag,
                last_modified,
                fetched_at: Instant::now(),
            },
        );

        Ok(body)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops the oldest tenth of the cache.
    fn evict_entries(&self) {
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().fetched_at))
            .collect();
        by_age.sort_by_key(|(_, fetched_at)| *fetched_at);

        let target = (MAX_CACHE_ENTRIES / 10).max(1);
        for (url, _) in by_age.iter().take(target) {
            self.entries.remove(url);
        }

        tracing::debug!("evicted {} schema cache entries", target.min(by_age.len()));
    }
}

impl Default for HttpSchemaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchemaRequestService for HttpSchemaFetcher {
    async fn request_schema(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| BridgeError::InvalidUri(format!("{url}: {e}")))?;

        match parsed.scheme() {
            "http" | "https" => self.fetch(url).await.map(|body| body.to_string()),
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|()| BridgeError::InvalidUri(url.to_string()))?;
                Ok(tokio::fs::read_to_string(path).await?)
            }
            _ => Err(BridgeError::UnsupportedSchemaUrl(url.to_string())),
        }
    }
}

fn header_string(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
