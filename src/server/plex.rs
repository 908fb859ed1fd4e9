//! Concrete [`super::MediaServerClient`] backed by a Plex-compatible HTTP
//! API, reached via `X-Plex-Token` auth (spec §6).

use super::{EditFields, MediaItem, MediaServerClient};
use crate::error::ServerError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 0.3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct PlexClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    semaphore: Arc<Semaphore>,
    request_delay: Duration,
}

impl PlexClient {
    pub fn new(base_url: String, token: String, max_concurrent_requests: usize, request_delay_secs: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            request_delay: Duration::from_secs_f64(request_delay_secs.max(0.0)),
        }
    }

    /// Runs `call` under the concurrency semaphore, retrying on 5xx with
    /// `0.3 * 2^attempt` backoff, then pacing `request_delay` before the
    /// permit is released so bursts are smoothed at the source.
    async fn with_bound<T, F, Fut>(&self, call: F) -> Result<T, ServerError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ServerError>>,
    {
        let _permit = self.semaphore.acquire().await.expect("semaphore not closed");

        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => {
                    tokio::time::sleep(self.request_delay).await;
                    return Ok(value);
                }
                Err(ServerError::Transport(err)) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    let backoff = Duration::from_secs_f64(BACKOFF_BASE_SECS * 2f64.powi(attempt as i32 - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "server transport error, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(ServerError::Client { status, ref body }) if status >= 500 && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let backoff = Duration::from_secs_f64(BACKOFF_BASE_SECS * 2f64.powi(attempt as i32 - 1));
                    tracing::warn!(attempt, ?backoff, status, body, "server 5xx, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    tokio::time::sleep(self.request_delay).await;
                    return Err(err);
                }
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Startup connectivity check: a failure here is fatal (spec §7), not
    /// retried through the usual transport-retry path.
    pub async fn check_connection(&self) -> Result<(), ServerError> {
        self.get_json("/identity", &[]).await.map(|_| ())
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value, ServerError> {
        self.with_bound(|| async move {
            let response = self
                .http
                .get(self.url(path))
                .query(query)
                .header("X-Plex-Token", &self.token)
                .header("Accept", "application/json")
                .send()
                .await?;
            classify(response).await
        })
        .await
    }

    async fn put(&self, path: &str, query: &[(&str, &str)]) -> Result<serde_json::Value, ServerError> {
        self.with_bound(|| async move {
            let response = self
                .http
                .put(self.url(path))
                .query(query)
                .header("X-Plex-Token", &self.token)
                .header("Accept", "application/json")
                .send()
                .await?;
            classify(response).await
        })
        .await
    }
}

async fn classify(response: reqwest::Response) -> Result<serde_json::Value, ServerError> {
    let status = response.status();
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServerError::Client {
            status: status.as_u16(),
            body,
        });
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(serde_json::Value::Null);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServerError::Client {
            status: status.as_u16(),
            body,
        });
    }
    response.json::<serde_json::Value>().await.map_err(ServerError::Transport)
}

#[derive(Debug, Clone)]
pub struct PlexItem {
    rating_key: String,
    files: Vec<PathBuf>,
}

#[async_trait]
impl MediaItem for PlexItem {
    fn id(&self) -> &str {
        &self.rating_key
    }

    fn files(&self) -> Vec<PathBuf> {
        self.files.clone()
    }
}

#[derive(Deserialize)]
struct MediaContainerEnvelope {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainerBody,
}

#[derive(Deserialize, Default)]
struct MediaContainerBody {
    #[serde(default, rename = "Metadata")]
    metadata: Vec<MetadataNode>,
    #[serde(default)]
    identifier: Option<String>,
}

#[derive(Deserialize, Default)]
struct MetadataNode {
    #[serde(rename = "ratingKey")]
    rating_key: Option<String>,
    #[serde(default, rename = "Media")]
    media: Vec<MediaNode>,
}

#[derive(Deserialize, Default)]
struct MediaNode {
    #[serde(default, rename = "Part")]
    part: Vec<PartNode>,
}

#[derive(Deserialize, Default)]
struct PartNode {
    file: Option<String>,
}

impl MetadataNode {
    fn into_item(self) -> Option<PlexItem> {
        let rating_key = self.rating_key?;
        let files = self
            .media
            .into_iter()
            .flat_map(|m| m.part.into_iter())
            .filter_map(|p| p.file.map(PathBuf::from))
            .collect();
        Some(PlexItem { rating_key, files })
    }
}

fn parse_items(body: &serde_json::Value) -> Vec<PlexItem> {
    if body.is_null() {
        return Vec::new();
    }
    match serde_json::from_value::<MediaContainerEnvelope>(body.clone()) {
        Ok(envelope) => envelope
            .media_container
            .metadata
            .into_iter()
            .filter_map(MetadataNode::into_item)
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[async_trait]
impl MediaServerClient for PlexClient {
    async fn find_item_by_file(
        &self,
        abs_path: &Path,
        library_ids: &[i64],
    ) -> Result<Option<Box<dyn MediaItem>>, ServerError> {
        for library_id in library_ids {
            let section_type = self.library_type(*library_id).await?;
            let libtype = match section_type.as_deref() {
                Some("show") => "episode",
                Some("movie") | Some("video") => "movie",
                _ => "",
            };

            let path = format!("/library/sections/{library_id}/all");
            let query: Vec<(&str, &str)> = if libtype.is_empty() {
                Vec::new()
            } else {
                vec![("type", libtype_code(libtype))]
            };

            let body = self.get_json(&path, &query).await?;
            for item in parse_items(&body) {
                if item.files.iter().any(|f| paths_match(f, abs_path)) {
                    return Ok(Some(Box::new(item)));
                }
            }
        }
        Ok(None)
    }

    async fn fetch_item(&self, server_id: &str) -> Result<Option<Box<dyn MediaItem>>, ServerError> {
        let body = self.get_json(&format!("/library/metadata/{server_id}"), &[]).await?;
        let items = parse_items(&body);
        Ok(items.into_iter().next().map(|i| Box::new(i) as Box<dyn MediaItem>))
    }

    async fn edit_item(
        &self,
        item: &dyn MediaItem,
        fields: &EditFields,
        title_sort: Option<&str>,
    ) -> Result<(), ServerError> {
        if fields.is_empty() && title_sort.is_none() {
            return Ok(());
        }

        let metadata_path = format!("/library/metadata/{}", item.id());

        let mut query = Vec::new();
        if let Some(title) = &fields.title {
            query.push(("title.value", title.as_str()));
            query.push(("title.locked", "1"));
        }
        if let Some(summary) = &fields.summary {
            query.push(("summary.value", summary.as_str()));
            query.push(("summary.locked", "1"));
        }
        if let Some(aired) = &fields.aired {
            query.push(("originallyAvailableAt.value", aired.as_str()));
            query.push(("originallyAvailableAt.locked", "1"));
        }

        if !query.is_empty() {
            self.put(&metadata_path, &query).await?;
        }

        if let Some(sort) = title_sort {
            self.put(&metadata_path, &[("titleSort.value", sort), ("titleSort.locked", "1")])
                .await?;
        }

        // Reload to confirm the write landed.
        let _ = self.get_json(&metadata_path, &[]).await?;

        Ok(())
    }

    async fn upload_subtitle(
        &self,
        item: &dyn MediaItem,
        path: &Path,
        lang: &str,
    ) -> Result<(), ServerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| ServerError::Client {
                status: 0,
                body: format!("could not read subtitle {}", path.display()),
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "subtitle.srt".to_string());

        let upload_path = format!("/library/metadata/{}/uploadSubtitle", item.id());

        self.with_bound(|| {
            let bytes = bytes.clone();
            let file_name = file_name.clone();
            async move {
                let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                let form = reqwest::multipart::Form::new().part("file", part);

                let response = self
                    .http
                    .post(self.url(&upload_path))
                    .query(&[("language", lang)])
                    .header("X-Plex-Token", &self.token)
                    .multipart(form)
                    .send()
                    .await?;
                classify(response).await
            }
        })
        .await?;

        Ok(())
    }
}

impl PlexClient {
    async fn library_type(&self, library_id: i64) -> Result<Option<String>, ServerError> {
        let body = self.get_json(&format!("/library/sections/{library_id}"), &[]).await?;
        if body.is_null() {
            return Ok(None);
        }
        Ok(body
            .get("MediaContainer")
            .and_then(|mc| mc.get("Directory"))
            .and_then(|d| d.as_array())
            .and_then(|arr| arr.first())
            .and_then(|dir| dir.get("type"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_lowercase()))
    }
}

fn libtype_code(kind: &str) -> &'static str {
    match kind {
        "episode" => "4",
        "movie" => "1",
        _ => "",
    }
}

fn paths_match(candidate: &Path, target: &Path) -> bool {
    let canon_candidate = candidate.canonicalize().unwrap_or_else(|_| candidate.to_path_buf());
    let canon_target = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
    canon_candidate == canon_target
}
