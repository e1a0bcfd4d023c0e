//! HAR archive of successful requests, one file per request.

use super::Heuristic;
use crate::entry::Entry;
use crate::error::RequestError;
use crate::output::Reporter;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct HarDocument {
    pub log: HarLog,
}

#[derive(Debug, Serialize)]
pub struct HarLog {
    pub version: &'static str,
    pub creator: HarCreator,
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Serialize)]
pub struct HarCreator {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub started_date_time: String,
    pub time: f64,
    pub request: HarRequest,
    pub response: HarResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub http_version: &'static str,
    pub headers: Vec<HarHeader>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    pub status: u16,
    pub http_version: &'static str,
    pub headers: Vec<HarHeader>,
    pub content: HarContent,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    pub size: usize,
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

fn har_headers(headers: &HeaderMap) -> Vec<HarHeader> {
    headers
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.to_string(),
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })
        .collect()
}

impl HarDocument {
    /// Archive of one completed entry. `None` when it has no response.
    pub fn from_entry(entry: &Entry) -> Option<Self> {
        let response = entry.response.as_ref()?;
        let mime_type = response
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let har_entry = HarEntry {
            started_date_time: chrono::Local::now().to_rfc3339(),
            time: response.elapsed.as_secs_f64() * 1000.0,
            request: HarRequest {
                method: entry.request.method.to_string(),
                url: entry.url().to_string(),
                http_version: "HTTP/1.1",
                headers: har_headers(&entry.request.headers),
            },
            response: HarResponse {
                status: response.code,
                http_version: "HTTP/1.1",
                headers: har_headers(&response.headers),
                content: HarContent {
                    size: response.raw.len(),
                    mime_type,
                    text: String::from_utf8_lossy(&response.raw).into_owned(),
                },
                redirect_url: response.location().unwrap_or_default().to_string(),
            },
        };

        Some(Self {
            log: HarLog {
                version: "1.2",
                creator: HarCreator {
                    name: "softbuster",
                    version: env!("CARGO_PKG_VERSION"),
                },
                entries: vec![har_entry],
            },
        })
    }
}

/// Writes `{uuid}.har` for every successful request.
pub struct StoreHar {
    dir: PathBuf,
    reporter: Arc<Reporter>,
}

impl StoreHar {
    pub fn new(dir: PathBuf, reporter: Arc<Reporter>) -> Self {
        Self { dir, reporter }
    }

    async fn write(&self, path: &Path, json: Vec<u8>) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(path, json).await
    }
}

#[async_trait]
impl Heuristic for StoreHar {
    fn name(&self) -> &'static str {
        "store_har"
    }

    async fn on_request_successful(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let Some(document) = HarDocument::from_entry(entry) else {
            return Ok(());
        };
        let json = match serde_json::to_vec_pretty(&document) {
            Ok(json) => json,
            Err(e) => {
                self.reporter
                    .error(&format!("Could not encode HAR for {}: {e}", entry.url()));
                return Ok(());
            }
        };
        let path = self.dir.join(format!("{}.har", Uuid::new_v4()));
        match self.write(&path, json).await {
            Ok(()) => entry.result.har_location = Some(path),
            Err(e) => self
                .reporter
                .error(&format!("Could not write {}: {e}", path.display())),
        }
        Ok(())
    }
}
