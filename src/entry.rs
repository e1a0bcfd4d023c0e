//! One request/response pair as it flows through the heuristic chain.

use crate::candidate::Candidate;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, Url};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// What a request is probing for. Heuristics treat directories and files
/// differently (empty bodies, Tomcat 404s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Directory,
    File,
    /// Side-request issued by a heuristic.
    Side,
}

/// Extra tag attached to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Special {
    #[serde(rename = "tomcat-redirect")]
    TomcatRedirect,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    /// Deadline for the whole exchange; set by the timeout heuristic.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub code: u16,
    pub headers: HeaderMap,
    /// Body as read, at most the configured cap.
    pub raw: Vec<u8>,
    /// `raw` decoded as UTF-8, when it decodes.
    pub content: Option<String>,
    pub elapsed: Duration,
}

impl Response {
    pub fn new(code: u16, headers: HeaderMap) -> Self {
        Self {
            code,
            headers,
            raw: Vec::new(),
            content: Some(String::new()),
            elapsed: Duration::ZERO,
        }
    }

    pub fn set_body(&mut self, raw: Vec<u8>) {
        self.content = decode_text(&raw);
        self.raw = raw;
    }

    pub fn truncate(&mut self, limit: usize) {
        if self.raw.len() > limit {
            let mut raw = std::mem::take(&mut self.raw);
            raw.truncate(limit);
            self.set_body(raw);
        }
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.code) && self.location().is_some()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// True when the body holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.raw.iter().all(|b| b.is_ascii_whitespace())
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Decodes a body as UTF-8. A body cut mid-character by the read cap still
/// decodes up to the last complete character.
pub fn decode_text(raw: &[u8]) -> Option<String> {
    match std::str::from_utf8(raw) {
        Ok(text) => Some(text.to_string()),
        Err(e) if e.error_len().is_none() => {
            Some(String::from_utf8_lossy(&raw[..e.valid_up_to()]).into_owned())
        }
        Err(_) => None,
    }
}

/// Annotations written by heuristics.
#[derive(Debug, Clone, Default)]
pub struct EntryResult {
    pub soft404: bool,
    pub error_behavior: bool,
    pub string_match: bool,
    /// Predecessors when redirects were followed, oldest first.
    pub redirects: Vec<Entry>,
    pub har_location: Option<PathBuf>,
    pub special: Option<Special>,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub request: Request,
    pub response: Option<Response>,
    pub result: EntryResult,
    pub candidate: Candidate,
    pub kind: ProbeKind,
    /// Engine invocations so far.
    pub attempts: usize,
}

impl Entry {
    pub fn new(url: Url, candidate: Candidate, kind: ProbeKind) -> Self {
        Self {
            request: Request {
                url,
                method: Method::GET,
                headers: HeaderMap::new(),
                timeout: None,
            },
            response: None,
            result: EntryResult::default(),
            candidate,
            kind,
            attempts: 0,
        }
    }

    /// Entry for a heuristic's side-request.
    pub fn side(url: Url) -> Self {
        Self::new(url, Candidate::default(), ProbeKind::Side)
    }

    pub fn url(&self) -> &Url {
        &self.request.url
    }

    pub fn host(&self) -> String {
        host_key(&self.request.url)
    }

    pub fn code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.code)
    }

    /// Absolute URL of the directory this request lands in. For a directory
    /// probe that is the parent directory.
    pub fn directory(&self) -> String {
        directory_of(&self.request.url)
    }

    /// Clears everything a previous attempt left behind.
    pub fn reset(&mut self) {
        self.response = None;
        self.result = EntryResult::default();
        self.request.timeout = None;
    }
}

/// `host:port` key used for per-host state.
pub fn host_key(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

/// Parent directory of a URL's path, with origin.
pub fn directory_of(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    };
    format!("{}{}", url.origin().ascii_serialization(), dir)
}
