use super::Heuristic;
use super::soft404::TOMCAT_MARKER;
use crate::config::ScanConfig;
use crate::entry::{Entry, ProbeKind};
use crate::error::RequestError;
use async_trait::async_trait;
use reqwest::header::{COOKIE, HOST, HeaderMap, HeaderName, HeaderValue, RANGE, USER_AGENT};
use std::collections::HashSet;

/// Rejects requests aimed at a host outside the allow-set.
pub struct FilterRequestFromURL {
    allowed_hosts: HashSet<String>,
}

impl FilterRequestFromURL {
    pub fn new(allowed_hosts: HashSet<String>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.to_lowercase())
                .collect(),
        }
    }
}

#[async_trait]
impl Heuristic for FilterRequestFromURL {
    fn name(&self) -> &'static str {
        "filter_request_from_url"
    }

    async fn before_request(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let host = entry.url().host_str().unwrap_or_default().to_lowercase();
        if self.allowed_hosts.contains(&host) {
            Ok(())
        } else {
            Err(RequestError::reject(format!("host {host} is not allowed")))
        }
    }
}

/// Asks for the first `limit` bytes only and truncates when the server sends
/// more anyway.
pub struct IgnoreLargeBody {
    limit: usize,
}

impl IgnoreLargeBody {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }
}

#[async_trait]
impl Heuristic for IgnoreLargeBody {
    fn name(&self) -> &'static str {
        "ignore_large_body"
    }

    async fn before_request(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if let Ok(value) = HeaderValue::from_str(&format!("bytes=0-{}", self.limit - 1)) {
            entry.request.headers.insert(RANGE, value);
        }
        Ok(())
    }

    // 206 only exists because of the Range header added above.
    async fn after_headers(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if let Some(response) = entry.response.as_mut() {
            if response.code == 206 {
                response.code = 200;
            }
        }
        Ok(())
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if let Some(response) = entry.response.as_mut() {
            response.truncate(self.limit);
        }
        Ok(())
    }
}

/// Rejects responses whose status code is in the set. A Tomcat 404 on a
/// directory probe is let through: Tomcat answers where the front server
/// would have returned its own 404.
pub struct RejectStatusCode {
    codes: HashSet<u16>,
}

impl RejectStatusCode {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Heuristic for RejectStatusCode {
    fn name(&self) -> &'static str {
        "reject_status_code"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let Some(response) = entry.response.as_ref() else {
            return Ok(());
        };
        if !self.codes.contains(&response.code) {
            return Ok(());
        }
        let tomcat = response.code == 404
            && entry.kind == ProbeKind::Directory
            && response.text().contains(TOMCAT_MARKER);
        if tomcat {
            Ok(())
        } else {
            Err(RequestError::reject(format!("status code {}", response.code)))
        }
    }
}

/// Sets `string_match` when the candidate's needle appears in the body.
pub struct MatchString;

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[async_trait]
impl Heuristic for MatchString {
    fn name(&self) -> &'static str {
        "match_string"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let Some(response) = entry.response.as_ref() else {
            return Ok(());
        };
        let text_match = entry
            .candidate
            .match_string
            .as_deref()
            .is_some_and(|needle| response.text().contains(needle));
        let bytes_match = entry
            .candidate
            .match_bytes
            .as_deref()
            .is_some_and(|needle| contains_bytes(&response.raw, needle));
        entry.result.string_match = text_match || bytes_match;
        Ok(())
    }
}

/// Applies fixed headers (User-Agent, Host, Cookie) to every request.
pub struct SetHeader {
    headers: HeaderMap,
}

impl SetHeader {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        let mut headers = HeaderMap::new();
        let fixed: [(HeaderName, Option<&str>); 3] = [
            (USER_AGENT, Some(config.user_agent.as_str())),
            (HOST, config.vhost.as_deref()),
            (COOKIE, config.cookies.as_deref()),
        ];
        for (name, value) in fixed {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(name, value);
            }
        }
        Self::new(headers)
    }
}

#[async_trait]
impl Heuristic for SetHeader {
    fn name(&self) -> &'static str {
        "set_header"
    }

    async fn before_request(&self, entry: &mut Entry) -> Result<(), RequestError> {
        for (name, value) in &self.headers {
            entry.request.headers.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}
