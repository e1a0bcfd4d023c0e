//! Candidate paths and files as they come out of the dictionaries and plugins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How interesting a finding is. Serialized lowercase, as in the dictionaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    #[default]
    Warning,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// The level tag used by the pretty renderer.
    pub fn level_name(&self) -> &'static str {
        match self {
            Severity::Informational => "INFO",
            Severity::Warning => "WARNING",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Informational => "informational",
            Severity::Warning => "warning",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// A relative URL to probe, plus the metadata that travels with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Candidate {
    /// Relative path, always starting with `/`.
    pub url: String,
    pub description: String,
    pub severity: Severity,
    /// Text needle; a hit forces a finding regardless of soft-404.
    pub match_string: Option<String>,
    /// Raw needle, searched in the undecoded body.
    pub match_bytes: Option<Vec<u8>>,
    /// Probe the name as-is, never append file suffixes.
    pub no_suffix: bool,
    /// Expand with executable suffixes instead of data suffixes.
    pub executable: bool,
    /// Follow redirects for this candidate.
    pub handle_redirect: bool,
}

impl Candidate {
    pub fn new(url: &str, description: &str, severity: Severity) -> Self {
        Self {
            url: normalize_url(url),
            description: description.to_string(),
            severity,
            ..Default::default()
        }
    }

    /// The root directory of the target.
    pub fn root() -> Self {
        Self::new("/", "Root directory", Severity::Informational)
    }

    pub fn is_root(&self) -> bool {
        self.url == "/"
    }

    /// Same metadata, different URL.
    pub fn with_url(&self, url: &str) -> Self {
        Self {
            url: normalize_url(url),
            ..self.clone()
        }
    }

    pub fn has_needle(&self) -> bool {
        self.match_string.is_some() || self.match_bytes.is_some()
    }
}

/// Normalizes a relative URL: trailing slashes removed, a single leading slash,
/// and the empty path collapsed to `/`.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Joins a directory candidate URL and a child URL, both normalized.
pub fn join_url(directory: &str, child: &str) -> String {
    let child = normalize_url(child);
    if directory == "/" {
        child
    } else if child == "/" {
        normalize_url(directory)
    } else {
        format!("{}{}", normalize_url(directory), child)
    }
}
