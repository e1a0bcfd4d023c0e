//! This module contains the parsing functions used throughout the application.
//! It handles parsing of path/file dictionaries, cookie files, and plugin options.

use crate::candidate::{Candidate, Severity, normalize_url};
use crate::error::ScanError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;

/// One section of a dictionary file.
#[derive(Deserialize)]
struct Section {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// A dictionary entry exactly as written in the JSON file.
#[derive(Deserialize)]
struct RawCandidate {
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    no_suffix: bool,
    #[serde(default)]
    executable: bool,
    #[serde(default)]
    match_string: Option<String>,
    #[serde(default)]
    match_bytes: Option<String>,
    #[serde(default)]
    handle_redirect: bool,
}

/// Entries loaded from a dictionary, plus a message per entry that was skipped.
#[derive(Debug, Default)]
pub struct Dictionary {
    pub candidates: Vec<Candidate>,
    pub skipped: Vec<String>,
}

/// Parses the contents of a dictionary file.
///
/// The file must be a list of sections; a malformed entry is skipped and
/// reported, it never fails the whole dictionary.
pub fn parse_dictionary(content: &str) -> Result<Dictionary, String> {
    let sections: Vec<Section> = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let mut dictionary = Dictionary::default();

    for (section_idx, section) in sections.into_iter().enumerate() {
        for (entry_idx, value) in section.data.into_iter().enumerate() {
            match parse_entry(value) {
                Ok(candidate) => dictionary.candidates.push(candidate),
                Err(reason) => dictionary
                    .skipped
                    .push(format!("section {section_idx}, entry {entry_idx}: {reason}")),
            }
        }
    }

    Ok(dictionary)
}

fn parse_entry(value: serde_json::Value) -> Result<Candidate, String> {
    let raw: RawCandidate = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if raw.url.trim().is_empty() {
        return Err("empty url".to_string());
    }
    let match_bytes = raw.match_bytes.as_deref().map(decode_hex).transpose()?;

    Ok(Candidate {
        url: normalize_url(&raw.url),
        description: raw.description,
        severity: raw.severity,
        match_string: raw.match_string,
        match_bytes,
        no_suffix: raw.no_suffix,
        executable: raw.executable,
        handle_redirect: raw.handle_redirect,
    })
}

/// Reads and parses a dictionary file.
pub fn load_dictionary(path: &Path) -> Result<Dictionary, ScanError> {
    let dictionary_error = |reason: String| ScanError::Dictionary {
        path: path.display().to_string(),
        reason,
    };
    let content = read_to_string(path).map_err(|e| dictionary_error(e.to_string()))?;
    parse_dictionary(&content).map_err(dictionary_error)
}

/// Decodes a hex string (whitespace ignored) into bytes.
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, String> {
    let digits: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    hex::decode(&digits).map_err(|e| format!("invalid hex string {raw:?}: {e}"))
}

/// Reads a raw cookie header file. A leading `Cookie: ` and line breaks are
/// stripped.
pub fn parse_cookie_file(path: &Path) -> Result<String, ScanError> {
    let content = read_to_string(path)?;
    Ok(parse_cookie_header(&content))
}

pub fn parse_cookie_header(content: &str) -> String {
    let trimmed = content.trim();
    let value = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("cookie:") => &trimmed[7..],
        _ => trimmed,
    };
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses repeated `PLUGIN:OPTS` values into a map of plugin name to options.
/// Values without a `:` are ignored.
pub fn parse_plugin_options(options: &[String]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for option in options {
        if let Some((plugin, opts)) = option.split_once(':') {
            map.entry(plugin.trim().to_lowercase())
                .or_default()
                .push(opts.trim().to_string());
        }
    }
    map
}
