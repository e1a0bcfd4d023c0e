//! Response fingerprints used to recognize "not found" pages and uniform
//! server behavior.
//!
//! Textual bodies are reduced to a 64-bit simhash over token 4-grams, so two
//! pages that differ only by an echoed path or a timestamp land a few bits
//! apart. Bodies that do not decode as UTF-8 fall back to an MD5 of the raw
//! bytes, which only matches exact copies.

use crate::entry::decode_text;
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Bytes of body considered when fingerprinting.
pub const DEFAULT_SAMPLE_LEN: usize = 5120;
/// Two simhashes at most this many bits apart describe the same page.
pub const SIMHASH_MATCH_DISTANCE: u32 = 6;
const SHINGLE_SIZE: usize = 4;

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have",
        "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were",
        "will", "with", "you", "your", "html", "head", "body", "div", "span", "http", "https",
        "www", "com",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Simhash(u64),
    Md5(String),
}

impl Fingerprint {
    /// Fingerprints the first `sample_len` bytes of a body, after trimming
    /// surrounding whitespace and line breaks.
    pub fn from_body(raw: &[u8], sample_len: usize) -> Self {
        let trimmed = trim_ascii_whitespace(raw);
        let sample = &trimmed[..trimmed.len().min(sample_len)];
        match decode_text(sample) {
            Some(text) => Fingerprint::Simhash(simhash(&text)),
            None => Fingerprint::Md5(md5_hex(sample)),
        }
    }

    /// Whether both fingerprints describe the same page.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        match (self, other) {
            (Fingerprint::Simhash(a), Fingerprint::Simhash(b)) => {
                hamming_distance(*a, *b) <= SIMHASH_MATCH_DISTANCE
            }
            (Fingerprint::Md5(a), Fingerprint::Md5(b)) => a == b,
            _ => false,
        }
    }

    /// Similarity in `[0, 1]`.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        match (self, other) {
            (Fingerprint::Simhash(a), Fingerprint::Simhash(b)) => {
                1.0 - f64::from(hamming_distance(*a, *b)) / 64.0
            }
            (Fingerprint::Md5(a), Fingerprint::Md5(b)) if a == b => 1.0,
            _ => 0.0,
        }
    }
}

fn trim_ascii_whitespace(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &raw[start..end]
}

/// Lowercased word tokens with stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_REGEX
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// 64-bit simhash over token 4-grams. Texts shorter than one shingle hash as
/// a single feature; empty text hashes to 0.
pub fn simhash(text: &str) -> u64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0;
    }

    let shingles: Vec<String> = if tokens.len() < SHINGLE_SIZE {
        vec![tokens.join(" ")]
    } else {
        tokens.windows(SHINGLE_SIZE).map(|w| w.join(" ")).collect()
    };

    let mut weights = [0i64; 64];
    for shingle in &shingles {
        let h = feature_hash(shingle);
        for (bit, weight) in weights.iter_mut().enumerate() {
            if h & (1 << bit) != 0 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1 << bit))
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

fn feature_hash(feature: &str) -> u64 {
    let digest = Md5::digest(feature.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", Md5::digest(content))
}
