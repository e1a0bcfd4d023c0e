//! Soft-404 detection.
//!
//! The first time a request lands in a directory, random names are requested
//! in that directory to learn what "not found" looks like there. Responses
//! whose fingerprint matches one of those samples are soft 404s. Samples are
//! kept per directory: what `/` answers for missing names says nothing about
//! `/admin/`.

use super::{Heuristic, HeuristicChain};
use crate::engine::Engine;
use crate::entry::{Entry, ProbeKind, Special};
use crate::error::RequestError;
use crate::fingerprint::Fingerprint;
use crate::singleflight::SingleFlight;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Url;
use std::sync::Arc;
use uuid::Uuid;

pub const TOMCAT_MARKER: &str = "Apache Tomcat/";

/// Suffixes appended to the random sample names.
pub const SAMPLE_EXTENSIONS: [&str; 5] = ["", ".html", ".php", ".asp", ".aspx"];

/// What "not found" looks like in one directory.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub fingerprints: Vec<Fingerprint>,
}

impl Sample {
    pub fn matches(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.iter().any(|s| s.matches(fingerprint))
    }
}

pub struct DetectSoft404 {
    engine: Arc<Engine>,
    child: HeuristicChain,
    sample_len: usize,
    samples: SingleFlight<Arc<Sample>>,
}

impl DetectSoft404 {
    pub fn new(engine: Arc<Engine>, child: HeuristicChain, sample_len: usize) -> Self {
        Self {
            engine,
            child,
            sample_len,
            samples: SingleFlight::new(),
        }
    }

    /// Sample for a directory URL (with trailing `/`), collecting it on first
    /// use. Concurrent first uses share one sampling round.
    pub async fn sample(&self, directory: &str) -> Arc<Sample> {
        self.samples
            .get_or_init(directory, || self.collect_sample(directory))
            .await
    }

    /// Number of directories sampled so far.
    pub async fn sampled_directories(&self) -> usize {
        self.samples.len().await
    }

    pub async fn has_sample(&self, directory: &str) -> bool {
        self.samples.get(directory).await.is_some()
    }

    async fn collect_sample(&self, directory: &str) -> Arc<Sample> {
        let name = Uuid::new_v4();
        let mut urls: Vec<String> = SAMPLE_EXTENSIONS
            .iter()
            .map(|ext| format!("{directory}{name}{ext}"))
            .collect();
        urls.push(format!("{directory}{}/", Uuid::new_v4()));

        let probes = urls
            .iter()
            .filter_map(|url| Url::parse(url).ok())
            .map(|url| self.engine.perform_high_priority(Entry::side(url), &self.child));

        let fingerprints = join_all(probes)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|entry| entry.response)
            .map(|response| Fingerprint::from_body(&response.raw, self.sample_len))
            .collect();

        Arc::new(Sample { fingerprints })
    }
}

#[async_trait]
impl Heuristic for DetectSoft404 {
    fn name(&self) -> &'static str {
        "detect_soft404"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if entry.kind == ProbeKind::Side {
            return Ok(());
        }
        let Some(response) = entry.response.as_ref() else {
            return Ok(());
        };

        if response.code == 404 && response.text().contains(TOMCAT_MARKER) {
            entry.result.special = Some(Special::TomcatRedirect);
            return Ok(());
        }

        let blank = response.is_blank();
        let fingerprint = Fingerprint::from_body(&response.raw, self.sample_len);
        let sample = self.sample(&entry.directory()).await;

        entry.result.soft404 = if blank {
            // Empty files are findings; empty directory listings are not.
            entry.kind == ProbeKind::Directory
        } else {
            sample.matches(&fingerprint)
        };
        Ok(())
    }
}

/// Rejects soft 404s, unless the candidate's needle matched.
///
/// Acts once the whole response phase is over so the needle check has run.
pub struct RejectSoft404;

#[async_trait]
impl Heuristic for RejectSoft404 {
    fn name(&self) -> &'static str {
        "reject_soft404"
    }

    async fn on_request_successful(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if entry.result.soft404 && !entry.result.string_match {
            Err(RequestError::reject("soft 404"))
        } else {
            Ok(())
        }
    }
}
