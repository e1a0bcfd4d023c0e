//! Hooks that run around every request.
//!
//! A heuristic may rewrite the entry, annotate it, reject it for good
//! ([`RequestError::Rejected`]) or stop it for a retry
//! ([`RequestError::Stopped`]). Hooks of one phase run in registration order
//! before any hook of the next phase.
//!
//! Heuristics that need side-requests (redirect following, soft-404
//! sampling, query probing) hold the engine and a child chain of their own,
//! so a side-request never runs the heuristic that issued it.

mod behavior;
mod filters;
mod har;
mod query;
mod redirect;
mod soft404;
mod timeout;

pub use behavior::{DetectBehaviorChange, LogBehaviorChange};
pub use filters::{FilterRequestFromURL, IgnoreLargeBody, MatchString, RejectStatusCode, SetHeader};
pub use har::{HarDocument, StoreHar};
pub use query::RejectIgnoredQuery;
pub use redirect::{
    FollowRedirects, RedirectLimiter, RejectCatchAllRedirect, blank_name, redirect_target,
    suspicious_redirect,
};
pub use soft404::{DetectSoft404, RejectSoft404, SAMPLE_EXTENSIONS, Sample, TOMCAT_MARKER};
pub use timeout::{DeadHostDetection, DynamicTimeout};

use crate::config::{REJECTED_STATUS_CODES, ScanConfig};
use crate::engine::Engine;
use crate::entry::Entry;
use crate::error::RequestError;
use crate::output::Reporter;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Heuristic: Send + Sync {
    fn name(&self) -> &'static str;

    async fn before_request(&self, _entry: &mut Entry) -> Result<(), RequestError> {
        Ok(())
    }

    async fn after_headers(&self, _entry: &mut Entry) -> Result<(), RequestError> {
        Ok(())
    }

    async fn after_response(&self, _entry: &mut Entry) -> Result<(), RequestError> {
        Ok(())
    }

    async fn on_request_successful(&self, _entry: &mut Entry) -> Result<(), RequestError> {
        Ok(())
    }

    /// Runs after a transient failure, before the retry decision.
    async fn on_timeout(&self, _entry: &mut Entry) -> Result<(), RequestError> {
        Ok(())
    }

    async fn on_host_unreachable(&self, _host: &str) {}
}

/// Ordered list of heuristics.
#[derive(Clone, Default)]
pub struct HeuristicChain {
    heuristics: Vec<Arc<dyn Heuristic>>,
}

impl HeuristicChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, heuristic: Arc<dyn Heuristic>) {
        self.heuristics.push(heuristic);
    }

    pub fn with(mut self, heuristic: Arc<dyn Heuristic>) -> Self {
        self.add(heuristic);
        self
    }

    pub fn len(&self) -> usize {
        self.heuristics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heuristics.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.heuristics.iter().map(|h| h.name()).collect()
    }

    pub async fn before_request(&self, entry: &mut Entry) -> Result<(), RequestError> {
        for heuristic in &self.heuristics {
            heuristic.before_request(entry).await?;
        }
        Ok(())
    }

    pub async fn after_headers(&self, entry: &mut Entry) -> Result<(), RequestError> {
        for heuristic in &self.heuristics {
            heuristic.after_headers(entry).await?;
        }
        Ok(())
    }

    pub async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        for heuristic in &self.heuristics {
            heuristic.after_response(entry).await?;
        }
        Ok(())
    }

    pub async fn on_request_successful(&self, entry: &mut Entry) -> Result<(), RequestError> {
        for heuristic in &self.heuristics {
            heuristic.on_request_successful(entry).await?;
        }
        Ok(())
    }

    pub async fn on_timeout(&self, entry: &mut Entry) -> Result<(), RequestError> {
        for heuristic in &self.heuristics {
            heuristic.on_timeout(entry).await?;
        }
        Ok(())
    }

    pub async fn on_host_unreachable(&self, host: &str) {
        for heuristic in &self.heuristics {
            heuristic.on_host_unreachable(host).await;
        }
    }
}

/// Chain for side-requests: host filtering, the body cap and header setting.
pub fn side_chain(config: &ScanConfig) -> HeuristicChain {
    HeuristicChain::new()
        .with(Arc::new(FilterRequestFromURL::new(config.allowed_hosts())))
        .with(Arc::new(IgnoreLargeBody::new(config.max_body)))
        .with(Arc::new(SetHeader::from_config(config)))
}

/// Builds the scan's main chain in its fixed order. `soft404` is passed in
/// so the caller can reach its samples.
pub fn build_chain(
    engine: &Arc<Engine>,
    config: &ScanConfig,
    reporter: &Arc<Reporter>,
    soft404: Arc<DetectSoft404>,
) -> HeuristicChain {
    let child = side_chain(config);

    let mut chain = HeuristicChain::new()
        .with(Arc::new(DynamicTimeout::new(
            config.timeout_min,
            config.timeout_initial,
            config.timeout_max,
        )))
        .with(Arc::new(RedirectLimiter::new()))
        .with(Arc::new(FollowRedirects::new(
            engine.clone(),
            child.clone(),
            config.max_redirects,
        )))
        .with(Arc::new(RejectCatchAllRedirect::new(
            engine.clone(),
            child.clone(),
        )))
        .with(Arc::new(FilterRequestFromURL::new(config.allowed_hosts())))
        .with(Arc::new(IgnoreLargeBody::new(config.max_body)))
        .with(Arc::new(DeadHostDetection::new(
            config.dead_host_threshold,
            reporter.clone(),
        )))
        .with(Arc::new(RejectStatusCode::new(REJECTED_STATUS_CODES)))
        .with(soft404)
        .with(Arc::new(RejectSoft404))
        .with(Arc::new(MatchString))
        .with(Arc::new(DetectBehaviorChange::new(
            config.behavior_buffer_size,
            config.behavior_similarity,
            config.file_sample_len,
        )))
        .with(Arc::new(LogBehaviorChange::new(reporter.clone())))
        .with(Arc::new(RejectIgnoredQuery::new(
            engine.clone(),
            child,
            config.file_sample_len,
        )))
        .with(Arc::new(SetHeader::from_config(config)));

    if let Some(dir) = &config.har_dir {
        chain.add(Arc::new(StoreHar::new(dir.clone(), reporter.clone())));
    }

    chain
}
