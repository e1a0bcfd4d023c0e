use super::Heuristic;
use crate::entry::Entry;
use crate::error::RequestError;
use crate::output::Reporter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Per-host request deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutState {
    pub current: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl TimeoutState {
    fn on_timeout(&mut self) {
        self.current = (self.current * 2).min(self.max);
    }

    /// Low-pass filter toward a few round-trips' worth of time.
    fn observe(&mut self, round_trip: Duration) {
        let target = (round_trip * 3).clamp(self.min, self.max);
        self.current = (self.current.mul_f64(0.8) + target.mul_f64(0.2)).clamp(self.min, self.max);
    }
}

/// Adapts each host's request deadline to its observed latency, doubling it
/// after a timeout.
pub struct DynamicTimeout {
    min: Duration,
    initial: Duration,
    max: Duration,
    hosts: Mutex<HashMap<String, TimeoutState>>,
}

impl DynamicTimeout {
    pub fn new(min: Duration, initial: Duration, max: Duration) -> Self {
        Self {
            min,
            initial: initial.clamp(min, max),
            max,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn fresh_state(&self) -> TimeoutState {
        TimeoutState {
            current: self.initial,
            min: self.min,
            max: self.max,
        }
    }

    /// Current deadline for a `host:port` key.
    pub async fn current(&self, host: &str) -> Duration {
        let hosts = self.hosts.lock().await;
        hosts.get(host).map_or(self.initial, |state| state.current)
    }
}

#[async_trait]
impl Heuristic for DynamicTimeout {
    fn name(&self) -> &'static str {
        "dynamic_timeout"
    }

    async fn before_request(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let mut hosts = self.hosts.lock().await;
        let state = hosts
            .entry(entry.host())
            .or_insert_with(|| self.fresh_state());
        entry.request.timeout = Some(state.current);
        Ok(())
    }

    /// Observes the network round-trip only, not time spent in side-requests
    /// issued by later heuristics.
    async fn on_request_successful(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if let Some(response) = entry.response.as_ref() {
            let mut hosts = self.hosts.lock().await;
            hosts
                .entry(entry.host())
                .or_insert_with(|| self.fresh_state())
                .observe(response.elapsed);
        }
        Ok(())
    }

    async fn on_timeout(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(entry.host())
            .or_insert_with(|| self.fresh_state())
            .on_timeout();
        Ok(())
    }
}

/// Gives up on a host after too many consecutive failed requests.
pub struct DeadHostDetection {
    threshold: usize,
    failures: Mutex<HashMap<String, usize>>,
    reporter: Arc<Reporter>,
    reported: AtomicBool,
}

impl DeadHostDetection {
    pub fn new(threshold: usize, reporter: Arc<Reporter>) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: Mutex::new(HashMap::new()),
            reporter,
            reported: AtomicBool::new(false),
        }
    }

    pub async fn failures(&self, host: &str) -> usize {
        let failures = self.failures.lock().await;
        failures.get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Heuristic for DeadHostDetection {
    fn name(&self) -> &'static str {
        "dead_host_detection"
    }

    // Any response at all proves the host alive, even one rejected later.
    async fn after_headers(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let mut failures = self.failures.lock().await;
        failures.insert(entry.host(), 0);
        Ok(())
    }

    async fn on_timeout(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let host = entry.host();
        let mut failures = self.failures.lock().await;
        let count = failures.entry(host.clone()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            return Err(RequestError::HostUnreachable(host));
        }
        Ok(())
    }

    async fn on_host_unreachable(&self, host: &str) {
        if !self.reported.swap(true, Ordering::Relaxed) {
            self.reporter.error(&format!(
                "{host} failed {} consecutive requests, considering it unreachable",
                self.threshold
            ));
        }
    }
}
