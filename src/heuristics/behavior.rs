use super::Heuristic;
use crate::entry::{Entry, ProbeKind};
use crate::error::RequestError;
use crate::fingerprint::Fingerprint;
use crate::output::Reporter;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Responses that RejectSoft404 will drop later in the chain. They say
/// nothing about how the server treats real requests.
fn soft404_rejection(entry: &Entry) -> bool {
    entry.result.soft404 && !entry.result.string_match
}

/// Flags entries received while the server answers everything the same way
/// (rate limiting, a WAF block page). Only responses that survive the
/// rejecting heuristics are buffered.
pub struct DetectBehaviorChange {
    buffer: Mutex<VecDeque<Fingerprint>>,
    buffer_size: usize,
    similarity: f64,
    sample_len: usize,
}

impl DetectBehaviorChange {
    pub fn new(buffer_size: usize, similarity: f64, sample_len: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(buffer_size)),
            buffer_size: buffer_size.max(1),
            similarity,
            sample_len,
        }
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[async_trait]
impl Heuristic for DetectBehaviorChange {
    fn name(&self) -> &'static str {
        "detect_behavior_change"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if entry.kind == ProbeKind::Side || soft404_rejection(entry) {
            return Ok(());
        }
        let Some(response) = entry.response.as_ref() else {
            return Ok(());
        };
        let fingerprint = Fingerprint::from_body(&response.raw, self.sample_len);

        let mut buffer = self.buffer.lock().await;
        let uniform = buffer
            .iter()
            .all(|previous| fingerprint.similarity(previous) > self.similarity);

        if !uniform {
            buffer.clear();
        } else if buffer.len() >= self.buffer_size {
            entry.result.error_behavior = true;
        }

        buffer.push_back(fingerprint);
        while buffer.len() > self.buffer_size {
            buffer.pop_front();
        }
        Ok(())
    }
}

/// Announces transitions into and out of uniform behavior, once each.
pub struct LogBehaviorChange {
    reporter: Arc<Reporter>,
    in_error: AtomicBool,
}

impl LogBehaviorChange {
    pub fn new(reporter: Arc<Reporter>) -> Self {
        Self {
            reporter,
            in_error: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Heuristic for LogBehaviorChange {
    fn name(&self) -> &'static str {
        "log_behavior_change"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if entry.kind == ProbeKind::Side || soft404_rejection(entry) {
            return Ok(());
        }
        let flagged = entry.result.error_behavior;
        let was_flagged = self.in_error.swap(flagged, Ordering::Relaxed);
        if flagged && !was_flagged {
            self.reporter.info(
                "The server started answering every request the same way, results may be unreliable",
            );
        } else if !flagged && was_flagged {
            self.reporter.info("Normal server behavior seems to be restored");
        }
        Ok(())
    }
}
