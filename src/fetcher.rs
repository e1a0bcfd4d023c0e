//! Directory and file fetchers: drive the engine over a batch of candidates
//! and turn surviving entries into findings.

use crate::candidate::Candidate;
use crate::entry::{Entry, ProbeKind, Special};
use crate::error::{RequestError, ScanError};
use crate::output::FoundEvent;
use crate::scanner::ScanContext;
use futures::{StreamExt, stream};
use reqwest::Url;
use std::collections::HashMap;

/// What became of one candidate.
#[derive(Debug)]
enum Outcome {
    Found {
        event: FoundEvent,
        valid: Option<Candidate>,
    },
    /// Received during uniform server behavior; try again later.
    Requeue(Candidate),
    Dropped,
}

fn found_event(entry: &Entry, code: u16, prefix: &str) -> FoundEvent {
    FoundEvent {
        description: entry.candidate.description.clone(),
        url: entry.url().to_string(),
        code,
        severity: entry.candidate.severity,
        special: entry.result.special,
        prefix: prefix.to_string(),
    }
}

fn classify_directory(entry: &Entry) -> Outcome {
    let Some(response) = entry.response.as_ref() else {
        return Outcome::Dropped;
    };
    if response.is_redirect() {
        return Outcome::Dropped;
    }
    let prefix = match (response.code, entry.result.special) {
        (401, _) => "Password Protected - ",
        (403, _) => "*Forbidden* ",
        (500, _) => "ISE, ",
        (404, Some(Special::TomcatRedirect)) => "Tomcat redirect, ",
        _ => "",
    };
    // Password-protected directories are reported, not recursed into.
    let valid = (response.code != 401).then(|| entry.candidate.clone());
    Outcome::Found {
        event: found_event(entry, response.code, prefix),
        valid,
    }
}

fn classify_file(entry: &Entry) -> Outcome {
    let Some(response) = entry.response.as_ref() else {
        return Outcome::Dropped;
    };
    if response.is_redirect() || matches!(response.code, 404 | 502) {
        return Outcome::Dropped;
    }
    let prefix = match response.code {
        200 if response.is_blank() => "Empty ",
        500 => "ISE, ",
        _ => "",
    };
    Outcome::Found {
        event: found_event(entry, response.code, prefix),
        valid: None,
    }
}

async fn probe(ctx: &ScanContext, candidate: Candidate, kind: ProbeKind) -> Result<Outcome, ScanError> {
    let target = &ctx.config.target;
    let raw_url = match kind {
        ProbeKind::Directory => target.directory_url(&candidate.url),
        _ => target.file_url(&candidate.url),
    };
    let url = match Url::parse(&raw_url) {
        Ok(url) => url,
        Err(e) => {
            ctx.reporter.debug(&format!("Skipping {raw_url}: {e}"));
            return Ok(Outcome::Dropped);
        }
    };

    match ctx.engine.perform(Entry::new(url, candidate, kind), &ctx.chain).await {
        Ok(entry) => {
            if entry.result.error_behavior && !entry.result.string_match {
                return Ok(Outcome::Requeue(entry.candidate));
            }
            Ok(match kind {
                ProbeKind::Directory => classify_directory(&entry),
                _ => classify_file(&entry),
            })
        }
        Err(RequestError::HostUnreachable(host)) => Err(ScanError::HostUnreachable(host)),
        Err(err @ RequestError::Exhausted { .. }) => {
            ctx.reporter.timeout(&err.to_string());
            Ok(Outcome::Dropped)
        }
        Err(err) => {
            ctx.reporter.debug(&format!("{raw_url}: {err}"));
            Ok(Outcome::Dropped)
        }
    }
}

/// Probes a batch concurrently, re-queuing candidates flagged during uniform
/// server behavior for up to `max_behavior_tries` extra rounds. Returns the
/// candidates that qualify as valid directories.
async fn run_batch(
    ctx: &ScanContext,
    candidates: Vec<Candidate>,
    kind: ProbeKind,
    label: &str,
) -> Result<Vec<Candidate>, ScanError> {
    let mut pending = candidates;
    let mut requeues: HashMap<String, usize> = HashMap::new();
    let mut valid = Vec::new();

    while !pending.is_empty() && !ctx.engine.cancel_signal().is_cancelled() {
        let progress = ctx.reporter.start_progress(pending.len(), label);
        let mut outcomes = stream::iter(
            pending
                .into_iter()
                .map(|candidate| probe(ctx, candidate, kind)),
        )
        .buffer_unordered(ctx.config.workers);

        let mut requeued = Vec::new();
        let mut fatal = None;
        while let Some(outcome) = outcomes.next().await {
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            match outcome {
                Ok(Outcome::Found { event, valid: dir }) => {
                    ctx.reporter.found(event);
                    valid.extend(dir);
                }
                Ok(Outcome::Requeue(candidate)) => {
                    let count = requeues.entry(candidate.url.clone()).or_insert(0);
                    *count += 1;
                    if *count <= ctx.config.max_behavior_tries {
                        requeued.push(candidate);
                    } else {
                        ctx.reporter.debug(&format!(
                            "Abandoning {} after {} tries during uniform server behavior",
                            candidate.url, count
                        ));
                    }
                }
                Ok(Outcome::Dropped) => {}
                Err(err) => {
                    fatal = Some(err);
                    break;
                }
            }
        }
        drop(outcomes);
        ctx.reporter.finish_progress();

        if let Some(err) = fatal {
            return Err(err);
        }
        pending = requeued;
    }

    Ok(valid)
}

pub struct DirectoryFetcher<'a> {
    ctx: &'a ScanContext,
}

impl<'a> DirectoryFetcher<'a> {
    pub fn new(ctx: &'a ScanContext) -> Self {
        Self { ctx }
    }

    /// Probes directory candidates; returns those that are valid paths.
    pub async fn fetch(&self, candidates: Vec<Candidate>) -> Result<Vec<Candidate>, ScanError> {
        run_batch(self.ctx, candidates, ProbeKind::Directory, "Probing paths").await
    }
}

pub struct FileFetcher<'a> {
    ctx: &'a ScanContext,
}

impl<'a> FileFetcher<'a> {
    pub fn new(ctx: &'a ScanContext) -> Self {
        Self { ctx }
    }

    /// Probes file candidates, reporting the ones that exist.
    pub async fn fetch(&self, candidates: Vec<Candidate>) -> Result<(), ScanError> {
        run_batch(self.ctx, candidates, ProbeKind::File, "Probing files").await?;
        Ok(())
    }
}
