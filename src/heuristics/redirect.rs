use super::{Heuristic, HeuristicChain};
use crate::engine::Engine;
use crate::entry::{Entry, ProbeKind};
use crate::error::RequestError;
use crate::similarity::ratio;
use crate::singleflight::SingleFlight;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::sync::Arc;
use uuid::Uuid;

static NOT_FOUND_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)not[-_]*found").unwrap());
static DIGIT_RUN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Paths at most this similar are unrelated.
const REDIRECT_SIMILARITY: f64 = 0.8;

/// Absolute target of a redirect response, resolved against `base`.
pub fn redirect_target(base: &Url, location: &str) -> Option<Url> {
    base.join(location).ok()
}

/// Why a redirect from `source` to `target` points at an error page or
/// somewhere unrelated, if it does.
pub fn suspicious_redirect(source: &Url, target: &Url) -> Option<String> {
    let target_str = target.as_str();
    if DIGIT_RUN_REGEX
        .find_iter(target_str)
        .any(|m| m.as_str() == "404")
    {
        return Some(format!("redirects to error page {target_str}"));
    }
    if NOT_FOUND_REGEX.is_match(target_str) {
        return Some(format!("redirects to not-found page {target_str}"));
    }
    if ratio(source.path(), target.path()) <= REDIRECT_SIMILARITY {
        return Some(format!("redirects to unrelated {target_str}"));
    }
    None
}

/// Rejects redirects to error pages or to unrelated paths.
pub struct RedirectLimiter;

impl RedirectLimiter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RedirectLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Heuristic for RedirectLimiter {
    fn name(&self) -> &'static str {
        "redirect_limiter"
    }

    async fn after_headers(&self, entry: &mut Entry) -> Result<(), RequestError> {
        let Some(location) = entry
            .response
            .as_ref()
            .filter(|r| r.is_redirect())
            .and_then(|r| r.location())
        else {
            return Ok(());
        };
        let Some(target) = redirect_target(entry.url(), location) else {
            return Err(RequestError::reject(format!("invalid redirect {location}")));
        };
        match suspicious_redirect(entry.url(), &target) {
            Some(reason) => Err(RequestError::Rejected(reason)),
            None => Ok(()),
        }
    }
}

/// Follows up to `max_redirects` redirects for candidates that ask for it.
/// Each hop's response is kept in `redirects`; the final one replaces the
/// entry's response.
pub struct FollowRedirects {
    engine: Arc<Engine>,
    child: HeuristicChain,
    max_redirects: usize,
}

impl FollowRedirects {
    pub fn new(engine: Arc<Engine>, child: HeuristicChain, max_redirects: usize) -> Self {
        Self {
            engine,
            child,
            max_redirects,
        }
    }
}

#[async_trait]
impl Heuristic for FollowRedirects {
    fn name(&self) -> &'static str {
        "follow_redirects"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if !entry.candidate.handle_redirect {
            return Ok(());
        }
        let mut current_url = entry.url().clone();

        while entry.result.redirects.len() < self.max_redirects {
            let Some(location) = entry
                .response
                .as_ref()
                .filter(|r| r.is_redirect())
                .and_then(|r| r.location())
            else {
                break;
            };
            let Some(target) = redirect_target(&current_url, location) else {
                return Err(RequestError::reject(format!("invalid redirect {location}")));
            };
            if let Some(reason) = suspicious_redirect(&current_url, &target) {
                return Err(RequestError::Rejected(reason));
            }

            let next = match self
                .engine
                .perform_high_priority(Entry::side(target.clone()), &self.child)
                .await
            {
                Ok(next) => next,
                Err(RequestError::Cancelled) => return Err(RequestError::Cancelled),
                Err(err) => return Err(RequestError::reject(format!("redirect failed: {err}"))),
            };

            let mut predecessor =
                Entry::new(current_url.clone(), entry.candidate.clone(), entry.kind);
            predecessor.response = entry.response.take();
            entry.result.redirects.push(predecessor);
            entry.response = next.response;
            current_url = target;
        }
        Ok(())
    }
}

/// Rejects redirects that a random name in the same directory gets as well.
pub struct RejectCatchAllRedirect {
    engine: Arc<Engine>,
    child: HeuristicChain,
    probes: SingleFlight<Option<String>>,
}

impl RejectCatchAllRedirect {
    pub fn new(engine: Arc<Engine>, child: HeuristicChain) -> Self {
        Self {
            engine,
            child,
            probes: SingleFlight::new(),
        }
    }

    /// Where a random name in `directory` redirects to, with the name blanked.
    async fn probe(&self, directory: String, kind: ProbeKind) -> Option<String> {
        let name = Uuid::new_v4().to_string();
        let suffix = if kind == ProbeKind::Directory { "/" } else { "" };
        let url = Url::parse(&format!("{directory}{name}{suffix}")).ok()?;
        let probe = self
            .engine
            .perform_high_priority(Entry::side(url.clone()), &self.child)
            .await
            .ok()?;
        let location = probe
            .response
            .as_ref()
            .filter(|r| r.is_redirect())
            .and_then(|r| r.location())?;
        let target = redirect_target(&url, location)?;
        Some(blank_name(&target, &name))
    }
}

/// `url` as a string with every path or query segment equal to `name`
/// emptied. Scheme and host are left alone.
pub fn blank_name(url: &Url, name: &str) -> String {
    const SEPARATORS: [char; 3] = ['/', '=', '&'];
    let blank = |part: &str| -> String {
        part.split_inclusive(SEPARATORS)
            .map(|piece| {
                let segment = piece.trim_end_matches(SEPARATORS);
                if segment == name {
                    &piece[segment.len()..]
                } else {
                    piece
                }
            })
            .collect()
    };

    let mut blanked = url.clone();
    blanked.set_path(&blank(url.path()));
    if let Some(query) = url.query() {
        blanked.set_query(Some(&blank(query)));
    }
    blanked.to_string()
}

/// Last path segment of a URL, trailing slash ignored.
fn last_segment(url: &Url) -> &str {
    url.path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

#[async_trait]
impl Heuristic for RejectCatchAllRedirect {
    fn name(&self) -> &'static str {
        "reject_catch_all_redirect"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if entry.kind == ProbeKind::Side {
            return Ok(());
        }
        let first_hop = entry
            .result
            .redirects
            .first()
            .and_then(|e| e.response.as_ref())
            .or(entry.response.as_ref())
            .filter(|r| r.is_redirect())
            .and_then(|r| r.location())
            .and_then(|location| redirect_target(entry.url(), location));
        let Some(target) = first_hop else {
            return Ok(());
        };

        let key = format!("{}|{:?}", entry.directory(), entry.kind);
        let directory = entry.directory();
        let kind = entry.kind;
        let probe = self
            .probes
            .get_or_init(&key, || self.probe(directory, kind))
            .await;
        let Some(probe_target) = probe else {
            return Ok(());
        };

        let segment = last_segment(entry.url());
        let real_target = if segment.is_empty() {
            target.as_str().to_string()
        } else {
            blank_name(&target, segment)
        };
        if real_target == probe_target || ratio(&real_target, &probe_target) > REDIRECT_SIMILARITY {
            Err(RequestError::reject(format!(
                "catch-all redirect to {target}"
            )))
        } else {
            Ok(())
        }
    }
}
