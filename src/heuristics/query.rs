use super::{Heuristic, HeuristicChain};
use crate::engine::Engine;
use crate::entry::{Entry, ProbeKind};
use crate::error::RequestError;
use crate::fingerprint::Fingerprint;
use crate::singleflight::SingleFlight;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Rejects responses from endpoints that ignore their query string.
///
/// The first time a path is seen with a query, it is requested once more with
/// a random query; any later response to that path that looks the same as
/// the random-query response carries no information.
pub struct RejectIgnoredQuery {
    engine: Arc<Engine>,
    child: HeuristicChain,
    sample_len: usize,
    references: SingleFlight<Option<Fingerprint>>,
}

impl RejectIgnoredQuery {
    pub fn new(engine: Arc<Engine>, child: HeuristicChain, sample_len: usize) -> Self {
        Self {
            engine,
            child,
            sample_len,
            references: SingleFlight::new(),
        }
    }

    async fn reference(&self, entry: &Entry) -> Option<Fingerprint> {
        let mut url = entry.url().clone();
        url.set_query(Some(&Uuid::new_v4().to_string()));
        let response = self
            .engine
            .perform_high_priority(Entry::side(url), &self.child)
            .await
            .ok()?
            .response?;
        Some(Fingerprint::from_body(&response.raw, self.sample_len))
    }
}

#[async_trait]
impl Heuristic for RejectIgnoredQuery {
    fn name(&self) -> &'static str {
        "reject_ignored_query"
    }

    async fn after_response(&self, entry: &mut Entry) -> Result<(), RequestError> {
        if entry.kind == ProbeKind::Side || entry.url().query().is_none_or(str::is_empty) {
            return Ok(());
        }
        // A matched marker string proves the response is real.
        if entry.result.string_match {
            return Ok(());
        }
        let entry: &Entry = entry;
        let Some(response) = entry.response.as_ref() else {
            return Ok(());
        };

        let mut without_query = entry.url().clone();
        without_query.set_query(None);
        let key = without_query.to_string();

        let reference = self
            .references
            .get_or_init(&key, || self.reference(entry))
            .await;
        let fingerprint = Fingerprint::from_body(&response.raw, self.sample_len);

        match reference {
            Some(reference) if reference.matches(&fingerprint) => {
                Err(RequestError::reject("query string is ignored"))
            }
            _ => Ok(()),
        }
    }
}
