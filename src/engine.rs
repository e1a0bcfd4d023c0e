//! The request engine: the only component that talks to the network.
//!
//! Every request runs the heuristic chain around it. Transient failures are
//! retried up to the configured attempt budget; rejections are final.

use crate::config::ScanConfig;
use crate::entry::{Entry, Response};
use crate::error::{RequestError, ScanError};
use crate::heuristics::HeuristicChain;
use rand::Rng;
use reqwest::{Client, Proxy, redirect};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};

/// Scan-wide cancellation flag that in-flight requests can await.
pub struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelSignal::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the scan's HTTP client: no automatic redirects, invalid
/// certificates accepted, keep-alive pool sized to the worker count.
pub fn build_client(config: &ScanConfig) -> Result<Client, ScanError> {
    let mut builder = Client::builder()
        .timeout(config.timeout_max)
        .connect_timeout(config.timeout_max)
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(config.workers)
        .redirect(redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .user_agent(config.user_agent.as_str());

    // A supplied cookie replaces the jar.
    if config.cookies.is_none() {
        builder = builder.cookie_store(true);
    }

    // Only an explicit proxy is used; environment proxies are ignored.
    builder = match &config.proxy {
        Some(proxy_url) => builder.proxy(Proxy::all(proxy_url)?),
        None => builder.no_proxy(),
    };

    if let Some(addr) = config.target.addr {
        builder = builder.resolve(&config.target.host, addr);
    }

    Ok(builder.build()?)
}

pub struct Engine {
    client: Client,
    retry_count: usize,
    max_body: usize,
    cancel: Arc<CancelSignal>,
}

impl Engine {
    pub fn new(client: Client, config: &ScanConfig, cancel: Arc<CancelSignal>) -> Self {
        Self {
            client,
            retry_count: config.retry_count.max(1),
            max_body: config.max_body,
            cancel,
        }
    }

    pub fn cancel_signal(&self) -> &Arc<CancelSignal> {
        &self.cancel
    }

    /// Sends the entry's request through `chain`, retrying transient failures.
    ///
    /// Hooks run as before_request, after_headers, after_response,
    /// on_request_successful. On a transient failure `on_timeout` runs; if
    /// that reports the host unreachable, `on_host_unreachable` runs and the
    /// error is returned.
    pub async fn perform(
        &self,
        mut entry: Entry,
        chain: &HeuristicChain,
    ) -> Result<Entry, RequestError> {
        let mut reason = String::from("no attempt made");

        while entry.attempts < self.retry_count {
            if self.cancel.is_cancelled() {
                return Err(RequestError::Cancelled);
            }
            entry.reset();
            entry.attempts += 1;

            let outcome = tokio::select! {
                outcome = self.attempt(&mut entry, chain) => outcome,
                _ = self.cancel.cancelled() => return Err(RequestError::Cancelled),
            };

            match outcome {
                Ok(()) => return Ok(entry),
                Err(RequestError::Stopped(why)) => {
                    reason = why;
                    if let Err(err) = chain.on_timeout(&mut entry).await {
                        if let RequestError::HostUnreachable(host) = &err {
                            chain.on_host_unreachable(host).await;
                        }
                        return Err(err);
                    }
                    if entry.attempts < self.retry_count {
                        let backoff = {
                            let mut rng = rand::rng();
                            100 * entry.attempts as u64 + rng.random_range(0..100)
                        };
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(RequestError::Exhausted {
            url: entry.url().to_string(),
            attempts: entry.attempts,
            reason,
        })
    }

    /// Entry point for side-requests issued from inside a heuristic. The
    /// caller passes its own child chain so it is never re-entered itself.
    pub async fn perform_high_priority(
        &self,
        entry: Entry,
        chain: &HeuristicChain,
    ) -> Result<Entry, RequestError> {
        self.perform(entry, chain).await
    }

    async fn attempt(&self, entry: &mut Entry, chain: &HeuristicChain) -> Result<(), RequestError> {
        chain.before_request(entry).await?;

        let mut request = self
            .client
            .request(entry.request.method.clone(), entry.request.url.clone())
            .headers(entry.request.headers.clone());
        if let Some(timeout) = entry.request.timeout {
            request = request.timeout(timeout);
        }

        let started = Instant::now();
        let mut response = request
            .send()
            .await
            .map_err(|e| RequestError::from_transport(&e))?;

        entry.response = Some(Response::new(
            response.status().as_u16(),
            response.headers().clone(),
        ));
        chain.after_headers(entry).await?;

        let raw = read_body(&mut response, self.max_body).await?;
        if let Some(resp) = entry.response.as_mut() {
            resp.set_body(raw);
            resp.elapsed = started.elapsed();
        }

        chain.after_response(entry).await?;
        chain.on_request_successful(entry).await
    }
}

/// Streams the body until `cap` bytes or the end, whichever comes first.
async fn read_body(response: &mut reqwest::Response, cap: usize) -> Result<Vec<u8>, RequestError> {
    let mut body = Vec::new();
    while body.len() < cap {
        match response
            .chunk()
            .await
            .map_err(|e| RequestError::from_transport(&e))?
        {
            Some(chunk) => body.extend_from_slice(&chunk),
            None => break,
        }
    }
    body.truncate(cap);
    Ok(body)
}
