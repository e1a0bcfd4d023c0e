//! The discovery orchestrator.
//!
//! Runs the scan as a fixed sequence of phases: load dictionaries and set up
//! the engine, let plugins contribute candidates, probe directories (in
//! recursive rounds when asked to), expand valid directories into file
//! candidates, probe those, and flush the results. The reporter is flushed on
//! every way out, including host-unreachable aborts and interrupts.

use crate::candidate::Candidate;
use crate::config::ScanConfig;
use crate::engine::{CancelSignal, Engine, build_client};
use crate::entry::Entry;
use crate::error::ScanError;
use crate::fetcher::{DirectoryFetcher, FileFetcher};
use crate::generator::{FileGenerator, PathGenerator, SeenSet};
use crate::heuristics::{DetectSoft404, HeuristicChain, build_chain, side_chain};
use crate::output::{FoundEvent, Reporter};
use crate::parser::{Dictionary, load_dictionary};
use crate::plugins::{Plugin, PluginContext, default_plugins};
use reqwest::Url;
use std::path::Path;
use std::sync::Arc;

/// Scan-scoped state shared by the fetchers and plugins.
pub struct ScanContext {
    pub config: Arc<ScanConfig>,
    pub engine: Arc<Engine>,
    pub chain: HeuristicChain,
    pub soft404: Arc<DetectSoft404>,
    pub reporter: Arc<Reporter>,
}

impl ScanContext {
    pub fn new(
        config: ScanConfig,
        reporter: Arc<Reporter>,
        cancel: Arc<CancelSignal>,
    ) -> Result<Self, ScanError> {
        let client = build_client(&config)?;
        let engine = Arc::new(Engine::new(client, &config, cancel));
        let soft404 = Arc::new(DetectSoft404::new(
            engine.clone(),
            side_chain(&config),
            config.file_sample_len,
        ));
        let chain = build_chain(&engine, &config, &reporter, soft404.clone());
        Ok(Self {
            config: Arc::new(config),
            engine,
            chain,
            soft404,
            reporter,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.engine.cancel_signal().is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    BootstrapPlugins,
    ProbeDirectories,
    ExpandFiles,
    ProbeFiles,
    Finalize,
}

/// What a finished scan leaves behind.
#[derive(Debug, Default)]
pub struct ScanSummary {
    /// Valid directories, root first.
    pub valid_paths: Vec<Candidate>,
    pub findings: Vec<FoundEvent>,
    /// Phases entered, in order.
    pub phases: Vec<Phase>,
    pub cancelled: bool,
}

impl ScanSummary {
    pub fn valid_urls(&self) -> Vec<&str> {
        self.valid_paths.iter().map(|c| c.url.as_str()).collect()
    }
}

pub struct Scanner {
    config: ScanConfig,
    reporter: Arc<Reporter>,
    cancel: Arc<CancelSignal>,
    plugins: Vec<Box<dyn Plugin>>,
}

/// Working state carried between phases.
#[derive(Default)]
struct Progress {
    paths: Vec<Candidate>,
    files: Vec<Candidate>,
    contributed: Vec<Candidate>,
    valid: Vec<Candidate>,
    seen: SeenSet,
    file_candidates: Vec<Candidate>,
}

impl Scanner {
    pub fn new(config: ScanConfig, reporter: Arc<Reporter>, cancel: Arc<CancelSignal>) -> Self {
        Self {
            config,
            reporter,
            cancel,
            plugins: default_plugins(),
        }
    }

    /// Replaces the default plugin set.
    pub fn with_plugins(mut self, plugins: Vec<Box<dyn Plugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub async fn run(self) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary::default();
        let mut progress = Progress {
            valid: vec![Candidate::root()],
            ..Default::default()
        };

        let outcome = self.run_phases(&mut progress, &mut summary).await;
        self.reporter.flush();

        summary.valid_paths = progress.valid;
        summary.findings = self.reporter.findings();
        summary.cancelled = self.cancel.is_cancelled();
        outcome.map(|()| summary)
    }

    async fn run_phases(
        &self,
        progress: &mut Progress,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        summary.phases.push(Phase::Start);
        let ctx = self.start(progress).await?;

        let mut phase = Phase::BootstrapPlugins;
        loop {
            summary.phases.push(phase);
            let next = match phase {
                Phase::Start | Phase::Finalize => return Ok(()),
                Phase::BootstrapPlugins => self.bootstrap_plugins(&ctx, progress).await,
                Phase::ProbeDirectories => self.probe_directories(&ctx, progress).await?,
                Phase::ExpandFiles => self.expand_files(&ctx, progress).await,
                Phase::ProbeFiles => self.probe_files(&ctx, progress).await?,
            };
            phase = if self.cancel.is_cancelled() {
                self.reporter.warning("Scan interrupted");
                Phase::Finalize
            } else {
                next
            };
        }
    }

    fn load(&self, path: &Path, kind: &str) -> Result<Dictionary, ScanError> {
        let dictionary = load_dictionary(path)?;
        for skipped in &dictionary.skipped {
            self.reporter
                .warning(&format!("Skipping malformed {kind} entry ({skipped})"));
        }
        self.reporter.debug(&format!(
            "Loaded {} {kind} entries from {}",
            dictionary.candidates.len(),
            path.display()
        ));
        Ok(dictionary)
    }

    async fn start(&self, progress: &mut Progress) -> Result<ScanContext, ScanError> {
        progress.paths = self.load(&self.config.path_dict, "path")?.candidates;
        progress.files = self.load(&self.config.file_dict, "file")?.candidates;

        let mut config = self.config.clone();
        let addr = config.target.resolve().await?;
        self.reporter
            .info(&format!("Scanning {} ({addr})", config.target.base_url()));

        let ctx = ScanContext::new(config, self.reporter.clone(), self.cancel.clone())?;
        if ctx.config.cookies.is_none() {
            harvest_session_cookie(&ctx).await;
        }
        Ok(ctx)
    }

    async fn bootstrap_plugins(&self, ctx: &ScanContext, progress: &mut Progress) -> Phase {
        for plugin in &self.plugins {
            let options = ctx
                .config
                .plugin_options
                .get(plugin.name())
                .map(Vec::as_slice)
                .unwrap_or_default();
            self.reporter
                .debug(&format!("Running plugin {} {options:?}", plugin.name()));
            let contributed = plugin.run(&PluginContext { scan: ctx, options }).await;
            progress.contributed.extend(contributed);
        }

        if self.config.plugins_only {
            Phase::Finalize
        } else if self.config.files_only {
            Phase::ExpandFiles
        } else {
            Phase::ProbeDirectories
        }
    }

    async fn probe_directories(
        &self,
        ctx: &ScanContext,
        progress: &mut Progress,
    ) -> Result<Phase, ScanError> {
        let mut generator = PathGenerator::new(
            progress.paths.clone(),
            progress.files.clone(),
            self.config.file_as_path,
        );
        let mut seen = std::mem::take(&mut progress.seen);
        let mut valid = std::mem::take(&mut progress.valid);

        let mut batch: Vec<Candidate> = progress
            .contributed
            .iter()
            .filter(|c| !c.is_root() && seen.insert(&c.url))
            .cloned()
            .collect();
        batch.extend(generator.generate(&valid, &mut seen));

        let mut depth = 0;
        let outcome = loop {
            if batch.is_empty() || ctx.is_cancelled() {
                break Ok(());
            }
            depth += 1;
            self.reporter.info(&format!("Probing {} paths", batch.len()));
            let found = match DirectoryFetcher::new(ctx).fetch(batch).await {
                Ok(found) => found,
                Err(err) => break Err(err),
            };
            let fresh: Vec<Candidate> = found
                .into_iter()
                .filter(|c| !valid.iter().any(|v| v.url == c.url))
                .collect();
            valid.extend(fresh.iter().cloned());

            if !self.config.recursive || depth >= self.config.depth_limit || fresh.is_empty() {
                break Ok(());
            }
            batch = generator.generate(&fresh, &mut seen);
        };

        self.reporter
            .info(&format!("Found {} valid paths", valid.len()));
        progress.seen = seen;
        progress.valid = valid;
        outcome?;

        Ok(if self.config.directories_only {
            Phase::Finalize
        } else {
            Phase::ExpandFiles
        })
    }

    async fn expand_files(&self, ctx: &ScanContext, progress: &mut Progress) -> Phase {
        if self.config.files_only {
            progress.valid = vec![Candidate::root()];
        }
        // Every directory files are probed in gets its sample first.
        for directory in &progress.valid {
            let url = ctx.config.target.directory_url(&directory.url);
            ctx.soft404.sample(&url).await;
        }
        let generator = FileGenerator::new(progress.files.clone());
        progress.file_candidates = generator.generate(&progress.valid, &mut progress.seen);
        Phase::ProbeFiles
    }

    async fn probe_files(
        &self,
        ctx: &ScanContext,
        progress: &mut Progress,
    ) -> Result<Phase, ScanError> {
        let candidates = std::mem::take(&mut progress.file_candidates);
        self.reporter
            .info(&format!("Probing {} files", candidates.len()));
        FileFetcher::new(ctx).fetch(candidates).await?;
        Ok(Phase::Finalize)
    }
}

/// Requests `/` once so the cookie jar picks up a session cookie.
async fn harvest_session_cookie(ctx: &ScanContext) {
    let Ok(url) = Url::parse(&ctx.config.target.base_url()) else {
        return;
    };
    match ctx
        .engine
        .perform(Entry::side(url), &side_chain(&ctx.config))
        .await
    {
        Ok(entry) => {
            let cookies = entry
                .response
                .as_ref()
                .map(|r| r.headers.get_all(reqwest::header::SET_COOKIE).iter().count())
                .unwrap_or_default();
            ctx.reporter
                .debug(&format!("Session request set {cookies} cookies"));
        }
        Err(err) => ctx.reporter.debug(&format!("Session request failed: {err}")),
    }
}
