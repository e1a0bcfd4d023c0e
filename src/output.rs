//! This module handles all output-related functionality.
//! It formats log lines and findings for the console, accumulates findings for
//! the JSON report, and keeps console output from tearing the progress bar.

use crate::candidate::Severity;
use crate::config::ScanConfig;
use crate::entry::Special;
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A discovered path or file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundEvent {
    pub description: String,
    pub url: String,
    pub code: u16,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<Special>,
    /// Category shown before the description in pretty output, e.g. "ISE, ".
    #[serde(skip)]
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Timeout,
    Found(Severity),
}

impl Level {
    fn name(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Timeout => "TIMEOUT",
            Level::Found(severity) => severity.level_name(),
        }
    }

    fn colorize(&self, text: &str) -> ColoredString {
        match self {
            Level::Debug => text.dimmed(),
            Level::Info => text.blue(),
            Level::Warning => text.yellow(),
            Level::Error | Level::Timeout => text.red().bold(),
            Level::Found(Severity::Informational) => text.cyan(),
            Level::Found(Severity::Warning) => text.yellow().bold(),
            Level::Found(Severity::Medium) => text.magenta().bold(),
            Level::Found(Severity::High | Severity::Critical) => text.red().bold(),
        }
    }
}

/// The document printed in JSON mode.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub from: &'static str,
    pub version: &'static str,
    pub result: &'a [FoundEvent],
}

/// Scan-scoped sink for log lines and findings.
pub struct Reporter {
    debug: bool,
    colors: bool,
    json: bool,
    progress_enabled: bool,
    findings: Mutex<Vec<FoundEvent>>,
    progress: Mutex<Option<ProgressBar>>,
    flushed: AtomicBool,
    error_count: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Reporter {
    pub fn new(debug: bool, machine: bool, json: bool) -> Self {
        Self {
            debug,
            colors: !machine && !json,
            json,
            progress_enabled: !machine && !json,
            findings: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            flushed: AtomicBool::new(false),
            error_count: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.debug, config.machine_output, config.json_output)
    }

    /// A reporter that prints nothing but still accumulates findings.
    pub fn silent() -> Self {
        Self {
            debug: false,
            colors: false,
            json: true,
            progress_enabled: false,
            findings: Mutex::new(Vec::new()),
            progress: Mutex::new(None),
            flushed: AtomicBool::new(true),
            error_count: AtomicUsize::new(0),
        }
    }

    /// Formats a log line as `[HH:MM:SS] [LEVEL] text`.
    pub fn format_line(&self, level: Level, text: &str) -> String {
        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        let tag = format!("[{}]", level.name());
        if self.colors {
            format!("[{}] {} {}", time.dimmed(), level.colorize(&tag), text)
        } else {
            format!("[{time}] {tag} {text}")
        }
    }

    /// Pretty text of a finding, without the timestamp and level.
    pub fn format_found(event: &FoundEvent) -> String {
        format!("{}{} at: {}", event.prefix, event.description, event.url)
    }

    fn emit(&self, line: String) {
        if self.json && self.flushed.load(Ordering::Relaxed) {
            return;
        }
        let progress = lock(&self.progress);
        match (progress.as_ref(), self.json) {
            (Some(pb), _) => pb.suspend(|| println!("{line}")),
            (None, true) => eprintln!("{line}"),
            (None, false) => println!("{line}"),
        }
    }

    pub fn log(&self, level: Level, text: &str) {
        if level == Level::Debug && !self.debug {
            return;
        }
        if matches!(level, Level::Error | Level::Timeout) {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.emit(self.format_line(level, text));
    }

    pub fn debug(&self, text: &str) {
        self.log(Level::Debug, text);
    }

    pub fn info(&self, text: &str) {
        self.log(Level::Info, text);
    }

    pub fn warning(&self, text: &str) {
        self.log(Level::Warning, text);
    }

    pub fn error(&self, text: &str) {
        self.log(Level::Error, text);
    }

    pub fn timeout(&self, text: &str) {
        self.log(Level::Timeout, text);
    }

    /// Records a finding; printed right away unless in JSON mode.
    pub fn found(&self, event: FoundEvent) {
        if !self.json {
            self.emit(self.format_line(
                Level::Found(event.severity),
                &Self::format_found(&event),
            ));
        }
        lock(&self.findings).push(event);
    }

    pub fn findings(&self) -> Vec<FoundEvent> {
        lock(&self.findings).clone()
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Renders the JSON report for the given findings.
    pub fn render_json(findings: &[FoundEvent]) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&JsonReport {
            from: "softbuster",
            version: env!("CARGO_PKG_VERSION"),
            result: findings,
        })
    }

    /// Prints the JSON report, once. Later calls do nothing.
    pub fn flush(&self) {
        if self.flushed.swap(true, Ordering::Relaxed) || !self.json {
            return;
        }
        let findings = self.findings();
        match Self::render_json(&findings) {
            Ok(report) => println!("{report}"),
            Err(e) => eprintln!("{}", self.format_line(Level::Error, &e.to_string())),
        }
    }

    /// Starts a progress bar for a batch; console lines go through it until
    /// [`Reporter::finish_progress`].
    pub fn start_progress(&self, len: usize, message: &str) -> Option<ProgressBar> {
        if !self.progress_enabled {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message.to_string());
        *lock(&self.progress) = Some(pb.clone());
        Some(pb)
    }

    pub fn finish_progress(&self) {
        if let Some(pb) = lock(&self.progress).take() {
            pb.finish_and_clear();
        }
    }
}
