//! Candidate-contributing plugins, run once before directory probing.

use crate::candidate::{Candidate, Severity, normalize_url};
use crate::entry::{Entry, ProbeKind};
use crate::output::FoundEvent;
use crate::scanner::ScanContext;
use async_trait::async_trait;
use reqwest::Url;

/// What a plugin gets to work with.
pub struct PluginContext<'a> {
    pub scan: &'a ScanContext,
    /// Options passed with `-x name:option`.
    pub options: &'a [String],
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Path candidates contributed to the first directory batch.
    async fn run(&self, ctx: &PluginContext<'_>) -> Vec<Candidate>;
}

/// Plugins enabled by default.
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![Box::new(RobotsPlugin)]
}

/// Paths named by `Allow` and `Disallow` rules, wildcards and `$` anchors
/// stripped, first occurrence kept.
pub fn parse_robots(text: &str) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_ascii_lowercase();
        if field != "allow" && field != "disallow" {
            continue;
        }
        let value = value.trim().replace('*', "");
        let value = value.trim_end_matches('$');
        if value.is_empty() {
            continue;
        }
        let path = normalize_url(value);
        if path != "/" && !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// Reads `/robots.txt` and contributes the paths it lists.
pub struct RobotsPlugin;

#[async_trait]
impl Plugin for RobotsPlugin {
    fn name(&self) -> &'static str {
        "robots"
    }

    async fn run(&self, ctx: &PluginContext<'_>) -> Vec<Candidate> {
        let scan = ctx.scan;
        let raw_url = scan.config.target.file_url("/robots.txt");
        let Ok(url) = Url::parse(&raw_url) else {
            return Vec::new();
        };
        let candidate = Candidate::new("/robots.txt", "Robots file", Severity::Informational);

        let entry = match scan
            .engine
            .perform(Entry::new(url, candidate, ProbeKind::File), &scan.chain)
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                scan.reporter.debug(&format!("No usable robots.txt: {err}"));
                return Vec::new();
            }
        };
        let Some(response) = entry.response.as_ref().filter(|r| r.code == 200) else {
            return Vec::new();
        };

        scan.reporter.found(FoundEvent {
            description: entry.candidate.description.clone(),
            url: entry.url().to_string(),
            code: response.code,
            severity: entry.candidate.severity,
            special: None,
            prefix: String::new(),
        });

        if scan.config.allow_download {
            match tokio::fs::write("robots.txt", &response.raw).await {
                Ok(()) => scan.reporter.info("Saved robots.txt"),
                Err(e) => scan.reporter.warning(&format!("Could not save robots.txt: {e}")),
            }
        }

        let paths = parse_robots(response.text());
        scan.reporter
            .debug(&format!("robots.txt lists {} paths", paths.len()));
        paths
            .iter()
            .map(|path| Candidate::new(path, "Listed in robots.txt", Severity::Informational))
            .collect()
    }
}
