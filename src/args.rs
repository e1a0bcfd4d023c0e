//! This module defines the command-line arguments for the application.
//! It uses the `clap` crate to parse and validate user input.

use crate::config;
use clap::Parser;
use std::path::PathBuf;

/// Discovers hidden paths and files on a web host, filtering out soft 404s.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Target as scheme://host[:port][/basepath].
    pub host: String,

    /// Show debug messages.
    #[arg(short, long)]
    pub debug: bool,

    /// Probe files only, using / as the sole directory.
    #[arg(short = 'f', long, conflicts_with = "directories_only")]
    pub files_only: bool,

    /// Probe directories only.
    #[arg(short = 's', long)]
    pub directories_only: bool,

    /// File holding the cookies to send (raw `Cookie:` header).
    #[arg(short, long, value_name = "COOKIES")]
    pub cookies: Option<PathBuf>,

    /// Allow plugins to write downloaded files.
    #[arg(short = 'a', long)]
    pub allow_download: bool,

    /// Recurse into discovered directories.
    #[arg(short = 'b', long)]
    pub recursive: bool,

    /// Recursion depth limit.
    #[arg(short, long, default_value_t = config::DEFAULT_DEPTH_LIMIT)]
    pub limit: usize,

    /// Machine-parseable output (no colors, no progress bar).
    #[arg(short = 'e', long)]
    pub machine: bool,

    /// JSON output, printed once at the end of the scan. Implies -e.
    #[arg(short, long)]
    pub json: bool,

    /// Maximum timeouts (engine attempts) per request.
    #[arg(short = 'm', long = "max-timeouts", alias = "retries", default_value_t = config::DEFAULT_RETRY_COUNT)]
    pub max_timeouts: usize,

    /// Number of concurrent requests.
    #[arg(short, long, default_value_t = config::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Override the Host header.
    #[arg(short, long)]
    pub vhost: Option<String>,

    /// Only run the plugins.
    #[arg(short = 'z', long)]
    pub plugins_only: bool,

    /// User-Agent to send.
    #[arg(short = 'u', long = "user-agent", value_name = "AGENT")]
    pub user_agent: Option<String>,

    /// HTTP or HTTPS proxy (e.g., http://127.0.0.1:8080).
    #[arg(short, long)]
    pub proxy: Option<String>,

    /// Plugin option as PLUGIN:OPTS. Repeatable.
    #[arg(short = 'x', long = "plugin-option", value_name = "PLUGIN:OPTS")]
    pub plugin_options: Vec<String>,

    /// Path dictionary (JSON).
    #[arg(long, default_value = config::DEFAULT_PATH_DICT)]
    pub path_dict: PathBuf,

    /// File dictionary (JSON).
    #[arg(long, default_value = config::DEFAULT_FILE_DICT)]
    pub file_dict: PathBuf,

    /// Write one HAR file per successful request into this directory.
    #[arg(long, value_name = "DIR")]
    pub har: Option<PathBuf>,

    /// Do not probe file entries as directories.
    #[arg(long)]
    pub no_file_as_path: bool,
}
