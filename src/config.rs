//! Scan configuration: every tunable of the engine and the orchestrator, with
//! the defaults used when the command line leaves them alone.

use crate::args::Args;
use crate::error::ScanError;
use crate::parser;
use crate::target::Target;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 50;
pub const DEFAULT_RETRY_COUNT: usize = 3;
pub const DEFAULT_DEAD_HOST_THRESHOLD: usize = 200;
pub const DEFAULT_MAX_BODY: usize = 5120;
pub const DEFAULT_BEHAVIOR_BUFFER: usize = 100;
pub const DEFAULT_BEHAVIOR_SIMILARITY: f64 = 0.80;
pub const DEFAULT_MAX_BEHAVIOR_TRIES: usize = 3;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_DEPTH_LIMIT: usize = 3;
pub const DEFAULT_TIMEOUT_MIN: f64 = 0.5;
pub const DEFAULT_TIMEOUT_INITIAL: f64 = 2.0;
pub const DEFAULT_TIMEOUT_MAX: f64 = 10.0;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; softbuster/0.1)";
pub const DEFAULT_PATH_DICT: &str = "data/paths.json";
pub const DEFAULT_FILE_DICT: &str = "data/files.json";
pub const REJECTED_STATUS_CODES: [u16; 2] = [404, 502];

/// Holds all the configuration settings for a scan.
/// Shared read-only across every concurrent task.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub target: Target,
    pub workers: usize,
    /// Engine invocations allowed per entry on transient failures.
    pub retry_count: usize,
    pub dead_host_threshold: usize,
    /// Bytes of body read per response.
    pub max_body: usize,
    /// Bytes of body fingerprinted.
    pub file_sample_len: usize,
    pub behavior_buffer_size: usize,
    pub behavior_similarity: f64,
    pub max_behavior_tries: usize,
    pub max_redirects: usize,
    pub timeout_min: Duration,
    pub timeout_initial: Duration,
    pub timeout_max: Duration,
    pub recursive: bool,
    pub depth_limit: usize,
    pub directories_only: bool,
    pub files_only: bool,
    pub plugins_only: bool,
    /// Also probe file entries as directories.
    pub file_as_path: bool,
    pub user_agent: String,
    pub vhost: Option<String>,
    pub cookies: Option<String>,
    pub proxy: Option<String>,
    pub allow_download: bool,
    pub plugin_options: HashMap<String, Vec<String>>,
    pub har_dir: Option<PathBuf>,
    pub debug: bool,
    pub machine_output: bool,
    pub json_output: bool,
    pub path_dict: PathBuf,
    pub file_dict: PathBuf,
}

impl ScanConfig {
    /// Defaults for the given target.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            workers: DEFAULT_WORKERS,
            retry_count: DEFAULT_RETRY_COUNT,
            dead_host_threshold: DEFAULT_DEAD_HOST_THRESHOLD,
            max_body: DEFAULT_MAX_BODY,
            file_sample_len: crate::fingerprint::DEFAULT_SAMPLE_LEN,
            behavior_buffer_size: DEFAULT_BEHAVIOR_BUFFER,
            behavior_similarity: DEFAULT_BEHAVIOR_SIMILARITY,
            max_behavior_tries: DEFAULT_MAX_BEHAVIOR_TRIES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout_min: Duration::from_secs_f64(DEFAULT_TIMEOUT_MIN),
            timeout_initial: Duration::from_secs_f64(DEFAULT_TIMEOUT_INITIAL),
            timeout_max: Duration::from_secs_f64(DEFAULT_TIMEOUT_MAX),
            recursive: false,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            directories_only: false,
            files_only: false,
            plugins_only: false,
            file_as_path: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            vhost: None,
            cookies: None,
            proxy: None,
            allow_download: false,
            plugin_options: HashMap::new(),
            har_dir: None,
            debug: false,
            machine_output: false,
            json_output: false,
            path_dict: PathBuf::from(DEFAULT_PATH_DICT),
            file_dict: PathBuf::from(DEFAULT_FILE_DICT),
        }
    }

    /// Builds the configuration from parsed command-line arguments.
    pub fn from_args(args: &Args) -> Result<Self, ScanError> {
        let mut config = Self::new(Target::parse(&args.host)?);

        config.workers = args.workers.max(1);
        config.retry_count = args.max_timeouts.max(1);
        config.recursive = args.recursive;
        config.depth_limit = args.limit.max(1);
        config.directories_only = args.directories_only;
        config.files_only = args.files_only;
        config.plugins_only = args.plugins_only;
        config.file_as_path = !args.no_file_as_path;
        config.vhost = args.vhost.clone();
        config.proxy = args.proxy.clone();
        config.allow_download = args.allow_download;
        config.plugin_options = parser::parse_plugin_options(&args.plugin_options);
        config.har_dir = args.har.clone();
        config.debug = args.debug;
        config.json_output = args.json;
        config.machine_output = args.machine || args.json;
        config.path_dict = args.path_dict.clone();
        config.file_dict = args.file_dict.clone();

        if let Some(agent) = &args.user_agent {
            config.user_agent = agent.clone();
        }
        if let Some(path) = &args.cookies {
            config.cookies = Some(parser::parse_cookie_file(path)?);
        }

        Ok(config)
    }

    /// Hosts requests may be sent to.
    pub fn allowed_hosts(&self) -> HashSet<String> {
        HashSet::from([self.target.host.to_lowercase()])
    }
}
