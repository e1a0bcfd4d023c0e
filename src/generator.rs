//! Candidate generation: paths from the path dictionary (and recursively from
//! discovered directories), files from valid directories times suffixes.

use crate::candidate::{Candidate, join_url, normalize_url};
use std::collections::HashSet;

/// Suffixes tried on data-like file entries.
pub const DATA_SUFFIXES: [&str; 26] = [
    "", ".sql", ".bak", ".old", ".dmp", ".zip", ".tar.gz", ".tar.bz2", ".tgz", "~", ".conf",
    ".conf.old", ".cnf", ".ini", ".inc", ".log", ".txt", ".passwd", ".php.bak", ".php.old",
    ".sql.old", ".xml", ".csv", ".wsdl", ".pwd", ".yml",
];

/// Suffixes tried on entries marked `executable`.
pub const EXECUTABLE_SUFFIXES: [&str; 6] = [".php", ".asp", ".aspx", ".pl", ".cgi", ".cfm"];

/// URLs already produced during the scan, normalized. Shared by both
/// generators, so a file entry probed as a directory is not probed again as
/// a bare file.
#[derive(Debug, Default)]
pub struct SeenSet {
    urls: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a URL; false when it was already there.
    pub fn insert(&mut self, url: &str) -> bool {
        self.urls.insert(normalize_url(url))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(&normalize_url(url))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

pub struct PathGenerator {
    paths: Vec<Candidate>,
    files: Vec<Candidate>,
    file_as_path: bool,
    started: bool,
}

impl PathGenerator {
    pub fn new(paths: Vec<Candidate>, files: Vec<Candidate>, file_as_path: bool) -> Self {
        Self {
            paths,
            files,
            file_as_path,
            started: false,
        }
    }

    /// First call: every dictionary path, plus file entries probed as
    /// directories. Later calls: every valid path joined with every dictionary
    /// path. URLs seen before are skipped.
    pub fn generate(&mut self, valid: &[Candidate], seen: &mut SeenSet) -> Vec<Candidate> {
        let mut out = Vec::new();

        if !self.started {
            self.started = true;
            let files_as_paths = self
                .files
                .iter()
                .filter(|f| self.file_as_path && !f.no_suffix);
            for candidate in self.paths.iter().chain(files_as_paths) {
                if !candidate.is_root() && seen.insert(&candidate.url) {
                    out.push(candidate.clone());
                }
            }
            return out;
        }

        for directory in valid {
            for path in &self.paths {
                if directory.is_root() && path.is_root() {
                    continue;
                }
                let url = join_url(&directory.url, &path.url);
                if seen.insert(&url) {
                    out.push(path.with_url(&url));
                }
            }
        }
        out
    }
}

pub struct FileGenerator {
    files: Vec<Candidate>,
}

impl FileGenerator {
    pub fn new(files: Vec<Candidate>) -> Self {
        Self { files }
    }

    fn suffixes(file: &Candidate) -> &'static [&'static str] {
        if file.no_suffix {
            &[""]
        } else if file.executable {
            &EXECUTABLE_SUFFIXES
        } else {
            &DATA_SUFFIXES
        }
    }

    /// Every valid directory joined with every file entry and its suffixes.
    pub fn generate(&self, valid: &[Candidate], seen: &mut SeenSet) -> Vec<Candidate> {
        let mut out = Vec::new();
        for directory in valid {
            for file in &self.files {
                if file.is_root() {
                    continue;
                }
                let base = join_url(&directory.url, &file.url);
                for suffix in Self::suffixes(file) {
                    let url = format!("{base}{suffix}");
                    if seen.insert(&url) {
                        out.push(file.with_url(&url));
                    }
                }
            }
        }
        out
    }
}
