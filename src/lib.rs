//! Adaptive discovery of hidden paths and files on web hosts.
//!
//! Every request runs through a chain of heuristics that learn what "not
//! found" looks like per directory, follow or reject redirects, adapt the
//! timeout to the host, and notice when the server starts answering
//! everything the same way.

pub mod args;
pub mod candidate;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod generator;
pub mod heuristics;
pub mod output;
pub mod parser;
pub mod plugins;
pub mod scanner;
pub mod similarity;
pub mod singleflight;
pub mod target;

#[cfg(test)]
mod tests;
