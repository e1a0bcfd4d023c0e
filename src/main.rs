//! Command-line entry point: parses arguments, wires Ctrl+C to the scan's
//! cancel signal, runs the scan and maps its outcome to an exit code.

use clap::Parser;
use softbuster::args::Args;
use softbuster::config::ScanConfig;
use softbuster::engine::CancelSignal;
use softbuster::output::{Level, Reporter};
use softbuster::scanner::Scanner;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ScanConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            let reporter = Reporter::new(args.debug, args.machine || args.json, args.json);
            eprintln!("{}", reporter.format_line(Level::Error, &err.to_string()));
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    if config.machine_output {
        colored::control::set_override(false);
    }

    let reporter = Arc::new(Reporter::from_config(&config));
    let cancel = Arc::new(CancelSignal::new());

    // Handle Ctrl+C for graceful shutdown
    let cancel_clone = cancel.clone();
    let reporter_clone = reporter.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            reporter_clone.warning("Received Ctrl+C, stopping scan...");
            cancel_clone.cancel();
        }
    });

    match Scanner::new(config, reporter.clone(), cancel).run().await {
        Ok(summary) => {
            reporter.info(&format!(
                "Done: {} valid paths, {} findings, {} errors",
                summary.valid_paths.len(),
                summary.findings.len(),
                reporter.error_count()
            ));
            ExitCode::SUCCESS
        }
        Err(err) => {
            reporter.error(&err.to_string());
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
