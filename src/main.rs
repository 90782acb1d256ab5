//! numascope CLI - NUMA, NIC affinity and latency tuning report

use clap::Parser;
use numascope::config::{CliArgs, ReportConfig};
use numascope::error::Result;
use numascope::report::generate_report;
use numascope::system::HostCommands;
use std::io::Write;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = ReportConfig::from_cli(&args);

    // Buffer so a failed collection leaves stdout untouched
    let mut buffer = Vec::new();
    generate_report(&config, &HostCommands, &mut buffer)?;

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    lock.write_all(&buffer)
        .and_then(|_| lock.flush())
        .map_err(numascope::NumaScopeError::Output)
}
