//! Configuration settings for numascope
//!
//! Defines the CLI arguments and the runtime settings derived from them.

use clap::Parser;
use std::path::PathBuf;

/// numascope - NUMA, NIC affinity and latency tuning report for Linux servers
#[derive(Parser, Debug, Clone)]
#[command(name = "numascope")]
#[command(author = "Numascope Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read-only NUMA, NIC affinity and latency tuning report")]
#[command(long_about = r#"
numascope inspects a Linux server and prints a sectioned report:

  - CPU topology, SMT, TSC and kernel preemption model
  - NUMA nodes, CPU lists and inter-node distances
  - Which NUMA node each PCI network device is attached to
  - Governors, C-states and the NMI watchdog
  - Swappiness, swap usage and transparent huge pages
  - Block I/O schedulers, irqbalance and real-time processes

Nothing is ever changed on the system.

Requires: lscpu, numactl, lspci, ethtool
Optional: cpupower

Examples:
  numascope            # Facts only
  numascope --tips     # Facts plus low-latency tuning advice
"#)]
pub struct CliArgs {
    /// Print advisory tuning tips alongside each section
    #[arg(long)]
    pub tips: bool,
}

/// Runtime settings for one report run
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Emit advisory tips
    pub tips: bool,
    /// Root that sysfs/procfs paths are resolved against
    pub root: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            tips: false,
            root: PathBuf::from("/"),
        }
    }
}

impl ReportConfig {
    /// Create configuration from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Self {
        Self {
            tips: args.tips,
            ..Default::default()
        }
    }

    /// Point the collector at another filesystem root
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tips_flag() {
        let args = CliArgs::parse_from(["numascope", "--tips"]);
        assert!(ReportConfig::from_cli(&args).tips);

        let args = CliArgs::parse_from(["numascope"]);
        let config = ReportConfig::from_cli(&args);
        assert!(!config.tips);
        assert_eq!(config.root, PathBuf::from("/"));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(CliArgs::try_parse_from(["numascope", "--json"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }
}
