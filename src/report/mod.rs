//! Report generation
//!
//! Runs the pipeline once: collect facts, resolve NIC affinity, select
//! tips, render. Nothing is written until collection has succeeded, so a
//! missing prerequisite produces no partial report.

mod render;

pub use render::{render, Report};

use crate::affinity::{resolve_all, FleetAffinitySummary};
use crate::config::ReportConfig;
use crate::error::Result;
use crate::system::{CommandRunner, FactCollector, SysRoot};
use crate::tuning::select_tips;
use std::io::Write;
use tracing::info;

/// Collect, analyze and render a full report to `out`
pub fn generate_report<R, W>(config: &ReportConfig, runner: &R, out: &mut W) -> Result<()>
where
    R: CommandRunner + ?Sized,
    W: Write + ?Sized,
{
    let facts = FactCollector::new(SysRoot::new(&config.root), runner).collect()?;

    let affinity = facts
        .network_devices
        .value()
        .map(|devices| resolve_all(devices))
        .unwrap_or_default();
    let fleet = FleetAffinitySummary::classify(&affinity);
    info!(devices = affinity.len(), fleet = %fleet.kind, "network affinity resolved");

    let tips = select_tips(&facts, &fleet, config.tips);

    render(
        out,
        &Report {
            facts: &facts,
            affinity: &affinity,
            fleet: &fleet,
            tips: &tips,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NumaScopeError;
    use crate::system::fake::{put, FakeCommands};

    const LSCPU: &str = "\
Architecture:        x86_64
Thread(s) per core:  2
Core(s) per socket:  4
Socket(s):           1
NUMA node(s):        1
Flags:               fpu constant_tsc nonstop_tsc
";

    #[test]
    fn test_missing_tools_emit_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeCommands::new().with_tool("lscpu").with_tool("ethtool");
        let config = ReportConfig::default().with_root(dir.path());

        let mut out = Vec::new();
        let err = generate_report(&config, &fake, &mut out).unwrap_err();
        match &err {
            NumaScopeError::MissingPrerequisite { tools } => {
                assert_eq!(tools, &vec!["numactl".to_string(), "lspci".to_string()]);
            }
            other => panic!("expected MissingPrerequisite, got {:?}", other),
        }
        assert!(err.to_string().contains("numactl, lspci"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_report_with_and_without_tips() {
        console::set_colors_enabled(false);
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/proc/sys/vm/swappiness", "5\n");
        put(dir.path(), "/proc/cmdline", "ro quiet\n");
        let fake = FakeCommands::with_prerequisites().with_output("lscpu", &[], LSCPU);

        let mut plain = Vec::new();
        let config = ReportConfig::default().with_root(dir.path());
        generate_report(&config, &fake, &mut plain).unwrap();
        let plain = String::from_utf8(plain).unwrap();
        assert!(plain.contains("=== CPU Topology ==="));
        assert!(plain.contains("2 (SMT on)"));
        assert!(!plain.contains("[!]"));
        assert!(!plain.contains("[+]"));

        let mut tipped = Vec::new();
        let config = ReportConfig { tips: true, ..config };
        generate_report(&config, &fake, &mut tipped).unwrap();
        let tipped = String::from_utf8(tipped).unwrap();
        assert!(tipped.contains("[!] SMT is enabled"));
        assert!(tipped.contains("[+] Swappiness is low"));
        assert!(tipped.contains("isolcpus"));
    }
}
