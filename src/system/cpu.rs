//! CPU topology, preemption and power-management facts
//!
//! One extraction function per fact. Parsers take raw tool/file text so
//! they can be tested without a host.

use super::facts::{CpuTopology, PreemptionModel};
use super::source::{CommandRunner, SysRoot};
use crate::error::{NumaScopeError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// C-state levels counted as "deep" for latency purposes
const DEEP_CSTATE_LEVELS: &[u32] = &[3, 6, 7];

/// Read topology from `lscpu`
pub fn topology<R: CommandRunner + ?Sized>(runner: &R) -> Result<CpuTopology> {
    let output = runner.run("lscpu", &[])?;
    parse_lscpu(&output)
}

/// Parse `lscpu` key/value output
///
/// Hybrid CPUs print one block per core type. The first block wins for
/// every field except `Thread(s) per core`, which takes the highest value
/// so SMT on any core type is seen. Optional counts that are not numbers
/// (ARM prints `Socket(s): -`) fall back to the cluster field, then to 1.
pub fn parse_lscpu(output: &str) -> Result<CpuTopology> {
    const THREADS: &str = "Thread(s) per core";

    let mut fields = BTreeMap::new();
    let mut threads = Vec::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key == THREADS {
            let count = value.parse::<u32>();
            threads.push(count.map_err(|e| NumaScopeError::parse("lscpu threads", e.to_string()))?);
        }
        fields.entry(key).or_insert(value);
    }

    let threads_per_core = threads
        .into_iter()
        .max()
        .ok_or_else(|| NumaScopeError::parse("lscpu", "no 'Thread(s) per core' line"))?;

    let number = |key: &str| fields.get(key).and_then(|v| v.parse::<u32>().ok());
    let cores_per_socket = number("Core(s) per socket")
        .or_else(|| number("Core(s) per cluster"))
        .unwrap_or(1);
    let sockets = number("Socket(s)").or_else(|| number("Cluster(s)")).unwrap_or(1);
    let numa_nodes = number("NUMA node(s)").unwrap_or(1);

    Ok(CpuTopology {
        architecture: fields
            .get("Architecture")
            .map(|s| s.to_string())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string()),
        model_name: fields.get("Model name").map(|s| s.to_string()),
        threads_per_core,
        cores_per_socket,
        sockets,
        numa_nodes,
        flags: fields
            .get("Flags")
            .map(|f| f.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

/// Read the scaling governor of every CPU that exposes cpufreq
pub fn governors(root: &SysRoot) -> Result<BTreeMap<u32, String>> {
    let mut governors = BTreeMap::new();

    for name in root.list_dir("/sys/devices/system/cpu")? {
        let Some(id) = name.strip_prefix("cpu").and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let path = format!("/sys/devices/system/cpu/{}/cpufreq/scaling_governor", name);
        match root.read(&path) {
            Ok(governor) => {
                governors.insert(id, governor);
            }
            Err(e) => debug!(cpu = id, error = %e, "no scaling governor"),
        }
    }

    if governors.is_empty() {
        return Err(NumaScopeError::empty("cpufreq"));
    }
    Ok(governors)
}

/// Idle state names from `cpupower idle-info`, falling back to sysfs cpuidle
pub fn cstates<R: CommandRunner + ?Sized>(root: &SysRoot, runner: &R) -> Result<Vec<String>> {
    if runner.locate("cpupower").is_some() {
        match runner.run("cpupower", &["idle-info"]) {
            Ok(output) => {
                if let Some(states) = parse_idle_info(&output) {
                    return Ok(states);
                }
                debug!("cpupower idle-info listed no idle states");
            }
            Err(e) => debug!(error = %e, "cpupower idle-info failed"),
        }
    }

    let base = "/sys/devices/system/cpu/cpu0/cpuidle";
    let states: Vec<String> = root
        .list_dir(base)?
        .into_iter()
        .filter(|entry| entry.starts_with("state"))
        .filter_map(|entry| root.read(&format!("{}/{}/name", base, entry)).ok())
        .collect();

    if states.is_empty() {
        return Err(NumaScopeError::empty("cpuidle"));
    }
    Ok(states)
}

/// Extract the "Available idle states:" list
pub fn parse_idle_info(output: &str) -> Option<Vec<String>> {
    let states: Vec<String> = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Available idle states:"))?
        .split_whitespace()
        .map(str::to_string)
        .collect();

    (!states.is_empty()).then_some(states)
}

/// Is this idle state one of C3/C6/C7 (including vendor suffixes like `C6S`)?
pub fn is_deep_cstate(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('C') else {
        return false;
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<u32>()
        .map(|level| DEEP_CSTATE_LEVELS.contains(&level))
        .unwrap_or(false)
}

/// Is the NMI watchdog enabled?
pub fn nmi_watchdog(root: &SysRoot) -> Result<bool> {
    Ok(root.read_value::<u32>("/proc/sys/kernel/nmi_watchdog")? != 0)
}

/// Determine the kernel preemption model
///
/// Checked in order: the RT marker file, the kernel version banner, the
/// `preempt=` boot parameter and debugfs for dynamic-preemption kernels,
/// then the build config in `/boot`.
pub fn preemption_model(root: &SysRoot, cmdline: Option<&str>) -> PreemptionModel {
    if root.read("/sys/kernel/realtime").map(|v| v == "1").unwrap_or(false) {
        return PreemptionModel::RealTime;
    }

    let banner = root.read("/proc/sys/kernel/version").unwrap_or_default();
    if let Some(model) = parse_version_banner(&banner) {
        return model;
    }

    if banner.contains("PREEMPT_DYNAMIC") {
        if let Some(mode) = cmdline.and_then(|c| super::facts::cmdline_value(c, "preempt")) {
            return PreemptionModel::from_mode(mode);
        }
        if let Some(model) = root
            .read("/sys/kernel/debug/sched/preempt")
            .ok()
            .and_then(|raw| parse_dynamic_preempt(&raw))
        {
            return model;
        }
    }

    let release = root.read("/proc/sys/kernel/osrelease").unwrap_or_default();
    if !release.is_empty() {
        if let Ok(config) = root.read(&format!("/boot/config-{}", release)) {
            if let Some(model) = parse_kernel_config(&config) {
                return model;
            }
        }
    }

    debug!("preemption model could not be determined");
    PreemptionModel::Unknown
}

/// Classify the `/proc/sys/kernel/version` banner (e.g. `#1 SMP PREEMPT_RT ...`)
///
/// Returns `None` for dynamic-preemption kernels and for banners that do not
/// mention preemption, where the banner alone is not conclusive.
pub fn parse_version_banner(banner: &str) -> Option<PreemptionModel> {
    let tokens: Vec<&str> = banner.split_whitespace().collect();
    if tokens.contains(&"PREEMPT_RT") {
        Some(PreemptionModel::RealTime)
    } else if tokens.contains(&"PREEMPT_DYNAMIC") {
        None
    } else if tokens.contains(&"PREEMPT") {
        Some(PreemptionModel::Full)
    } else {
        None
    }
}

/// Parse debugfs `sched/preempt`, where the active mode is in parentheses
pub fn parse_dynamic_preempt(raw: &str) -> Option<PreemptionModel> {
    raw.split_whitespace()
        .find(|t| t.starts_with('(') && t.ends_with(')'))
        .map(|t| PreemptionModel::from_mode(t.trim_matches(|c| c == '(' || c == ')')))
}

/// Read the preemption choice out of a kernel build config
pub fn parse_kernel_config(config: &str) -> Option<PreemptionModel> {
    config.lines().find_map(|line| match line.trim() {
        "CONFIG_PREEMPT_RT=y" => Some(PreemptionModel::RealTime),
        "CONFIG_PREEMPT=y" => Some(PreemptionModel::Full),
        "CONFIG_PREEMPT_VOLUNTARY=y" => Some(PreemptionModel::Voluntary),
        "CONFIG_PREEMPT_NONE=y" => Some(PreemptionModel::None),
        _ => None,
    })
}
