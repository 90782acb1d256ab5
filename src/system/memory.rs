//! Memory tuning knobs: swappiness, swap usage, THP, NUMA balancing

use super::facts::{SwapUsage, ThpMode};
use super::source::{selected_choice, SysRoot};
use crate::error::{NumaScopeError, Result};

const THP_ENABLED: &str = "/sys/kernel/mm/transparent_hugepage/enabled";

/// Read `vm.swappiness`
pub fn swappiness(root: &SysRoot) -> Result<u8> {
    root.read_value::<u8>("/proc/sys/vm/swappiness")
}

/// Sum usage over every active swap area in `/proc/swaps`
pub fn swap_usage(root: &SysRoot) -> Result<SwapUsage> {
    parse_swaps(&root.read("/proc/swaps")?)
}

/// Parse `/proc/swaps`; sizes are in KiB
pub fn parse_swaps(content: &str) -> Result<SwapUsage> {
    let mut usage = SwapUsage::default();

    for line in content.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 4 {
            return Err(NumaScopeError::parse("/proc/swaps", format!("short line '{}'", line)));
        }
        let column = |idx: usize| {
            columns[idx]
                .parse::<u64>()
                .map_err(|e| NumaScopeError::parse("/proc/swaps", e.to_string()))
        };
        usage.total_kib += column(2)?;
        usage.used_kib += column(3)?;
    }

    Ok(usage)
}

/// Physical memory in bytes from `/proc/meminfo`
pub fn memory_total(root: &SysRoot) -> Result<u64> {
    let content = root.read("/proc/meminfo")?;
    content
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .ok_or_else(|| NumaScopeError::parse("/proc/meminfo", "no MemTotal line"))
}

/// Active transparent huge pages mode
pub fn thp_mode(root: &SysRoot) -> Result<ThpMode> {
    let raw = root.read(THP_ENABLED)?;
    selected_choice(&raw)
        .map(ThpMode::from_name)
        .ok_or_else(|| NumaScopeError::parse(THP_ENABLED, format!("no selected mode in '{}'", raw)))
}

/// Is automatic NUMA balancing on?
pub fn numa_balancing(root: &SysRoot) -> Result<bool> {
    Ok(root.read_value::<u32>("/proc/sys/kernel/numa_balancing")? != 0)
}
