//! The host fact snapshot
//!
//! [`HostFacts`] is built once per run by the collector and never mutated.
//! Optional readings are wrapped in [`Fact`], so an unreadable source is a
//! distinct third outcome rather than a default value.

use super::host::HostIdentity;
use super::network::NetworkDevice;
use super::numa::NumaTopology;
use super::process::RtProcess;
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;

/// A single fact that may be unavailable on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact<T> {
    /// Value was read successfully
    Available(T),
    /// Source could not be read; carries the reason shown in the report
    Unavailable(String),
}

impl<T> Fact<T> {
    /// Mark a fact unavailable
    pub fn unavailable(reason: impl fmt::Display) -> Self {
        Self::Unavailable(reason.to_string())
    }

    /// Borrow the value, if available
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Available(v) => Some(v),
            Self::Unavailable(_) => None,
        }
    }

    /// Was the value read?
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Transform an available value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fact<U> {
        match self {
            Self::Available(v) => Fact::Available(f(v)),
            Self::Unavailable(reason) => Fact::Unavailable(reason),
        }
    }
}

impl<T> From<Result<T>> for Fact<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(v) => Self::Available(v),
            Err(e) => Self::unavailable(e),
        }
    }
}

/// Kernel preemption model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreemptionModel {
    /// PREEMPT_RT
    RealTime,
    /// Fully preemptible, non-RT
    Full,
    /// Voluntary preemption points only
    Voluntary,
    /// No forced preemption (server)
    None,
    /// Could not be determined
    Unknown,
}

impl PreemptionModel {
    /// Parse a dynamic-preemption mode name (`none`, `voluntary`, `full`)
    pub fn from_mode(mode: &str) -> Self {
        match mode.trim() {
            "none" => Self::None,
            "voluntary" => Self::Voluntary,
            "full" => Self::Full,
            "rt" => Self::RealTime,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PreemptionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RealTime => "real-time (PREEMPT_RT)",
            Self::Full => "full (PREEMPT)",
            Self::Voluntary => "voluntary",
            Self::None => "none (server)",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Transparent huge pages mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThpMode {
    /// Always back anonymous memory with huge pages
    Always,
    /// Only for regions marked with madvise(MADV_HUGEPAGE)
    Madvise,
    /// Disabled
    Never,
    /// Kernel reported a mode this tool does not know
    Unknown,
}

impl ThpMode {
    /// Map the selected entry of the sysfs `enabled` file
    pub fn from_name(name: &str) -> Self {
        match name {
            "always" => Self::Always,
            "madvise" => Self::Madvise,
            "never" => Self::Never,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ThpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Always => "always",
            Self::Madvise => "madvise",
            Self::Never => "never",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// TSC reliability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TscFlags {
    /// Ticks at a constant rate regardless of frequency scaling
    pub constant: bool,
    /// Keeps ticking in deep C-states
    pub nonstop: bool,
}

impl TscFlags {
    /// Both flags set
    pub fn is_reliable(&self) -> bool {
        self.constant && self.nonstop
    }
}

/// CPU topology as reported by the CPU topology reporter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuTopology {
    /// Architecture, e.g. `x86_64`
    pub architecture: String,
    /// Model name, when reported
    pub model_name: Option<String>,
    /// Logical CPUs per physical core
    pub threads_per_core: u32,
    /// Physical cores per socket
    pub cores_per_socket: u32,
    /// Populated sockets
    pub sockets: u32,
    /// NUMA nodes
    pub numa_nodes: u32,
    /// CPU feature flags
    pub flags: Vec<String>,
}

impl CpuTopology {
    /// TSC stability derived from the feature flags
    pub fn tsc(&self) -> TscFlags {
        TscFlags {
            constant: self.has_flag("constant_tsc"),
            nonstop: self.has_flag("nonstop_tsc"),
        }
    }

    /// Does the CPU have a time stamp counter at all? (x86 only)
    pub fn has_tsc(&self) -> bool {
        self.flags.iter().any(|f| f.contains("tsc"))
    }

    /// Is a feature flag present?
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Total logical CPUs implied by the topology
    pub fn logical_cpus(&self) -> u32 {
        self.threads_per_core * self.cores_per_socket * self.sockets
    }
}

/// Swap usage summed over all active swap areas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwapUsage {
    /// Configured swap in KiB
    pub total_kib: u64,
    /// Swap currently holding pages, in KiB
    pub used_kib: u64,
}

impl SwapUsage {
    /// Are any pages swapped out right now?
    pub fn in_use(&self) -> bool {
        self.used_kib > 0
    }
}

/// Complete read-only snapshot of the host
#[derive(Debug, Clone)]
pub struct HostFacts {
    /// Hostname, OS and kernel
    pub identity: HostIdentity,
    /// SMT, cores, sockets, flags
    pub cpu: Fact<CpuTopology>,
    /// NUMA nodes and distances
    pub numa: Fact<NumaTopology>,
    /// `/proc/cmdline`
    pub kernel_cmdline: Fact<String>,
    /// Kernel preemption model
    pub preemption: PreemptionModel,
    /// NMI watchdog enabled
    pub nmi_watchdog: Fact<bool>,
    /// Automatic NUMA balancing enabled
    pub numa_balancing: Fact<bool>,
    /// `vm.swappiness`
    pub swappiness: Fact<u8>,
    /// Active swap usage
    pub swap: Fact<SwapUsage>,
    /// Physical memory in bytes
    pub memory_total: Fact<u64>,
    /// Transparent huge pages mode
    pub thp: Fact<ThpMode>,
    /// CPU id → scaling governor
    pub governors: Fact<BTreeMap<u32, String>>,
    /// Idle state names, shallowest first
    pub cstates: Fact<Vec<String>>,
    /// Block device → active I/O scheduler
    pub io_schedulers: Fact<BTreeMap<String, Fact<String>>>,
    /// PCI network devices with their NUMA hints
    pub network_devices: Fact<Vec<NetworkDevice>>,
    /// irqbalance daemon running
    pub irqbalance_active: Fact<bool>,
    /// Processes under a real-time scheduling policy
    pub rt_processes: Fact<Vec<RtProcess>>,
}

impl HostFacts {
    /// Logical CPUs per core, if the topology was read
    pub fn threads_per_core(&self) -> Option<u32> {
        self.cpu.value().map(|c| c.threads_per_core)
    }

    /// Kernel command line contains `param` as a bare flag or `param=...`
    pub fn cmdline_has(&self, param: &str) -> Option<bool> {
        self.kernel_cmdline
            .value()
            .map(|cmdline| cmdline_value(cmdline, param).is_some())
    }
}

/// Value of `param` on a kernel command line; empty for bare flags
pub fn cmdline_value<'a>(cmdline: &'a str, param: &str) -> Option<&'a str> {
    cmdline.split_whitespace().find_map(|token| match token.split_once('=') {
        Some((key, value)) if key == param => Some(value),
        None if token == param => Some(""),
        _ => None,
    })
}

#[cfg(test)]
impl HostFacts {
    /// Snapshot with every fact unavailable, for building test cases
    pub(crate) fn blank() -> Self {
        let missing = || "not collected".to_string();
        Self {
            identity: HostIdentity::default(),
            cpu: Fact::Unavailable(missing()),
            numa: Fact::Unavailable(missing()),
            kernel_cmdline: Fact::Unavailable(missing()),
            preemption: PreemptionModel::Unknown,
            nmi_watchdog: Fact::Unavailable(missing()),
            numa_balancing: Fact::Unavailable(missing()),
            swappiness: Fact::Unavailable(missing()),
            swap: Fact::Unavailable(missing()),
            memory_total: Fact::Unavailable(missing()),
            thp: Fact::Unavailable(missing()),
            governors: Fact::Unavailable(missing()),
            cstates: Fact::Unavailable(missing()),
            io_schedulers: Fact::Unavailable(missing()),
            network_devices: Fact::Unavailable(missing()),
            irqbalance_active: Fact::Unavailable(missing()),
            rt_processes: Fact::Unavailable(missing()),
        }
    }
}
