//! Process table scan: irqbalance presence and real-time tasks

use super::source::SysRoot;
use crate::error::Result;
use std::fmt;

/// Real-time scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// SCHED_FIFO
    Fifo,
    /// SCHED_RR
    RoundRobin,
    /// SCHED_DEADLINE
    Deadline,
}

impl SchedPolicy {
    /// Map a kernel policy number; `None` for non-RT policies
    pub fn from_raw(policy: u32) -> Option<Self> {
        match policy {
            1 => Some(Self::Fifo),
            2 => Some(Self::RoundRobin),
            6 => Some(Self::Deadline),
            _ => None,
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fifo => "FIFO",
            Self::RoundRobin => "RR",
            Self::Deadline => "DEADLINE",
        })
    }
}

/// Process running under a real-time policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtProcess {
    /// Process ID
    pub pid: i32,
    /// Command name from `stat`
    pub command: String,
    /// Scheduling policy
    pub policy: SchedPolicy,
    /// Real-time priority, 1-99 (0 for SCHED_DEADLINE)
    pub priority: u32,
    /// CPU the task last ran on
    pub last_cpu: Option<i32>,
}

/// Everything the report needs from one pass over the process table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// An `irqbalance` process exists
    pub irqbalance_active: bool,
    /// Highest priority first
    pub rt_processes: Vec<RtProcess>,
}

impl ProcessSnapshot {
    fn push(
        &mut self,
        pid: i32,
        command: String,
        policy: Option<u32>,
        priority: Option<u32>,
        last_cpu: Option<i32>,
    ) {
        if command == "irqbalance" {
            self.irqbalance_active = true;
        }
        if let Some(policy) = policy.and_then(SchedPolicy::from_raw) {
            self.rt_processes.push(RtProcess {
                pid,
                command,
                policy,
                priority: priority.unwrap_or(0),
                last_cpu,
            });
        }
    }

    fn finish(mut self) -> Self {
        self.rt_processes
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.pid.cmp(&b.pid)));
        self
    }
}

/// Scan `/proc` under the given root
#[cfg(target_os = "linux")]
pub fn scan(root: &SysRoot) -> Result<ProcessSnapshot> {
    use crate::error::NumaScopeError;
    use tracing::debug;

    let processes = procfs::process::all_processes_with_root(root.path("/proc"))
        .map_err(|e| NumaScopeError::parse("process table", e.to_string()))?;

    let mut snapshot = ProcessSnapshot::default();
    for process in processes {
        // Processes exit between listing and reading; skip them
        let stat = match process.and_then(|p| p.stat()) {
            Ok(stat) => stat,
            Err(e) => {
                debug!(error = %e, "skipping process");
                continue;
            }
        };
        snapshot.push(stat.pid, stat.comm, stat.policy, stat.rt_priority, stat.processor);
    }

    Ok(snapshot.finish())
}

#[cfg(not(target_os = "linux"))]
pub fn scan(_root: &SysRoot) -> Result<ProcessSnapshot> {
    Err(crate::error::NumaScopeError::Unsupported("process table".to_string()))
}
