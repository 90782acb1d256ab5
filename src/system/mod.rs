//! Host fact collection
//!
//! Shells out to the inspection tools and reads sysfs/procfs, producing one
//! immutable [`HostFacts`] snapshot per run. Missing mandatory tools abort
//! the run; every other failure degrades the affected fact to
//! [`Fact::Unavailable`].

pub mod cpu;
mod facts;
mod host;
pub mod memory;
pub mod network;
pub mod numa;
mod prereq;
pub mod process;
mod source;
pub mod storage;

pub use facts::*;
pub use host::HostIdentity;
pub use network::NetworkDevice;
pub use numa::{DistanceMatrix, NumaNode, NumaTopology};
pub use prereq::{check_prerequisites, Tool, OPTIONAL_TOOLS, REQUIRED_TOOLS};
pub use process::{ProcessSnapshot, RtProcess, SchedPolicy};
pub use source::{selected_choice, CommandRunner, HostCommands, SysRoot};

#[cfg(test)]
pub(crate) use source::fake;

use crate::error::Result;
use tracing::{debug, info};

/// Collects a [`HostFacts`] snapshot from a filesystem root and a tool runner
pub struct FactCollector<'a, R: CommandRunner + ?Sized> {
    root: SysRoot,
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> FactCollector<'a, R> {
    /// Create a collector
    pub fn new(root: SysRoot, runner: &'a R) -> Self {
        Self { root, runner }
    }

    /// Check prerequisites, then read every fact
    pub fn collect(&self) -> Result<HostFacts> {
        check_prerequisites(self.runner)?;
        info!("prerequisites present, collecting host facts");

        let root = &self.root;
        let runner = self.runner;

        let kernel_cmdline = gather("kernel command line", root.read("/proc/cmdline"));
        let preemption = cpu::preemption_model(root, kernel_cmdline.value().map(String::as_str));
        debug!(%preemption, "preemption model");

        let processes = gather("process table", process::scan(root));

        let facts = HostFacts {
            identity: HostIdentity::collect(),
            cpu: gather("CPU topology", cpu::topology(runner)),
            numa: gather("NUMA topology", NumaTopology::detect(root, runner)),
            kernel_cmdline,
            preemption,
            nmi_watchdog: gather("NMI watchdog", cpu::nmi_watchdog(root)),
            numa_balancing: gather("NUMA balancing", memory::numa_balancing(root)),
            swappiness: gather("swappiness", memory::swappiness(root)),
            swap: gather("swap usage", memory::swap_usage(root)),
            memory_total: gather("total memory", memory::memory_total(root)),
            thp: gather("transparent huge pages", memory::thp_mode(root)),
            governors: gather("CPU governors", cpu::governors(root)),
            cstates: gather("C-states", cpu::cstates(root, runner)),
            io_schedulers: gather("I/O schedulers", storage::io_schedulers(root)),
            network_devices: gather("network devices", network::discover(root, runner)),
            irqbalance_active: processes.clone().map(|p| p.irqbalance_active),
            rt_processes: processes.map(|p| p.rt_processes),
        };

        info!("host facts collected");
        Ok(facts)
    }
}

/// Wrap a reading, logging why it is unavailable
fn gather<T>(what: &str, result: Result<T>) -> Fact<T> {
    if let Err(e) = &result {
        debug!(fact = what, error = %e, "fact unavailable");
    }
    result.into()
}
