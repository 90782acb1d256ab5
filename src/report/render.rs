//! Sectioned console rendering
//!
//! The renderer makes no decisions: facts, resolved affinities and tips are
//! all computed before it runs. Each section prints its facts, then the tips
//! that belong to it.

use crate::affinity::{FleetAffinitySummary, ResolvedDeviceAffinity};
use crate::error::{NumaScopeError, Result};
use crate::system::{Fact, HostFacts, NumaTopology};
use crate::tuning::{AdvisoryTip, Section, TipKind};
use console::style;
use humansize::{format_size, BINARY};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{self, Write};

const LABEL_WIDTH: usize = 22;

/// Everything one report shows
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    /// Collected snapshot
    pub facts: &'a HostFacts,
    /// One entry per PCI network device
    pub affinity: &'a [ResolvedDeviceAffinity],
    /// NIC fleet classification
    pub fleet: &'a FleetAffinitySummary,
    /// Selected tips; empty when tips are off
    pub tips: &'a [AdvisoryTip],
}

/// Write the full report
pub fn render<W: Write + ?Sized>(out: &mut W, report: &Report<'_>) -> Result<()> {
    let mut renderer = Renderer { out, report };
    renderer.render_all().map_err(NumaScopeError::Output)
}

struct Renderer<'w, 'a, W: Write + ?Sized> {
    out: &'w mut W,
    report: &'a Report<'a>,
}

impl<W: Write + ?Sized> Renderer<'_, '_, W> {
    fn render_all(&mut self) -> io::Result<()> {
        writeln!(
            self.out,
            "{}",
            style(format!("numascope report for {}", self.report.facts.identity.hostname)).bold()
        )?;

        for section in Section::ALL {
            writeln!(self.out)?;
            writeln!(self.out, "{}", style(format!("=== {} ===", section)).cyan().bold())?;
            match section {
                Section::Host => self.host()?,
                Section::CpuTopology => self.cpu_topology()?,
                Section::NumaLayout => self.numa_layout()?,
                Section::NetworkAffinity => self.network_affinity()?,
                Section::PowerManagement => self.power_management()?,
                Section::Memory => self.memory()?,
                Section::IoAndInterrupts => self.io_and_interrupts()?,
                Section::RealTimeProcesses => self.rt_processes()?,
            }
            self.tips(section)?;
        }

        self.out.flush()
    }

    fn line(&mut self, label: &str, value: impl Display) -> io::Result<()> {
        writeln!(self.out, "  {:<width$} {}", format!("{}:", label), value, width = LABEL_WIDTH)
    }

    /// Print a fact, or why it is unavailable
    fn fact<T, D: Display>(
        &mut self,
        label: &str,
        fact: &Fact<T>,
        show: impl FnOnce(&T) -> D,
    ) -> io::Result<()> {
        match fact {
            Fact::Available(value) => {
                let shown = show(value);
                self.line(label, shown)
            }
            Fact::Unavailable(reason) => self.line(label, unavailable(reason)),
        }
    }

    fn host(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        let identity = &facts.identity;
        self.line("Hostname", &identity.hostname)?;
        self.line("OS", &identity.os_name)?;
        self.line("Kernel", &identity.kernel_version)?;
        self.line("Architecture", &identity.architecture)?;
        self.fact("Memory", &facts.memory_total, |bytes| format_size(*bytes, BINARY))
    }

    fn cpu_topology(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        match &facts.cpu {
            Fact::Available(cpu) => {
                if let Some(model) = &cpu.model_name {
                    self.line("Model", model)?;
                }
                self.line("Architecture", &cpu.architecture)?;
                self.line("Sockets", cpu.sockets)?;
                self.line("Cores per socket", cpu.cores_per_socket)?;
                let smt = if cpu.threads_per_core > 1 { "SMT on" } else { "SMT off" };
                self.line("Threads per core", format!("{} ({})", cpu.threads_per_core, smt))?;
                self.line("Logical CPUs", cpu.logical_cpus())?;
                self.line("NUMA nodes", cpu.numa_nodes)?;
                let tsc = cpu.tsc();
                self.line(
                    "TSC",
                    format!("constant={} nonstop={}", yes_no(tsc.constant), yes_no(tsc.nonstop)),
                )?;
            }
            Fact::Unavailable(reason) => self.line("Topology", unavailable(reason))?,
        }
        self.line("Preemption model", facts.preemption)?;
        self.fact("Kernel command line", &facts.kernel_cmdline, |c| c.clone())
    }

    fn numa_layout(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        match &facts.numa {
            Fact::Available(numa) => {
                self.line(
                    "Nodes",
                    format!("{} ({} CPUs)", numa.nodes.len(), numa.total_cpus()),
                )?;
                for node in &numa.nodes {
                    let cpus = if node.cpus.is_empty() {
                        "no CPUs".to_string()
                    } else {
                        format!("CPUs {}", NumaTopology::format_cpu_list(&node.cpus))
                    };
                    let memory = match (node.size_mib, node.free_mib) {
                        (Some(size), Some(free)) => {
                            format!(", memory {} ({} free)", mib(size), mib(free))
                        }
                        (Some(size), None) => format!(", memory {}", mib(size)),
                        _ => String::new(),
                    };
                    self.line(&format!("Node {}", node.id), format!("{}{}", cpus, memory))?;
                }
                self.distances(numa)?;
            }
            Fact::Unavailable(reason) => self.line("Nodes", unavailable(reason))?,
        }
        self.fact("Automatic balancing", &facts.numa_balancing, |on| enabled(*on))
    }

    fn distances(&mut self, numa: &NumaTopology) -> io::Result<()> {
        let matrix = match &numa.distances {
            Fact::Available(matrix) => matrix,
            Fact::Unavailable(reason) => return self.line("Distances", unavailable(reason)),
        };

        writeln!(self.out, "  Distances:")?;
        let header: String = matrix.node_ids().iter().map(|id| format!("{:>5}", id)).collect();
        writeln!(self.out, "    node{}", header)?;
        for (i, id) in matrix.node_ids().iter().enumerate() {
            let row: String = matrix
                .row(i)
                .unwrap_or_default()
                .iter()
                .map(|d| format!("{:>5}", d))
                .collect();
            writeln!(self.out, "    {:>4}{}", id, row)?;
        }
        Ok(())
    }

    fn network_affinity(&mut self) -> io::Result<()> {
        let report = self.report;
        if let Fact::Unavailable(reason) = &report.facts.network_devices {
            return self.line("Devices", unavailable(reason));
        }
        if report.affinity.is_empty() {
            return self.line("Devices", "no PCI network devices");
        }

        let drivers: BTreeMap<&str, &str> = report
            .facts
            .network_devices
            .value()
            .into_iter()
            .flatten()
            .filter_map(|d| d.driver.as_deref().map(|drv| (d.name.as_str(), drv)))
            .collect();

        for device in report.affinity {
            let driver = drivers.get(device.interface.as_str()).copied().unwrap_or("-");
            writeln!(
                self.out,
                "  {:<16} {:<14} {:<12} {} (source: {})",
                device.interface, device.pci_address, driver, device.node, device.source
            )?;
        }

        for device in report.affinity.iter().filter(|d| d.disagreement) {
            let warning = format!(
                "WARNING: {}: sysfs reports node {} but lspci reports node {}; using sysfs",
                device.interface,
                hint(device.sysfs_hint),
                hint(device.pci_hint)
            );
            writeln!(self.out, "  {}", style(warning).yellow())?;
        }

        self.line("NIC placement", report.fleet.kind)
    }

    fn power_management(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        match &facts.governors {
            Fact::Available(governors) => {
                let mut by_governor: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
                for (cpu, governor) in governors {
                    by_governor.entry(governor.as_str()).or_default().push(*cpu);
                }
                for (governor, cpus) in by_governor {
                    self.line(
                        "Governor",
                        format!("{} (CPUs {})", governor, NumaTopology::format_cpu_list(&cpus)),
                    )?;
                }
            }
            Fact::Unavailable(reason) => self.line("Governor", unavailable(reason))?,
        }
        self.fact("C-states", &facts.cstates, |states| states.join(" "))?;
        self.fact("NMI watchdog", &facts.nmi_watchdog, |on| enabled(*on))
    }

    fn memory(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        self.fact("Swappiness", &facts.swappiness, |v| v.to_string())?;
        self.fact("Swap", &facts.swap, |swap| {
            if swap.total_kib == 0 {
                "none configured".to_string()
            } else {
                format!(
                    "{} used of {}",
                    format_size(swap.used_kib * 1024, BINARY),
                    format_size(swap.total_kib * 1024, BINARY)
                )
            }
        })?;
        self.fact("Transparent hugepages", &facts.thp, |mode| mode.to_string())
    }

    fn io_and_interrupts(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        match &facts.io_schedulers {
            Fact::Available(schedulers) => {
                for (device, scheduler) in schedulers {
                    let label = format!("Scheduler {}", device);
                    self.fact(&label, scheduler, |s| s.clone())?;
                }
            }
            Fact::Unavailable(reason) => self.line("I/O schedulers", unavailable(reason))?,
        }
        self.fact("irqbalance", &facts.irqbalance_active, |on| {
            let state = if *on { "running" } else { "not running" };
            state.to_string()
        })
    }

    fn rt_processes(&mut self) -> io::Result<()> {
        let facts = self.report.facts;
        let processes = match &facts.rt_processes {
            Fact::Available(processes) => processes,
            Fact::Unavailable(reason) => return self.line("Processes", unavailable(reason)),
        };
        if processes.is_empty() {
            return self.line("Processes", "none");
        }

        let numa = facts.numa.value();
        writeln!(
            self.out,
            "  {:>7}  {:<8} {:>4}  {:<10} {}",
            "PID", "POLICY", "PRIO", "CPU", "COMMAND"
        )?;
        for process in processes {
            let cpu = match process.last_cpu {
                Some(cpu) => {
                    let node = u32::try_from(cpu)
                        .ok()
                        .and_then(|cpu| numa.and_then(|n| n.node_of_cpu(cpu)));
                    match node {
                        Some(node) => format!("{} (n{})", cpu, node),
                        None => cpu.to_string(),
                    }
                }
                None => "-".to_string(),
            };
            writeln!(
                self.out,
                "  {:>7}  {:<8} {:>4}  {:<10} {}",
                process.pid, process.policy, process.priority, cpu, process.command
            )?;
        }
        Ok(())
    }

    fn tips(&mut self, section: Section) -> io::Result<()> {
        let report = self.report;
        let tips: Vec<&AdvisoryTip> = report.tips.iter().filter(|t| t.section == section).collect();
        if tips.is_empty() {
            return Ok(());
        }

        writeln!(self.out)?;
        for tip in tips {
            let marker = match tip.kind {
                TipKind::Recommend => style("[!]").yellow(),
                TipKind::Favorable => style("[+]").green(),
                TipKind::Caution => style("[~]").red(),
            };
            writeln!(self.out, "  {} {}", marker, tip.message)?;
            if let Some(current) = &tip.current_value {
                writeln!(self.out, "      Current: {}", current)?;
            }
            if let Some(command) = &tip.implementation {
                for line in command.lines() {
                    writeln!(self.out, "      $ {}", style(line).dim())?;
                }
            }
        }
        Ok(())
    }
}

fn unavailable(reason: &str) -> String {
    style(format!("unavailable ({})", reason)).dim().to_string()
}

fn enabled(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn mib(value: u64) -> String {
    format_size(value * 1024 * 1024, BINARY)
}

fn hint(value: Option<i32>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
