//! The tip rule table
//!
//! Rules are listed in report-section order so the selected tips come out
//! already grouped. Each check returns `None` when its fact is unavailable
//! or its condition does not hold.

use super::{AdvisoryTip, Section, TipKind};
use crate::affinity::{FleetAffinitySummary, FleetKind};
use crate::system::cpu::is_deep_cstate;
use crate::system::{cmdline_value, HostFacts, PreemptionModel, ThpMode};
use humansize::{format_size, BINARY};
use std::fmt::Display;

/// Swappiness above this is worth lowering
const SWAPPINESS_CEILING: u8 = 10;

type Check = fn(&HostFacts, &FleetAffinitySummary) -> Option<Advice>;

/// One conditional tip
pub struct Rule {
    /// Stable identifier, e.g. `thp`
    pub id: &'static str,
    /// Section its tip belongs to
    pub section: Section,
    check: Check,
}

impl Rule {
    /// Evaluate against a snapshot
    pub fn evaluate(
        &self,
        facts: &HostFacts,
        fleet: &FleetAffinitySummary,
    ) -> Option<AdvisoryTip> {
        (self.check)(facts, fleet).map(|advice| AdvisoryTip {
            rule: self.id,
            section: self.section,
            kind: advice.kind,
            message: advice.message,
            current_value: advice.current_value,
            implementation: advice.implementation,
        })
    }
}

struct Advice {
    kind: TipKind,
    message: String,
    current_value: Option<String>,
    implementation: Option<String>,
}

impl Advice {
    fn new(kind: TipKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            current_value: None,
            implementation: None,
        }
    }

    fn recommend(message: impl Into<String>) -> Self {
        Self::new(TipKind::Recommend, message)
    }

    fn favorable(message: impl Into<String>) -> Self {
        Self::new(TipKind::Favorable, message)
    }

    fn caution(message: impl Into<String>) -> Self {
        Self::new(TipKind::Caution, message)
    }

    fn current(mut self, value: impl Display) -> Self {
        self.current_value = Some(value.to_string());
        self
    }

    fn command(mut self, command: impl Into<String>) -> Self {
        self.implementation = Some(command.into());
        self
    }
}

/// All rules, in report order
pub static RULES: &[Rule] = &[
    Rule {
        id: "smt",
        section: Section::CpuTopology,
        check: smt,
    },
    Rule {
        id: "isolcpus",
        section: Section::CpuTopology,
        check: isolcpus,
    },
    Rule {
        id: "tickless",
        section: Section::CpuTopology,
        check: tickless,
    },
    Rule {
        id: "preemption",
        section: Section::CpuTopology,
        check: preemption,
    },
    Rule {
        id: "tsc",
        section: Section::CpuTopology,
        check: tsc,
    },
    Rule {
        id: "numa-balancing",
        section: Section::NumaLayout,
        check: numa_balancing,
    },
    Rule {
        id: "numa-distance",
        section: Section::NumaLayout,
        check: numa_distance,
    },
    Rule {
        id: "nic-locality",
        section: Section::NetworkAffinity,
        check: nic_locality,
    },
    Rule {
        id: "governor",
        section: Section::PowerManagement,
        check: governor,
    },
    Rule {
        id: "cstates",
        section: Section::PowerManagement,
        check: cstates,
    },
    Rule {
        id: "nmi-watchdog",
        section: Section::PowerManagement,
        check: nmi_watchdog,
    },
    Rule {
        id: "swappiness",
        section: Section::Memory,
        check: swappiness,
    },
    Rule {
        id: "swap-in-use",
        section: Section::Memory,
        check: swap_in_use,
    },
    Rule {
        id: "thp",
        section: Section::Memory,
        check: thp,
    },
    Rule {
        id: "io-scheduler",
        section: Section::IoAndInterrupts,
        check: io_scheduler,
    },
    Rule {
        id: "irqbalance",
        section: Section::IoAndInterrupts,
        check: irqbalance,
    },
];

fn smt(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let threads = facts.threads_per_core()?;
    (threads > 1).then(|| {
        Advice::recommend(
            "SMT is enabled; sibling threads share execution units. \
             Evaluate disabling it for latency-critical workloads",
        )
        .current(format!("{} threads per core", threads))
        .command("echo off > /sys/devices/system/cpu/smt/control   # or boot with 'nosmt'")
    })
}

fn isolcpus(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let cmdline = facts.kernel_cmdline.value()?;
    Some(match cmdline_value(cmdline, "isolcpus") {
        Some(cpus) => Advice::favorable("CPUs are isolated from the general scheduler")
            .current(format!("isolcpus={}", cpus)),
        None => Advice::recommend(
            "Isolate the CPUs that run latency-critical threads from the general scheduler",
        )
        .command("add 'isolcpus=<cpu-list>' to the kernel command line"),
    })
}

fn tickless(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let cmdline = facts.kernel_cmdline.value()?;
    let missing: Vec<&str> = ["nohz_full", "rcu_nocbs"]
        .into_iter()
        .filter(|param| cmdline_value(cmdline, param).is_none())
        .collect();

    (!missing.is_empty()).then(|| {
        Advice::recommend("Stop the scheduler tick and offload RCU callbacks on isolated CPUs")
            .current(format!("{} not set", missing.join(", ")))
            .command("add 'nohz_full=<cpu-list> rcu_nocbs=<cpu-list>' to the kernel command line")
    })
}

fn preemption(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    match facts.preemption {
        PreemptionModel::Unknown => None,
        PreemptionModel::RealTime => Some(Advice::favorable("Kernel is built with PREEMPT_RT")),
        model => Some(
            Advice::recommend("Use a PREEMPT_RT kernel for bounded scheduling latency")
                .current(model),
        ),
    }
}

// CPUs without a time stamp counter (ARM, POWER) have nothing to report
fn tsc(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let cpu = facts.cpu.value().filter(|cpu| cpu.has_tsc())?;
    let flags = cpu.tsc();
    Some(if flags.is_reliable() {
        Advice::favorable("TSC is constant and nonstop; it is a stable clocksource")
    } else {
        Advice::caution(
            "TSC may drift across frequency changes or deep idle; check the active clocksource",
        )
        .current(format!(
            "constant_tsc={} nonstop_tsc={}",
            flags.constant, flags.nonstop
        ))
        .command("cat /sys/devices/system/clocksource/clocksource0/current_clocksource")
    })
}

fn numa_balancing(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    facts.numa_balancing.value()?.then(|| {
        Advice::recommend(
            "Automatic NUMA balancing migrates pages behind pinned workloads; disable it",
        )
        .current("enabled")
        .command("sysctl -w kernel.numa_balancing=0")
    })
}

fn numa_distance(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let numa = facts.numa.value()?;
    if !numa.is_numa_system {
        return None;
    }
    let ratio = numa.distances.value()?.worst_remote_ratio()?;
    Some(
        Advice::recommend(
            "Remote memory access is slower than local; \
             bind each process's CPUs and memory to one node",
        )
        .current(format!("worst remote/local distance ratio {:.1}x", ratio))
        .command("numactl --cpunodebind=<node> --membind=<node> <command>"),
    )
}

fn nic_locality(_: &HostFacts, fleet: &FleetAffinitySummary) -> Option<Advice> {
    match fleet.kind {
        FleetKind::Concentrated(node) => Some(
            Advice::recommend(format!(
                "All network devices are attached to NUMA node {node}; run network-facing \
                 processes on node {node} and reserve the other nodes for compute"
            ))
            .command(format!("numactl --cpunodebind={node} --membind={node} <network-process>")),
        ),
        FleetKind::Distributed => {
            let placement: Vec<String> = fleet
                .per_node
                .iter()
                .map(|(node, interfaces)| format!("{} on node {}", interfaces.join(", "), node))
                .collect();
            Some(
                Advice::recommend(format!(
                    "Network devices span several NUMA nodes; pin each device's IRQs and \
                     processing threads to its own node: {}",
                    placement.join("; ")
                ))
                .command("echo <cpu-list> > /proc/irq/<irq>/smp_affinity_list"),
            )
        }
        FleetKind::Indeterminate => None,
    }
}

fn governor(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let governors = facts.governors.value()?;
    let slow: Vec<u32> = governors
        .iter()
        .filter(|(_, g)| g.as_str() != "performance")
        .map(|(cpu, _)| *cpu)
        .collect();

    Some(if slow.is_empty() {
        Advice::favorable("Every CPU uses the performance governor")
    } else {
        let mut names: Vec<&str> = governors
            .values()
            .map(String::as_str)
            .filter(|g| *g != "performance")
            .collect();
        names.sort_unstable();
        names.dedup();
        Advice::recommend("Switch CPU frequency scaling to the performance governor")
            .current(format!(
                "{} on {} of {} CPUs",
                names.join("/"),
                slow.len(),
                governors.len()
            ))
            .command("cpupower frequency-set -g performance")
    })
}

fn cstates(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let states = facts.cstates.value()?;
    let deep: Vec<&str> = states
        .iter()
        .map(String::as_str)
        .filter(|s| is_deep_cstate(s))
        .collect();

    Some(if deep.is_empty() {
        Advice::favorable("No deep C-states (C3/C6/C7) are available")
    } else {
        Advice::recommend(
            "Deep C-states add wake-up latency; disable them for latency-critical CPUs",
        )
        .current(deep.join(", "))
        .command(
            "cpupower idle-set -D 2   \
             # or boot with 'intel_idle.max_cstate=1 processor.max_cstate=1'",
        )
    })
}

fn nmi_watchdog(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    facts.nmi_watchdog.value()?.then(|| {
        Advice::caution(
            "The NMI watchdog fires periodic interrupts that add jitter; \
             disabling it removes hard-lockup detection",
        )
        .current("enabled")
        .command("sysctl -w kernel.nmi_watchdog=0")
    })
}

fn swappiness(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let value = *facts.swappiness.value()?;
    let advice = match value {
        0 => Advice::favorable(
            "Swappiness is 0; the kernel swaps only under memory pressure that would otherwise OOM",
        ),
        v if v <= SWAPPINESS_CEILING => Advice::favorable("Swappiness is low"),
        _ => Advice::recommend(format!(
            "Lower swappiness to {} or less to keep working sets in RAM",
            SWAPPINESS_CEILING
        ))
        .command(format!("sysctl -w vm.swappiness={}", SWAPPINESS_CEILING)),
    };
    Some(advice.current(value))
}

fn swap_in_use(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let swap = facts.swap.value()?;
    swap.in_use().then(|| {
        Advice::caution("Pages are swapped out; touching them costs a disk read")
            .current(format_size(swap.used_kib * 1024, BINARY))
    })
}

fn thp(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    match facts.thp.value()? {
        ThpMode::Unknown => None,
        ThpMode::Never => Some(Advice::favorable("Transparent huge pages are disabled")),
        mode => Some(
            Advice::recommend(
                "Disable transparent huge pages; compaction and khugepaged cause latency spikes",
            )
            .current(mode)
            .command("echo never > /sys/kernel/mm/transparent_hugepage/enabled"),
        ),
    }
}

fn io_scheduler(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    let known: Vec<(&String, &String)> = facts
        .io_schedulers
        .value()?
        .iter()
        .filter_map(|(dev, scheduler)| scheduler.value().map(|s| (dev, s)))
        .collect();
    if known.is_empty() {
        return None;
    }

    let queued: Vec<String> = known
        .iter()
        .filter(|(_, s)| s.as_str() != "none")
        .map(|(dev, s)| format!("{}={}", dev, s))
        .collect();

    Some(if queued.is_empty() {
        Advice::favorable("Every block device uses the 'none' scheduler")
    } else {
        Advice::recommend("Use the 'none' I/O scheduler on low-latency (NVMe/SSD) devices")
            .current(queued.join(", "))
            .command("echo none > /sys/block/<device>/queue/scheduler")
    })
}

fn irqbalance(facts: &HostFacts, _: &FleetAffinitySummary) -> Option<Advice> {
    Some(if *facts.irqbalance_active.value()? {
        Advice::recommend(
            "irqbalance moves interrupts at runtime; stop it and pin IRQs to housekeeping CPUs",
        )
        .current("running")
        .command("systemctl disable --now irqbalance")
    } else {
        Advice::favorable("irqbalance is not running")
    })
}

#[cfg(test)]
mod tests {
    use super::super::select_tips;
    use super::*;
    use crate::system::{CpuTopology, DistanceMatrix, Fact, NumaNode, NumaTopology, SwapUsage};
    use std::collections::BTreeMap;

    fn only(facts: &HostFacts, fleet: &FleetAffinitySummary, id: &str) -> Option<AdvisoryTip> {
        select_tips(facts, fleet, true).into_iter().find(|t| t.rule == id)
    }

    fn no_fleet() -> FleetAffinitySummary {
        FleetAffinitySummary::default()
    }

    fn fleet(kind: FleetKind, per_node: &[(u32, &[&str])]) -> FleetAffinitySummary {
        FleetAffinitySummary {
            kind,
            per_node: per_node
                .iter()
                .map(|(n, ifs)| (*n, ifs.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }

    #[test]
    fn test_isolcpus() {
        let mut facts = HostFacts::blank();
        facts.kernel_cmdline = Fact::Available("ro quiet".to_string());
        assert_eq!(only(&facts, &no_fleet(), "isolcpus").unwrap().kind, TipKind::Recommend);

        facts.kernel_cmdline =
            Fact::Available("ro isolcpus=2-7 nohz_full=2-7 rcu_nocbs=2-7".to_string());
        let tip = only(&facts, &no_fleet(), "isolcpus").unwrap();
        assert_eq!(tip.kind, TipKind::Favorable);
        assert_eq!(tip.current_value.as_deref(), Some("isolcpus=2-7"));
        assert!(only(&facts, &no_fleet(), "tickless").is_none());
    }

    #[test]
    fn test_tickless_names_missing_params() {
        let mut facts = HostFacts::blank();
        facts.kernel_cmdline = Fact::Available("ro nohz_full=2-7".to_string());
        let tip = only(&facts, &no_fleet(), "tickless").unwrap();
        assert_eq!(tip.current_value.as_deref(), Some("rcu_nocbs not set"));
    }

    #[test]
    fn test_preemption() {
        let mut facts = HostFacts::blank();
        assert!(only(&facts, &no_fleet(), "preemption").is_none());

        facts.preemption = PreemptionModel::Voluntary;
        assert_eq!(only(&facts, &no_fleet(), "preemption").unwrap().kind, TipKind::Recommend);

        facts.preemption = PreemptionModel::RealTime;
        assert_eq!(only(&facts, &no_fleet(), "preemption").unwrap().kind, TipKind::Favorable);
    }

    #[test]
    fn test_nic_locality_concentrated() {
        let facts = HostFacts::blank();
        let summary = fleet(FleetKind::Concentrated(0), &[(0, &["eth0", "eth1", "eth2"])]);
        let tip = only(&facts, &summary, "nic-locality").unwrap();
        assert!(tip.message.contains("node 0"));
        assert!(tip.message.contains("compute"));
    }

    #[test]
    fn test_nic_locality_distributed_names_nodes() {
        let facts = HostFacts::blank();
        let summary = fleet(FleetKind::Distributed, &[(0, &["eth0", "eth2"]), (1, &["eth1"])]);
        let tip = only(&facts, &summary, "nic-locality").unwrap();
        assert!(tip.message.contains("eth0, eth2 on node 0"));
        assert!(tip.message.contains("eth1 on node 1"));
    }

    #[test]
    fn test_nic_locality_indeterminate_is_silent() {
        assert!(only(&HostFacts::blank(), &no_fleet(), "nic-locality").is_none());
    }

    #[test]
    fn test_governor() {
        let mut facts = HostFacts::blank();
        facts.governors = Fact::Available(BTreeMap::from([
            (0, "performance".to_string()),
            (1, "powersave".to_string()),
        ]));
        let tip = only(&facts, &no_fleet(), "governor").unwrap();
        assert_eq!(tip.kind, TipKind::Recommend);
        assert_eq!(tip.current_value.as_deref(), Some("powersave on 1 of 2 CPUs"));

        facts.governors = Fact::Available(BTreeMap::from([(0, "performance".to_string())]));
        assert_eq!(only(&facts, &no_fleet(), "governor").unwrap().kind, TipKind::Favorable);
    }

    #[test]
    fn test_cstates() {
        let mut facts = HostFacts::blank();
        facts.cstates =
            Fact::Available(vec!["POLL".into(), "C1".into(), "C1E".into(), "C6".into()]);
        let tip = only(&facts, &no_fleet(), "cstates").unwrap();
        assert_eq!(tip.kind, TipKind::Recommend);
        assert_eq!(tip.current_value.as_deref(), Some("C6"));

        facts.cstates = Fact::Available(vec!["POLL".into(), "C1".into()]);
        assert_eq!(only(&facts, &no_fleet(), "cstates").unwrap().kind, TipKind::Favorable);
    }

    #[test]
    fn test_nmi_watchdog() {
        let mut facts = HostFacts::blank();
        facts.nmi_watchdog = Fact::Available(true);
        assert_eq!(only(&facts, &no_fleet(), "nmi-watchdog").unwrap().kind, TipKind::Caution);

        facts.nmi_watchdog = Fact::Available(false);
        assert!(only(&facts, &no_fleet(), "nmi-watchdog").is_none());
    }

    #[test]
    fn test_swap_in_use_independent_of_swappiness() {
        let mut facts = HostFacts::blank();
        facts.swappiness = Fact::Available(1);
        facts.swap = Fact::Available(SwapUsage {
            total_kib: 8192,
            used_kib: 1024,
        });
        let tip = only(&facts, &no_fleet(), "swap-in-use").unwrap();
        assert_eq!(tip.kind, TipKind::Caution);
        assert_eq!(tip.current_value.as_deref(), Some("1 MiB"));
        assert_eq!(only(&facts, &no_fleet(), "swappiness").unwrap().kind, TipKind::Favorable);

        facts.swap = Fact::Available(SwapUsage {
            total_kib: 8192,
            used_kib: 0,
        });
        assert!(only(&facts, &no_fleet(), "swap-in-use").is_none());
    }

    #[test]
    fn test_thp() {
        let mut facts = HostFacts::blank();
        facts.thp = Fact::Available(ThpMode::Madvise);
        let tip = only(&facts, &no_fleet(), "thp").unwrap();
        assert_eq!(tip.kind, TipKind::Recommend);
        assert_eq!(tip.current_value.as_deref(), Some("madvise"));

        facts.thp = Fact::Available(ThpMode::Never);
        assert_eq!(only(&facts, &no_fleet(), "thp").unwrap().kind, TipKind::Favorable);

        facts.thp = Fact::Available(ThpMode::Unknown);
        assert!(only(&facts, &no_fleet(), "thp").is_none());
    }

    #[test]
    fn test_io_scheduler() {
        let mut facts = HostFacts::blank();
        facts.io_schedulers = Fact::Available(BTreeMap::from([
            ("nvme0n1".to_string(), Fact::Available("none".to_string())),
            ("sda".to_string(), Fact::Available("mq-deadline".to_string())),
            ("dm-0".to_string(), Fact::unavailable("no queue")),
        ]));
        let tip = only(&facts, &no_fleet(), "io-scheduler").unwrap();
        assert_eq!(tip.current_value.as_deref(), Some("sda=mq-deadline"));

        facts.io_schedulers = Fact::Available(BTreeMap::from([(
            "dm-0".to_string(),
            Fact::unavailable("no queue"),
        )]));
        assert!(only(&facts, &no_fleet(), "io-scheduler").is_none());
    }

    #[test]
    fn test_irqbalance() {
        let mut facts = HostFacts::blank();
        facts.irqbalance_active = Fact::Available(true);
        assert_eq!(only(&facts, &no_fleet(), "irqbalance").unwrap().kind, TipKind::Recommend);

        facts.irqbalance_active = Fact::Available(false);
        assert_eq!(only(&facts, &no_fleet(), "irqbalance").unwrap().kind, TipKind::Favorable);
    }

    #[test]
    fn test_numa_distance() {
        let node = |id: u32| NumaNode {
            id,
            cpus: vec![id],
            size_mib: None,
            free_mib: None,
        };
        let mut facts = HostFacts::blank();
        facts.numa = Fact::Available(NumaTopology {
            nodes: vec![node(0), node(1)],
            distances: Fact::Available(
                DistanceMatrix::new(vec![0, 1], vec![vec![10, 32], vec![32, 10]]).unwrap(),
            ),
            is_numa_system: true,
        });
        let tip = only(&facts, &no_fleet(), "numa-distance").unwrap();
        assert_eq!(
            tip.current_value.as_deref(),
            Some("worst remote/local distance ratio 3.2x")
        );

        facts.numa_balancing = Fact::Available(true);
        assert!(only(&facts, &no_fleet(), "numa-balancing").is_some());
    }

    fn cpu(architecture: &str, flags: &[&str]) -> CpuTopology {
        CpuTopology {
            architecture: architecture.to_string(),
            model_name: None,
            threads_per_core: 1,
            cores_per_socket: 4,
            sockets: 1,
            numa_nodes: 1,
            flags: flags.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_tsc() {
        let mut facts = HostFacts::blank();
        facts.cpu = Fact::Available(cpu("x86_64", &["fpu", "tsc", "constant_tsc"]));
        let tip = only(&facts, &no_fleet(), "tsc").unwrap();
        assert_eq!(tip.kind, TipKind::Caution);
        assert_eq!(
            tip.current_value.as_deref(),
            Some("constant_tsc=true nonstop_tsc=false")
        );

        facts.cpu = Fact::Available(cpu("x86_64", &["tsc", "constant_tsc", "nonstop_tsc"]));
        let tip = only(&facts, &no_fleet(), "tsc").unwrap();
        assert_eq!(tip.kind, TipKind::Favorable);
    }

    #[test]
    fn test_tsc_silent_without_counter() {
        let mut facts = HostFacts::blank();
        facts.cpu = Fact::Available(cpu("aarch64", &["fp", "asimd", "evtstrm", "aes"]));
        assert!(only(&facts, &no_fleet(), "tsc").is_none());
    }
}
