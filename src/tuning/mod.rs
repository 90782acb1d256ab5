//! Advisory tuning tips
//!
//! [`select_tips`] is a pure function of the collected facts and the NIC
//! fleet summary. Every rule lives in a static table in [`rules`]; a rule
//! whose input fact is unavailable stays silent.

mod rules;

pub use rules::{Rule, RULES};

use crate::affinity::FleetAffinitySummary;
use crate::system::HostFacts;
use std::fmt;
use tracing::debug;

/// Report section a tip is printed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    /// Hostname, OS, kernel, memory
    Host,
    /// Sockets, cores, SMT, TSC, preemption
    CpuTopology,
    /// Nodes, CPU lists, distances
    NumaLayout,
    /// NIC-to-node placement
    NetworkAffinity,
    /// Governors, C-states, NMI watchdog
    PowerManagement,
    /// Swappiness, swap, THP
    Memory,
    /// Block schedulers and irqbalance
    IoAndInterrupts,
    /// Tasks under RT policies
    RealTimeProcesses,
}

impl Section {
    /// Every section in report order
    pub const ALL: [Section; 8] = [
        Section::Host,
        Section::CpuTopology,
        Section::NumaLayout,
        Section::NetworkAffinity,
        Section::PowerManagement,
        Section::Memory,
        Section::IoAndInterrupts,
        Section::RealTimeProcesses,
    ];
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "Host",
            Self::CpuTopology => "CPU Topology",
            Self::NumaLayout => "NUMA Layout",
            Self::NetworkAffinity => "Network Device Affinity",
            Self::PowerManagement => "Power Management",
            Self::Memory => "Memory",
            Self::IoAndInterrupts => "I/O and Interrupts",
            Self::RealTimeProcesses => "Real-Time Processes",
        })
    }
}

/// What a tip asks of the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipKind {
    /// A change worth making for low latency
    Recommend,
    /// Already configured for low latency
    Favorable,
    /// Something to be aware of
    Caution,
}

/// Advisory message selected for this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryTip {
    /// Id of the rule that produced it, e.g. `swappiness`
    pub rule: &'static str,
    /// Section the tip is printed under
    pub section: Section,
    /// Recommend, favorable or caution
    pub kind: TipKind,
    /// Text shown to the reader
    pub message: String,
    /// Current value, when known
    pub current_value: Option<String>,
    /// Example command; never executed
    pub implementation: Option<String>,
}

/// Pick every tip whose condition holds
///
/// Returns an empty list without evaluating any rule when tips are disabled.
pub fn select_tips(
    facts: &HostFacts,
    fleet: &FleetAffinitySummary,
    enabled: bool,
) -> Vec<AdvisoryTip> {
    if !enabled {
        return Vec::new();
    }

    let tips: Vec<AdvisoryTip> = RULES
        .iter()
        .filter_map(|rule| rule.evaluate(facts, fleet))
        .collect();

    debug!(count = tips.len(), "tips selected");
    tips
}
