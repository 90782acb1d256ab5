//! NUMA affinity resolution for network devices
//!
//! A device can report its NUMA node through sysfs and through PCI
//! introspection. sysfs is authoritative when it holds a real node; `-1`
//! means the firmware left it unset, and PCI introspection is used instead.
//! A disagreement between two real values is flagged but never changes the
//! outcome.

use crate::system::NetworkDevice;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Which signal produced the resolved node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinitySource {
    /// `device/numa_node`
    Sysfs,
    /// `lspci -v`
    PciIntrospection,
    /// Neither source held a valid node
    None,
}

impl fmt::Display for AffinitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sysfs => "sysfs",
            Self::PciIntrospection => "lspci",
            Self::None => "none",
        })
    }
}

/// Outcome for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedNode {
    /// Device is attached to this node
    Node(u32),
    /// No source held a valid node
    Undetermined,
}

impl ResolvedNode {
    /// The node id, if determined
    pub fn node(&self) -> Option<u32> {
        match self {
            Self::Node(n) => Some(*n),
            Self::Undetermined => None,
        }
    }
}

impl fmt::Display for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(n) => write!(f, "node {}", n),
            Self::Undetermined => f.write_str("undetermined"),
        }
    }
}

/// Resolved affinity of one network device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDeviceAffinity {
    /// Interface name
    pub interface: String,
    /// PCI bus address
    pub pci_address: String,
    /// Authoritative node
    pub node: ResolvedNode,
    /// Both sources hold valid, different nodes
    pub disagreement: bool,
    /// Where `node` came from
    pub source: AffinitySource,
    /// Raw sysfs hint, kept for the disagreement warning
    pub sysfs_hint: Option<i32>,
    /// Raw PCI hint, kept for the disagreement warning
    pub pci_hint: Option<i32>,
}

/// A hint holds a real node when present and non-negative
fn valid(hint: Option<i32>) -> Option<u32> {
    hint.and_then(|n| u32::try_from(n).ok())
}

/// Resolve one device's NUMA node from its two hints
pub fn resolve(device: &NetworkDevice) -> ResolvedDeviceAffinity {
    let sysfs = valid(device.sysfs_numa_node);
    let pci = valid(device.pci_numa_node);

    let (node, source) = match (sysfs, pci) {
        (Some(n), _) => (ResolvedNode::Node(n), AffinitySource::Sysfs),
        (None, Some(n)) => (ResolvedNode::Node(n), AffinitySource::PciIntrospection),
        (None, None) => (ResolvedNode::Undetermined, AffinitySource::None),
    };

    let disagreement = matches!((sysfs, pci), (Some(a), Some(b)) if a != b);
    if disagreement {
        warn!(
            interface = %device.name,
            sysfs = ?sysfs,
            pci = ?pci,
            "NUMA node sources disagree, using sysfs"
        );
    }

    ResolvedDeviceAffinity {
        interface: device.name.clone(),
        pci_address: device.pci_address.clone(),
        node,
        disagreement,
        source,
        sysfs_hint: device.sysfs_numa_node,
        pci_hint: device.pci_numa_node,
    }
}

/// Resolve every device, preserving order
pub fn resolve_all(devices: &[NetworkDevice]) -> Vec<ResolvedDeviceAffinity> {
    devices.iter().map(resolve).collect()
}

/// How the NIC fleet is spread over NUMA nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FleetKind {
    /// Every determined device sits on this node
    Concentrated(u32),
    /// Determined devices span two or more nodes
    Distributed,
    /// No device has a determined node
    Indeterminate,
}

impl fmt::Display for FleetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concentrated(n) => write!(f, "concentrated on node {}", n),
            Self::Distributed => f.write_str("distributed across nodes"),
            Self::Indeterminate => f.write_str("indeterminate"),
        }
    }
}

/// Fleet classification plus the interfaces found on each node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetAffinitySummary {
    /// Classification
    pub kind: FleetKind,
    /// Node → interfaces resolved to it
    pub per_node: BTreeMap<u32, Vec<String>>,
}

impl Default for FleetAffinitySummary {
    fn default() -> Self {
        Self {
            kind: FleetKind::Indeterminate,
            per_node: BTreeMap::new(),
        }
    }
}

impl FleetAffinitySummary {
    /// Classify resolved devices; undetermined ones do not count
    pub fn classify(resolved: &[ResolvedDeviceAffinity]) -> Self {
        let mut per_node: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for device in resolved {
            if let Some(node) = device.node.node() {
                per_node.entry(node).or_default().push(device.interface.clone());
            }
        }

        let distinct: BTreeSet<u32> = per_node.keys().copied().collect();
        let kind = match distinct.len() {
            0 => FleetKind::Indeterminate,
            1 => distinct
                .first()
                .copied()
                .map_or(FleetKind::Indeterminate, FleetKind::Concentrated),
            _ => FleetKind::Distributed,
        };

        Self { kind, per_node }
    }
}
