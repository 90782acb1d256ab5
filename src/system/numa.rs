//! NUMA (Non-Uniform Memory Access) topology detection
//!
//! Reads the node layout from `numactl --hardware`. When its output cannot
//! be used the layout is rebuilt from `/sys/devices/system/node`, and a
//! host without NUMA support is reported as a single node holding every CPU.

use super::facts::Fact;
use super::source::{CommandRunner, SysRoot};
use crate::error::{NumaScopeError, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Local access cost the kernel reports for a node to itself
pub const LOCAL_DISTANCE: u32 = 10;

/// NUMA node information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumaNode {
    /// Node ID
    pub id: u32,
    /// CPUs belonging to this node, ascending
    pub cpus: Vec<u32>,
    /// Total memory in MiB
    pub size_mib: Option<u64>,
    /// Free memory in MiB
    pub free_mib: Option<u64>,
}

/// Square, symmetric node distance table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    node_ids: Vec<u32>,
    rows: Vec<Vec<u32>>,
}

impl DistanceMatrix {
    /// Build a matrix, rejecting tables that are not square and symmetric
    /// or where a remote distance is below the local one
    pub fn new(node_ids: Vec<u32>, rows: Vec<Vec<u32>>) -> Result<Self> {
        let n = node_ids.len();
        if n == 0 {
            return Err(NumaScopeError::InvalidTopology("no nodes".to_string()));
        }
        if rows.len() != n {
            return Err(NumaScopeError::InvalidTopology(format!(
                "{} rows for {} nodes",
                rows.len(),
                n
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(NumaScopeError::InvalidTopology(format!(
                    "row for node {} has {} entries, expected {}",
                    node_ids[i],
                    row.len(),
                    n
                )));
            }
            for j in 0..n {
                if row[j] != rows[j][i] {
                    return Err(NumaScopeError::InvalidTopology(format!(
                        "distance {}→{} is {} but {}→{} is {}",
                        node_ids[i], node_ids[j], row[j], node_ids[j], node_ids[i], rows[j][i]
                    )));
                }
                if i != j && row[j] < row[i] {
                    return Err(NumaScopeError::InvalidTopology(format!(
                        "remote distance {}→{} ({}) below local ({})",
                        node_ids[i], node_ids[j], row[j], row[i]
                    )));
                }
            }
        }
        Ok(Self { node_ids, rows })
    }

    /// Node ids in row order
    pub fn node_ids(&self) -> &[u32] {
        &self.node_ids
    }

    /// Distance vector from the node at `index`
    pub fn row(&self, index: usize) -> Option<&[u32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Largest remote/local distance ratio, `None` on a single node
    pub fn worst_remote_ratio(&self) -> Option<f64> {
        let mut worst: Option<f64> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let local = row[i].max(1) as f64;
            for (j, &d) in row.iter().enumerate() {
                if i != j {
                    let ratio = d as f64 / local;
                    worst = Some(worst.map_or(ratio, |w| w.max(ratio)));
                }
            }
        }
        worst
    }
}

/// NUMA topology information
#[derive(Debug, Clone, PartialEq)]
pub struct NumaTopology {
    /// NUMA nodes, sorted by id
    pub nodes: Vec<NumaNode>,
    /// Inter-node distances
    pub distances: Fact<DistanceMatrix>,
    /// More than one node present
    pub is_numa_system: bool,
}

impl NumaTopology {
    /// Detect NUMA topology from `numactl --hardware`, falling back to sysfs
    pub fn detect<R: CommandRunner + ?Sized>(root: &SysRoot, runner: &R) -> Result<Self> {
        match runner.run("numactl", &["--hardware"]) {
            Ok(output) => match Self::parse_numactl(&output) {
                Ok(topology) => return Ok(topology),
                Err(e) => warn!(error = %e, "unusable numactl output, reading sysfs"),
            },
            Err(e) if e.to_string().contains("No NUMA available") => {
                debug!("kernel has no NUMA support");
                return Ok(Self::single_node());
            }
            Err(e) => debug!(error = %e, "numactl failed, reading sysfs"),
        }

        Self::from_sysfs(root)
    }

    /// Parse `numactl --hardware` output
    pub fn parse_numactl(output: &str) -> Result<Self> {
        if output.contains("No NUMA available") {
            return Ok(Self::single_node());
        }

        let mut nodes: BTreeMap<u32, NumaNode> = BTreeMap::new();
        let mut header: Option<Vec<u32>> = None;
        let mut rows: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        let mut in_distances = false;

        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("available:") {
                continue;
            }
            if line == "node distances:" {
                in_distances = true;
                continue;
            }

            if in_distances {
                if let Some(ids) = line.strip_prefix("node") {
                    header = Some(parse_numbers(ids, "distance header")?);
                } else if let Some((id, values)) = line.split_once(':') {
                    let id = parse_number::<u32>(id, "distance row")?;
                    rows.insert(id, parse_numbers(values, "distance row")?);
                }
                continue;
            }

            // "node 0 cpus: 0 1 2", "node 0 size: 64304 MB", "node 0 free: 601 MB"
            let Some(rest) = line.strip_prefix("node ") else {
                continue;
            };
            let Some((head, value)) = rest.split_once(':') else {
                continue;
            };
            let mut head = head.split_whitespace();
            let (Some(id), Some(field)) = (head.next(), head.next()) else {
                continue;
            };
            let id = parse_number::<u32>(id, "node id")?;
            let node = nodes.entry(id).or_insert_with(|| NumaNode {
                id,
                cpus: Vec::new(),
                size_mib: None,
                free_mib: None,
            });

            match field {
                "cpus" => node.cpus = parse_numbers(value, "node cpus")?,
                "size" => node.size_mib = Some(parse_mib(value)?),
                "free" => node.free_mib = Some(parse_mib(value)?),
                _ => {}
            }
        }

        if nodes.is_empty() {
            return Err(NumaScopeError::empty("numactl --hardware"));
        }

        let node_ids: Vec<u32> = nodes.keys().copied().collect();
        let distances = match header {
            Some(header) if header != node_ids => Fact::unavailable(NumaScopeError::InvalidTopology(
                format!("distance header {:?} does not match nodes {:?}", header, node_ids),
            )),
            Some(_) => {
                let rows = node_ids
                    .iter()
                    .map(|id| rows.remove(id).unwrap_or_default())
                    .collect();
                Self::checked(node_ids, rows)
            }
            None => Fact::unavailable("numactl printed no distance table"),
        };

        Ok(Self::from_nodes(nodes.into_values().collect(), distances))
    }

    /// Rebuild the topology from `/sys/devices/system/node`
    pub fn from_sysfs(root: &SysRoot) -> Result<Self> {
        let base = "/sys/devices/system/node";
        let mut nodes = Vec::new();
        let mut rows = Vec::new();

        if !root.exists(base) {
            debug!("no sysfs node directory, assuming one node");
            return Ok(Self::single_node());
        }

        for name in root.list_dir(base)? {
            let Some(id) = name.strip_prefix("node").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let node_path = format!("{}/{}", base, name);

            let cpus = root
                .read(&format!("{}/cpulist", node_path))
                .map(|list| Self::parse_cpu_list(&list))
                .unwrap_or_default();
            let (size_mib, free_mib) = root
                .read(&format!("{}/meminfo", node_path))
                .map(|content| Self::parse_node_meminfo(&content))
                .unwrap_or((None, None));
            let row = root
                .read(&format!("{}/distance", node_path))
                .ok()
                .and_then(|d| parse_numbers(&d, "node distance").ok())
                .unwrap_or_default();

            nodes.push(NumaNode {
                id,
                cpus,
                size_mib,
                free_mib,
            });
            rows.push((id, row));
        }

        if nodes.is_empty() {
            return Ok(Self::single_node());
        }

        // Sort by node ID; list_dir sorts lexically, so node10 precedes node2
        nodes.sort_by_key(|n| n.id);
        rows.sort_by_key(|(id, _)| *id);

        let node_ids = nodes.iter().map(|n| n.id).collect();
        let distances = Self::checked(node_ids, rows.into_iter().map(|(_, r)| r).collect());
        Ok(Self::from_nodes(nodes, distances))
    }

    /// Single node holding every CPU, for hosts without NUMA support
    pub fn single_node() -> Self {
        let num_cpus = num_cpus::get() as u32;
        let node = NumaNode {
            id: 0,
            cpus: (0..num_cpus).collect(),
            size_mib: None,
            free_mib: None,
        };
        let distances = Self::checked(vec![0], vec![vec![LOCAL_DISTANCE]]);
        Self::from_nodes(vec![node], distances)
    }

    fn from_nodes(nodes: Vec<NumaNode>, distances: Fact<DistanceMatrix>) -> Self {
        Self {
            is_numa_system: nodes.len() > 1,
            nodes,
            distances,
        }
    }

    fn checked(node_ids: Vec<u32>, rows: Vec<Vec<u32>>) -> Fact<DistanceMatrix> {
        match DistanceMatrix::new(node_ids, rows) {
            Ok(matrix) => Fact::Available(matrix),
            Err(e) => {
                warn!(error = %e, "ignoring NUMA distance table");
                Fact::unavailable(e)
            }
        }
    }

    /// Parse CPU list format (e.g., "0-3,8-11" -> [0,1,2,3,8,9,10,11])
    pub fn parse_cpu_list(s: &str) -> Vec<u32> {
        let mut cpus = Vec::new();

        for part in s.trim().split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    cpus.extend(start..=end);
                }
            } else if let Ok(cpu) = part.parse::<u32>() {
                cpus.push(cpu);
            }
        }

        cpus
    }

    /// Format CPU ids back into compact list form ("0-3,8")
    pub fn format_cpu_list(cpus: &[u32]) -> String {
        let mut ranges: Vec<String> = Vec::new();
        let mut iter = cpus.iter().copied().peekable();

        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            ranges.push(if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            });
        }

        ranges.join(",")
    }

    fn parse_node_meminfo(content: &str) -> (Option<u64>, Option<u64>) {
        // Format: "Node 0 MemTotal:       65843220 kB"
        let field = |name: &str| {
            content
                .lines()
                .find(|line| line.contains(name))
                .and_then(|line| line.split_whitespace().nth(3))
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb / 1024)
        };
        (field("MemTotal:"), field("MemFree:"))
    }

    /// Node that owns a CPU
    pub fn node_of_cpu(&self, cpu: u32) -> Option<u32> {
        self.nodes
            .iter()
            .find(|n| n.cpus.contains(&cpu))
            .map(|n| n.id)
    }

    /// Total CPUs across all nodes
    pub fn total_cpus(&self) -> usize {
        self.nodes.iter().map(|n| n.cpus.len()).sum()
    }
}

fn parse_number<T: std::str::FromStr>(s: &str, what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.trim()
        .parse::<T>()
        .map_err(|e| NumaScopeError::parse(what, format!("'{}': {}", s.trim(), e)))
}

fn parse_numbers(s: &str, what: &str) -> Result<Vec<u32>> {
    s.split_whitespace().map(|n| parse_number(n, what)).collect()
}

fn parse_mib(value: &str) -> Result<u64> {
    let number = value.split_whitespace().next().unwrap_or_default();
    parse_number(number, "node memory")
}
