//! Network device discovery and NUMA hints
//!
//! Each PCI-attached interface carries two independent NUMA hints: the
//! kernel's `device/numa_node` attribute and the "NUMA node" line printed by
//! `lspci -v`. Both are recorded raw; reconciling them is left to the
//! affinity resolver.

use super::source::{CommandRunner, SysRoot};
use crate::error::Result;
use tracing::debug;

const NET_CLASS: &str = "/sys/class/net";

/// PCI-attached network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDevice {
    /// Interface name, e.g. `ens1f0`
    pub name: String,
    /// PCI bus address, e.g. `0000:3b:00.0`
    pub pci_address: String,
    /// Kernel driver bound to the device
    pub driver: Option<String>,
    /// `device/numa_node`; -1 means the firmware set no node
    pub sysfs_numa_node: Option<i32>,
    /// `NUMA node:` from PCI introspection
    pub pci_numa_node: Option<i32>,
}

/// Enumerate PCI network devices with both NUMA hints
pub fn discover<R: CommandRunner + ?Sized>(
    root: &SysRoot,
    runner: &R,
) -> Result<Vec<NetworkDevice>> {
    let mut devices = Vec::new();

    for name in root.list_dir(NET_CLASS)? {
        if name == "lo" {
            continue;
        }

        let ethtool = runner
            .run("ethtool", &["-i", &name])
            .map(|output| parse_ethtool_info(&output))
            .unwrap_or_else(|e| {
                debug!(interface = %name, error = %e, "ethtool -i failed");
                EthtoolInfo::default()
            });

        let address = ethtool
            .bus_info
            .filter(|addr| is_pci_address(addr))
            .or_else(|| {
                root.link_name(&format!("{}/{}/device", NET_CLASS, name))
                    .ok()
                    .filter(|addr| is_pci_address(addr))
            });

        let Some(pci_address) = address else {
            debug!(interface = %name, "not a PCI device, skipping");
            continue;
        };

        let sysfs_numa_node = root
            .read_value::<i32>(&format!("{}/{}/device/numa_node", NET_CLASS, name))
            .map_err(|e| debug!(interface = %name, error = %e, "no sysfs numa_node"))
            .ok();

        let pci_numa_node = runner
            .run("lspci", &["-v", "-s", &pci_address])
            .map_err(|e| debug!(address = %pci_address, error = %e, "lspci failed"))
            .ok()
            .and_then(|output| parse_lspci_numa_node(&output));

        devices.push(NetworkDevice {
            name,
            pci_address,
            driver: ethtool.driver,
            sysfs_numa_node,
            pci_numa_node,
        });
    }

    Ok(devices)
}

/// Fields of `ethtool -i` used here
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EthtoolInfo {
    /// `driver:` line
    pub driver: Option<String>,
    /// `bus-info:` line, when non-empty
    pub bus_info: Option<String>,
}

/// Parse `ethtool -i <if>` driver information
pub fn parse_ethtool_info(output: &str) -> EthtoolInfo {
    let field = |key: &str| {
        output
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    EthtoolInfo {
        driver: field("driver:"),
        bus_info: field("bus-info:"),
    }
}

/// Extract `NUMA node: N` from `lspci -v` output
pub fn parse_lspci_numa_node(output: &str) -> Option<i32> {
    output
        .lines()
        .filter_map(|line| line.split_once("NUMA node"))
        .find_map(|(_, rest)| {
            let value = rest.trim_start_matches(':').trim();
            value.split([',', ' ']).next()?.parse().ok()
        })
}

/// Does `addr` look like `dddd:bb:dd.f` (domain optional)?
pub fn is_pci_address(addr: &str) -> bool {
    let (bus_dev, function) = match addr.rsplit_once('.') {
        Some(parts) => parts,
        None => return false,
    };
    if function.len() != 1 || !function.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let parts: Vec<&str> = bus_dev.split(':').collect();
    let hex = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit());
    match parts.as_slice() {
        [domain, bus, device] => hex(domain, 4) && hex(bus, 2) && hex(device, 2),
        [bus, device] => hex(bus, 2) && hex(device, 2),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::source::fake::{put, FakeCommands};

    const ETHTOOL_MLX: &str = "\
driver: mlx5_core
version: 5.15.0-91-generic
firmware-version: 16.35.2000 (MT_0000000080)
bus-info: 0000:3b:00.0
supports-statistics: yes
";

    const LSPCI_MLX: &str = "\
3b:00.0 Ethernet controller: Mellanox Technologies MT27800 Family [ConnectX-5]
\tSubsystem: Mellanox Technologies Device 0008
\tFlags: bus master, fast devsel, latency 0, IRQ 42, NUMA node 0, IOMMU group 30
\tMemory at 387ffe000000 (64-bit, prefetchable) [size=32M]
";

    #[test]
    fn test_parse_ethtool_info() {
        let info = parse_ethtool_info(ETHTOOL_MLX);
        assert_eq!(info.driver.as_deref(), Some("mlx5_core"));
        assert_eq!(info.bus_info.as_deref(), Some("0000:3b:00.0"));

        let virtio = parse_ethtool_info("driver: virtio_net\nbus-info: \n");
        assert_eq!(virtio.bus_info, None);
    }

    #[test]
    fn test_parse_lspci_numa_node() {
        assert_eq!(parse_lspci_numa_node(LSPCI_MLX), Some(0));
        assert_eq!(parse_lspci_numa_node("\tNUMA node: 1\n"), Some(1));
        assert_eq!(parse_lspci_numa_node("\tFlags: bus master, IRQ 16\n"), None);
    }

    #[test]
    fn test_is_pci_address() {
        assert!(is_pci_address("0000:3b:00.0"));
        assert!(is_pci_address("af:00.1"));
        assert!(!is_pci_address("virtio0"));
        assert!(!is_pci_address("tap"));
        assert!(!is_pci_address("0000:3b:00"));
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/sys/class/net/lo/mtu", "65536");
        put(dir.path(), "/sys/class/net/ens1f0/device/numa_node", "-1\n");
        put(dir.path(), "/sys/class/net/docker0/mtu", "1500");

        let fake = FakeCommands::with_prerequisites()
            .with_output("ethtool", &["-i", "ens1f0"], ETHTOOL_MLX)
            .with_output("ethtool", &["-i", "docker0"], "driver: bridge\nbus-info: N/A\n")
            .with_output("lspci", &["-v", "-s", "0000:3b:00.0"], LSPCI_MLX);

        let devices = discover(&SysRoot::new(dir.path()), &fake).unwrap();
        assert_eq!(devices.len(), 1);
        let nic = &devices[0];
        assert_eq!(nic.name, "ens1f0");
        assert_eq!(nic.driver.as_deref(), Some("mlx5_core"));
        assert_eq!(nic.sysfs_numa_node, Some(-1));
        assert_eq!(nic.pci_numa_node, Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_falls_back_to_device_link() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/sys/devices/pci0000:00/0000:af:00.1/numa_node", "1");
        std::fs::create_dir_all(dir.path().join("sys/class/net/eth1")).unwrap();
        std::os::unix::fs::symlink(
            "../../../devices/pci0000:00/0000:af:00.1",
            dir.path().join("sys/class/net/eth1/device"),
        )
        .unwrap();

        let fake = FakeCommands::with_prerequisites();
        let devices = discover(&SysRoot::new(dir.path()), &fake).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].pci_address, "0000:af:00.1");
        assert_eq!(devices[0].sysfs_numa_node, Some(1));
        assert_eq!(devices[0].pci_numa_node, None);
    }
}
