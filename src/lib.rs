//! # numascope - NUMA and Latency Tuning Report for Linux Servers
//!
//! numascope inspects a Linux host and prints a read-only, sectioned report
//! of everything that matters when placing latency-sensitive work: CPU
//! topology, NUMA layout, which node each PCI network device hangs off,
//! kernel and power-management settings, and memory/I/O knobs. With tips
//! enabled it adds advisory recommendations. It never changes the system.
//!
//! ## Pipeline
//!
//! 1. [`system::FactCollector`] checks the mandatory tools and builds one
//!    immutable [`system::HostFacts`] snapshot
//! 2. [`affinity`] resolves each NIC's NUMA node and classifies the fleet
//! 3. [`tuning::select_tips`] picks advisory tips
//! 4. [`report::render`] writes the sections
//!
//! ## Quick Start
//!
//! ```no_run
//! use numascope::config::ReportConfig;
//! use numascope::report::generate_report;
//! use numascope::system::HostCommands;
//!
//! let config = ReportConfig { tips: true, ..Default::default() };
//! let stdout = std::io::stdout();
//! generate_report(&config, &HostCommands, &mut stdout.lock()).unwrap();
//! ```
//!
//! ## Resolving NIC Affinity
//!
//! ```
//! use numascope::affinity::{resolve, ResolvedNode};
//! use numascope::system::NetworkDevice;
//!
//! let nic = NetworkDevice {
//!     name: "ens1f0".to_string(),
//!     pci_address: "0000:3b:00.0".to_string(),
//!     driver: None,
//!     sysfs_numa_node: Some(-1),
//!     pci_numa_node: Some(1),
//! };
//! assert_eq!(resolve(&nic).node, ResolvedNode::Node(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod affinity;
pub mod config;
pub mod error;
pub mod report;
pub mod system;
pub mod tuning;

// Re-export commonly used types
pub use config::{CliArgs, ReportConfig};
pub use error::{NumaScopeError, Result};
pub use report::generate_report;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use numascope::prelude::*;
    //! ```

    pub use crate::affinity::{
        resolve, resolve_all, FleetAffinitySummary, FleetKind, ResolvedDeviceAffinity,
    };
    pub use crate::config::{CliArgs, ReportConfig};
    pub use crate::error::{NumaScopeError, Result};
    pub use crate::report::{generate_report, render, Report};
    pub use crate::system::{CommandRunner, Fact, FactCollector, HostCommands, HostFacts, SysRoot};
    pub use crate::tuning::{select_tips, AdvisoryTip, Section, TipKind};
}
