//! Prerequisite checks
//!
//! The report is all-or-nothing with respect to the mandatory tools: either
//! every one is installed, or the run stops before any section is produced
//! and names all of the missing ones together.

use super::source::CommandRunner;
use crate::error::{NumaScopeError, Result};
use tracing::debug;

/// An external tool the collector shells out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    /// Executable name
    pub name: &'static str,
    /// What it is used for
    pub purpose: &'static str,
}

/// Tools without which no report is produced
pub const REQUIRED_TOOLS: &[Tool] = &[
    Tool {
        name: "lscpu",
        purpose: "CPU topology",
    },
    Tool {
        name: "numactl",
        purpose: "NUMA hardware layout",
    },
    Tool {
        name: "lspci",
        purpose: "PCI device NUMA introspection",
    },
    Tool {
        name: "ethtool",
        purpose: "network device bus addresses",
    },
];

/// Tools whose absence only marks a fact unavailable
pub const OPTIONAL_TOOLS: &[Tool] = &[Tool {
    name: "cpupower",
    purpose: "CPU idle (C-state) information",
}];

/// Check every mandatory tool, failing once with the full list of missing ones
pub fn check_prerequisites<R: CommandRunner + ?Sized>(runner: &R) -> Result<()> {
    let missing: Vec<String> = REQUIRED_TOOLS
        .iter()
        .filter(|tool| runner.locate(tool.name).is_none())
        .map(|tool| tool.name.to_string())
        .collect();

    for tool in OPTIONAL_TOOLS {
        if runner.locate(tool.name).is_none() {
            debug!(tool = tool.name, purpose = tool.purpose, "optional tool not installed");
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(NumaScopeError::MissingPrerequisite { tools: missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::source::fake::FakeCommands;

    #[test]
    fn test_all_present() {
        assert!(check_prerequisites(&FakeCommands::with_prerequisites()).is_ok());
    }

    #[test]
    fn test_optional_tool_not_required() {
        let fake = FakeCommands::with_prerequisites();
        assert!(fake.locate("cpupower").is_none());
        assert!(check_prerequisites(&fake).is_ok());
    }

    #[test]
    fn test_two_missing_named_together() {
        let fake = FakeCommands::new().with_tool("lscpu").with_tool("ethtool");

        match check_prerequisites(&fake) {
            Err(NumaScopeError::MissingPrerequisite { tools }) => {
                assert_eq!(tools, vec!["numactl", "lspci"]);
            }
            other => panic!("expected MissingPrerequisite, got {:?}", other),
        }
    }
}
