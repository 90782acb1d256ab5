//! Host identity detection
//!
//! Hostname, OS and kernel release come from `sysinfo`; nothing here is
//! used by the tip rules.

use sysinfo::System;

const UNKNOWN: &str = "unknown";

/// Who and what this host is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// Hostname
    pub hostname: String,
    /// Distribution name and version
    pub os_name: String,
    /// Kernel release
    pub kernel_version: String,
    /// Architecture this binary was built for
    pub architecture: String,
}

impl Default for HostIdentity {
    fn default() -> Self {
        Self {
            hostname: UNKNOWN.to_string(),
            os_name: UNKNOWN.to_string(),
            kernel_version: UNKNOWN.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
        }
    }
}

impl HostIdentity {
    /// Collect identity of the running host
    pub fn collect() -> Self {
        let fallback = Self::default();

        Self {
            hostname: System::host_name().unwrap_or(fallback.hostname),
            os_name: System::long_os_version()
                .or_else(System::name)
                .unwrap_or(fallback.os_name),
            kernel_version: System::kernel_version().unwrap_or(fallback.kernel_version),
            architecture: fallback.architecture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_collection() {
        let identity = HostIdentity::collect();
        assert!(!identity.hostname.is_empty());
        assert!(!identity.os_name.is_empty());
        assert!(!identity.kernel_version.is_empty());
        assert_eq!(identity.architecture, std::env::consts::ARCH);
    }
}
