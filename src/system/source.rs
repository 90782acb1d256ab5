//! Raw access to host state
//!
//! Every fact numascope reports comes through one of two narrow doors:
//! [`SysRoot`] for sysfs/procfs files and [`CommandRunner`] for external
//! inspection tools. Parsers never touch the host directly.

use crate::error::{IoResultExt, NumaScopeError, Result};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::debug;

/// Directories searched after `$PATH`; admin tools often live here
const SBIN_DIRS: &[&str] = &["/usr/local/sbin", "/usr/sbin", "/sbin"];

/// Filesystem root that sysfs/procfs paths are resolved against
#[derive(Debug, Clone)]
pub struct SysRoot {
    root: PathBuf,
}

impl Default for SysRoot {
    fn default() -> Self {
        Self::new("/")
    }
}

impl SysRoot {
    /// Create a reader rooted at `root` (normally `/`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an absolute host path under this root
    pub fn path(&self, host_path: &str) -> PathBuf {
        self.root.join(host_path.trim_start_matches('/'))
    }

    /// Does the path exist under this root?
    pub fn exists(&self, host_path: &str) -> bool {
        self.path(host_path).exists()
    }

    /// Read a file, trimming surrounding whitespace
    pub fn read(&self, host_path: &str) -> Result<String> {
        let path = self.path(host_path);
        let content = std::fs::read_to_string(&path).with_path(&path)?;
        Ok(content.trim().to_string())
    }

    /// Read and parse a single-value file such as `/proc/sys/vm/swappiness`
    pub fn read_value<T>(&self, host_path: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.read(host_path)?;
        raw.parse::<T>()
            .map_err(|e| NumaScopeError::parse(host_path, format!("'{}': {}", raw, e)))
    }

    /// List entry names of a directory, sorted
    pub fn list_dir(&self, host_path: &str) -> Result<Vec<String>> {
        let path = self.path(host_path);
        let mut names: Vec<String> = std::fs::read_dir(&path)
            .with_path(&path)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Final path component of a symlink target, e.g. a PCI address
    pub fn link_name(&self, host_path: &str) -> Result<String> {
        let path = self.path(host_path);
        let target = std::fs::read_link(&path).with_path(&path)?;
        target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| NumaScopeError::parse(host_path, "link has no final component"))
    }
}

/// Active entry of a sysfs choice file such as `always [madvise] never`
///
/// A file holding a single bare word (some schedulers print just `none`)
/// counts as that word being selected.
pub fn selected_choice(raw: &str) -> Option<&str> {
    let mut words = raw.split_whitespace();
    let bracketed = raw
        .split_whitespace()
        .find(|w| w.starts_with('[') && w.ends_with(']'))
        .map(|w| w.trim_matches(|c| c == '[' || c == ']'));

    match (bracketed, words.next(), words.next()) {
        (Some(choice), _, _) => Some(choice),
        (None, Some(only), None) => Some(only),
        _ => None,
    }
}

/// Runs external inspection tools
pub trait CommandRunner {
    /// Find a tool, returning its full path when installed
    fn locate(&self, program: &str) -> Option<PathBuf>;

    /// Run a tool to completion and return its stdout
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Runs tools on the local host
#[derive(Debug, Default, Clone, Copy)]
pub struct HostCommands;

impl CommandRunner for HostCommands {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        which(program)
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let exe = self.locate(program).unwrap_or_else(|| PathBuf::from(program));
        debug!(program, ?args, "running inspection tool");

        let output = tool_command(&exe, args)
            .output()
            .map_err(|e| NumaScopeError::command(program, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NumaScopeError::command(
                program,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Build a tool invocation with untranslated output
fn tool_command(exe: &Path, args: &[&str]) -> Command {
    let mut command = Command::new(exe);
    command.args(args).env("LC_ALL", "C");
    command
}

fn which(cmd: &str) -> Option<PathBuf> {
    let path_dirs = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    path_dirs
        .into_iter()
        .chain(SBIN_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join(cmd))
        .find(|full_path| is_executable(full_path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
pub(crate) mod fake {
    //! Canned tool output and fixture trees for collector tests

    use super::*;
    use std::collections::{BTreeSet, HashMap};

    /// Command runner that answers from a table
    #[derive(Debug, Default)]
    pub struct FakeCommands {
        installed: BTreeSet<String>,
        outputs: HashMap<String, String>,
    }

    impl FakeCommands {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every mandatory tool installed, none with output
        pub fn with_prerequisites() -> Self {
            crate::system::prereq::REQUIRED_TOOLS
                .iter()
                .fold(Self::new(), |fake, tool| fake.with_tool(tool.name))
        }

        pub fn with_tool(mut self, program: &str) -> Self {
            self.installed.insert(program.to_string());
            self
        }

        pub fn with_output(mut self, program: &str, args: &[&str], stdout: &str) -> Self {
            self.installed.insert(program.to_string());
            self.outputs.insert(key(program, args), stdout.to_string());
            self
        }
    }

    fn key(program: &str, args: &[&str]) -> String {
        format!("{} {}", program, args.join(" "))
    }

    impl CommandRunner for FakeCommands {
        fn locate(&self, program: &str) -> Option<PathBuf> {
            self.installed
                .contains(program)
                .then(|| PathBuf::from("/usr/bin").join(program))
        }

        fn run(&self, program: &str, args: &[&str]) -> Result<String> {
            if !self.installed.contains(program) {
                return Err(NumaScopeError::command(program, "not installed"));
            }
            self.outputs
                .get(&key(program, args))
                .cloned()
                .ok_or_else(|| NumaScopeError::command(program, "exited with status 1"))
        }
    }

    /// Write a fixture file under `root`, creating parent directories
    pub fn put(root: &Path, host_path: &str, content: &str) {
        let path = root.join(host_path.trim_start_matches('/'));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::fake::put;
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_rooted_reads() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/proc/sys/vm/swappiness", "60\n");
        put(dir.path(), "/proc/cmdline", "  ro quiet \n");

        let root = SysRoot::new(dir.path());
        assert_eq!(root.read_value::<u8>("/proc/sys/vm/swappiness").unwrap(), 60);
        assert_eq!(root.read("/proc/cmdline").unwrap(), "ro quiet");
        assert!(root.exists("/proc/cmdline"));
        assert!(!root.exists("/proc/nope"));
    }

    #[test]
    fn test_read_value_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/proc/sys/vm/swappiness", "lots");

        let root = SysRoot::new(dir.path());
        let err = root.read_value::<u8>("/proc/sys/vm/swappiness").unwrap_err();
        assert!(matches!(err, NumaScopeError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = SysRoot::new(dir.path());
        let err = root.read("/sys/kernel/mm/transparent_hugepage/enabled").unwrap_err();
        let NumaScopeError::Io { path, .. } = err else {
            panic!("expected an I/O error, got {:?}", err);
        };
        assert!(path.ends_with("transparent_hugepage/enabled"));
    }

    #[test]
    fn test_tools_run_in_c_locale() {
        let command = tool_command(Path::new("/usr/bin/lscpu"), &["-e"]);
        let envs: Vec<_> = command.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("LC_ALL"), Some(OsStr::new("C")))));
        assert_eq!(command.get_args().collect::<Vec<_>>(), vec![OsStr::new("-e")]);
    }

    #[test]
    fn test_list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/sys/block/sdb/queue/scheduler", "none");
        put(dir.path(), "/sys/block/nvme0n1/queue/scheduler", "none");
        put(dir.path(), "/sys/block/sda/queue/scheduler", "none");

        let root = SysRoot::new(dir.path());
        assert_eq!(root.list_dir("/sys/block").unwrap(), vec!["nvme0n1", "sda", "sdb"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_name() {
        let dir = tempfile::tempdir().unwrap();
        put(dir.path(), "/sys/devices/pci0000:00/0000:3b:00.0/numa_node", "1");
        std::fs::create_dir_all(dir.path().join("sys/class/net/eth0")).unwrap();
        std::os::unix::fs::symlink(
            "../../../devices/pci0000:00/0000:3b:00.0",
            dir.path().join("sys/class/net/eth0/device"),
        )
        .unwrap();

        let root = SysRoot::new(dir.path());
        assert_eq!(root.link_name("/sys/class/net/eth0/device").unwrap(), "0000:3b:00.0");
        assert_eq!(root.read("/sys/class/net/eth0/device/numa_node").unwrap(), "1");
    }

    #[test]
    fn test_selected_choice() {
        assert_eq!(selected_choice("always [madvise] never"), Some("madvise"));
        assert_eq!(selected_choice("[mq-deadline] kyber bfq none"), Some("mq-deadline"));
        assert_eq!(selected_choice("none\n"), Some("none"));
        assert_eq!(selected_choice("always madvise never"), None);
        assert_eq!(selected_choice(""), None);
    }

    #[test]
    fn test_fake_runner() {
        let fake = fake::FakeCommands::new().with_output("lscpu", &[], "Architecture: x86_64\n");
        assert!(fake.locate("lscpu").is_some());
        assert!(fake.locate("numactl").is_none());
        assert!(fake.run("lscpu", &[]).unwrap().contains("x86_64"));
        assert!(fake.run("lscpu", &["-e"]).is_err());
    }
}
