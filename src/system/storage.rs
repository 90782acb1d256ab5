//! Block device I/O schedulers

use super::facts::Fact;
use super::source::{selected_choice, SysRoot};
use crate::error::{NumaScopeError, Result};
use std::collections::BTreeMap;

/// Virtual devices that never back real storage
const SKIPPED_PREFIXES: &[&str] = &["loop", "ram", "zram"];

/// Active scheduler per block device; one unreadable device does not hide the rest
pub fn io_schedulers(root: &SysRoot) -> Result<BTreeMap<String, Fact<String>>> {
    let schedulers: BTreeMap<String, Fact<String>> = root
        .list_dir("/sys/block")?
        .into_iter()
        .filter(|dev| !SKIPPED_PREFIXES.iter().any(|p| dev.starts_with(p)))
        .map(|dev| {
            let scheduler: Fact<String> = active_scheduler(root, &dev).into();
            (dev, scheduler)
        })
        .collect();

    if schedulers.is_empty() {
        return Err(NumaScopeError::empty("/sys/block"));
    }
    Ok(schedulers)
}

fn active_scheduler(root: &SysRoot, device: &str) -> Result<String> {
    let path = format!("/sys/block/{}/queue/scheduler", device);
    let raw = root.read(&path)?;
    selected_choice(&raw)
        .map(str::to_string)
        .ok_or_else(|| NumaScopeError::parse(path, format!("no active scheduler in '{}'", raw)))
}
