//! One cycle over a frozen snapshot

use anyhow::{Context, Result};
use capacity_lib::{models::ClusterSnapshot, run_cycle, CapacityConfig};
use std::path::Path;

use crate::output::{print_report, OutputFormat};

pub fn load_snapshot(path: &Path) -> Result<ClusterSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;

    serde_json::from_str(&raw).with_context(|| format!("Invalid snapshot {}", path.display()))
}

pub fn estimate_from_file(config: &CapacityConfig, path: &Path, format: OutputFormat) -> Result<()> {
    let snapshot = load_snapshot(path)?;
    let report = run_cycle(config, &snapshot)?;

    print_report(&report, format)
}
