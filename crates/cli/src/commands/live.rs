//! One cycle against the live cluster

use anyhow::{Context, Result};
use capacity_lib::{
    inventory::{KubeInventory, PrometheusClient, SnapshotCollector},
    run_cycle, CapacityConfig,
};
use std::path::Path;
use std::sync::Arc;

use crate::output::{print_info, print_report, print_warning, OutputFormat};

pub async fn estimate_live(
    config: &CapacityConfig,
    dump_snapshot: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let inventory = KubeInventory::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let traffic = PrometheusClient::new(&config.prometheus)?;
    let collector = SnapshotCollector::new(Arc::new(inventory), Arc::new(traffic));

    let outcome = collector.collect(config).await;

    for failure in &outcome.failures {
        print_warning(&format!("Fetch failed, using empty values: {}", failure));
    }

    if let Some(path) = dump_snapshot {
        let json = serde_json::to_string_pretty(&outcome.snapshot)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

        if matches!(format, OutputFormat::Table) {
            print_info(&format!("Snapshot saved to {}", path.display()));
        }
    }

    let report = run_cycle(config, &outcome.snapshot)?;
    print_report(&report, format)
}
