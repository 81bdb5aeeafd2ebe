//! Configuration and dependency-graph validation

use anyhow::Result;
use capacity_lib::engine::resolve;
use capacity_lib::CapacityConfig;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_error, print_success, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Frontend")]
    frontend: bool,
    #[tabled(rename = "Depends On")]
    depends_on: String,
    #[tabled(rename = "Full Chain")]
    full_chain: String,
    #[tabled(rename = "Traffic Query")]
    traffic_query: String,
}

fn join_or_dash(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

/// Resolve every chain; fails when the graph is cyclic or incomplete
pub fn check_config(config: &CapacityConfig, format: OutputFormat) -> Result<()> {
    let chains = match resolve(&config.dependency_graph()) {
        Ok(chains) => chains,
        Err(e) => {
            print_error(&e.to_string());
            return Err(e.into());
        }
    };

    let rows: Vec<ServiceRow> = config
        .namespaces
        .iter()
        .map(|spec| ServiceRow {
            service: spec.name.clone(),
            deployment: spec.deployment_name(&config.deployment),
            frontend: spec.frontend,
            depends_on: join_or_dash(&spec.depends_on),
            full_chain: chains
                .get(&spec.name)
                .map(|c| join_or_dash(c))
                .unwrap_or_else(|| "-".to_string()),
            traffic_query: spec
                .traffic_query(&config.prometheus)
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    print_table(&rows, format)?;

    if matches!(format, OutputFormat::Table) {
        print_success(&format!(
            "{} services, dependency graph resolved",
            config.namespaces.len()
        ));
    }

    Ok(())
}
