//! Output formatting utilities

use capacity_lib::models::{CycleReport, ServiceCapacity};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No services configured".yellow());
                return Ok(());
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Warnings go to stderr so JSON output stays parseable
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: i64) -> String {
    const KI: f64 = 1024.0;
    const MI: f64 = KI * 1024.0;
    const GI: f64 = MI * 1024.0;

    let value = bytes as f64;
    if value.abs() >= GI {
        format!("{:.2}Gi", value / GI)
    } else if value.abs() >= MI {
        format!("{:.2}Mi", value / MI)
    } else if value.abs() >= KI {
        format!("{:.2}Ki", value / KI)
    } else {
        format!("{}B", bytes)
    }
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores.abs() >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

fn color_headroom(pods: i64) -> String {
    let formatted = pods.to_string();
    match pods {
        p if p <= 0 => formatted.red().to_string(),
        1..=2 => formatted.yellow().to_string(),
        _ => formatted.green().to_string(),
    }
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Pods")]
    pods: i64,
    #[tabled(rename = "Rate")]
    rate: i64,
    #[tabled(rename = "Ingress")]
    ingress: String,
    #[tabled(rename = "Chain CPU")]
    chain_cpu: String,
    #[tabled(rename = "Chain Memory")]
    chain_memory: String,
    #[tabled(rename = "CPU/req")]
    cpu_per_request: String,
    #[tabled(rename = "Memory/req")]
    memory_per_request: String,
    #[tabled(rename = "Headroom")]
    headroom: String,
}

impl From<&ServiceCapacity> for ReportRow {
    fn from(s: &ServiceCapacity) -> Self {
        Self {
            service: s.name.clone(),
            pods: s.resources.pods,
            rate: s.traffic.adjusted_rate,
            ingress: s
                .traffic
                .ingress_multiplier
                .map(|m| format!("{:.0}%", m * 100.0))
                .unwrap_or_else(|| "-".to_string()),
            chain_cpu: format_cpu(s.resources.full_chain.cpu_millis),
            chain_memory: format_bytes(s.resources.full_chain.memory_bytes),
            cpu_per_request: format!("{:.2}m", s.unit_cost.cpu_millis),
            memory_per_request: format_bytes(s.unit_cost.memory_bytes.round() as i64),
            headroom: color_headroom(s.additional_pods),
        }
    }
}

/// Print a cycle report; JSON carries every figure, the table a summary
pub fn print_report(report: &CycleReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            let rows: Vec<ReportRow> = report.services.values().map(ReportRow::from).collect();
            if rows.is_empty() {
                println!("{}", "No services configured".yellow());
            } else {
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.50Ki");
        assert_eq!(format_bytes(256 * 1024 * 1024), "256.00Mi");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.00Gi");
    }

    #[test]
    fn test_format_cpu() {
        assert_eq!(format_cpu(250), "250m");
        assert_eq!(format_cpu(4680), "4.7");
    }
}
