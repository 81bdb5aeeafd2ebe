//! Static configuration for the capacity engine
//!
//! Loaded once at startup from a YAML file (plus `CAPACITY__*` environment
//! overrides) and passed by reference into every component afterwards.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Placeholder substituted in query templates
pub const TEMPLATE_VARIABLE: &str = "$variable";

/// Configuration errors, all fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),

    #[error("service '{service}': {field} must be within 0..=100, got {value}")]
    PercentOutOfRange {
        service: String,
        field: &'static str,
        value: f64,
    },

    #[error("service '{service}' references unknown query template '{template}'")]
    UnknownQueryTemplate { service: String, template: String },

    #[error("metrics endpoint '{0}' must start with '/' and not shadow /healthz or /readyz")]
    InvalidMetricsEndpoint(String),
}

/// Paths served next to the metrics endpoint
const RESERVED_PATHS: [&str; 2] = ["/healthz", "/readyz"];

/// Recognized node-affinity key/operator pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AffinityRule {
    pub key: String,
    pub operator: String,
}

/// Deployment name affixes
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeploymentAffixes {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

/// Where the metrics endpoint listens
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExporterSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: String,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            metrics_endpoint: default_metrics_endpoint(),
        }
    }
}

impl ExporterSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Prometheus query API used for request rates
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrometheusSettings {
    #[serde(default = "default_prometheus_url")]
    pub url: String,
    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,
    /// Named query templates containing [`TEMPLATE_VARIABLE`]
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            url: default_prometheus_url(),
            timeout_secs: default_query_timeout(),
            templates: BTreeMap::new(),
        }
    }
}

impl PrometheusSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Template by name; names are case-insensitive
    pub fn template(&self, name: &str) -> Option<&str> {
        self.templates.get(&name.to_lowercase()).map(String::as_str)
    }

    /// The config loader lowercases map keys, so store them that way
    /// regardless of how the settings were built.
    fn normalize_template_names(&mut self) {
        self.templates = std::mem::take(&mut self.templates)
            .into_iter()
            .map(|(name, query)| (name.to_lowercase(), query))
            .collect();
    }
}

/// Per-service traffic query binding
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TrafficQuery {
    /// Full PromQL string used as is
    Override { query: String },
    /// Named global template with its variable substituted
    Template { template: String, variable: String },
}

/// One logical service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub frontend: bool,
    #[serde(default)]
    pub shared: bool,
    /// 0 means unset
    #[serde(default)]
    pub frontend_successful_percentage: f64,
    /// 0 means unset; only used for shared frontends
    #[serde(default)]
    pub frontend_to_shared_percentage: f64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub deployment_alias: Option<String>,
    #[serde(default)]
    pub deployment_prefix: Option<String>,
    #[serde(default)]
    pub deployment_suffix: Option<String>,
    #[serde(default)]
    pub traffic: Option<TrafficQuery>,
}

impl ServiceSpec {
    /// Minimal spec, mostly useful for building graphs in code
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frontend: false,
            shared: false,
            frontend_successful_percentage: 0.0,
            frontend_to_shared_percentage: 0.0,
            depends_on: Vec::new(),
            deployment_alias: None,
            deployment_prefix: None,
            deployment_suffix: None,
            traffic: None,
        }
    }

    /// Deployment backing this service: `prefix + (alias or name) + suffix`
    pub fn deployment_name(&self, global: &DeploymentAffixes) -> String {
        let prefix = self.deployment_prefix.as_deref().unwrap_or(&global.prefix);
        let suffix = self.deployment_suffix.as_deref().unwrap_or(&global.suffix);
        let base = self.deployment_alias.as_deref().unwrap_or(&self.name);
        format!("{}{}{}", prefix, base, suffix)
    }

    /// Rendered PromQL for this service, if it has a traffic binding
    pub fn traffic_query(&self, prometheus: &PrometheusSettings) -> Option<String> {
        match self.traffic.as_ref()? {
            TrafficQuery::Override { query } => Some(query.clone()),
            TrafficQuery::Template { template, variable } => prometheus
                .template(template)
                .map(|t| t.replace(TEMPLATE_VARIABLE, variable)),
        }
    }
}

/// Complete, immutable engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapacityConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub affinity: Vec<AffinityRule>,
    #[serde(default)]
    pub deployment: DeploymentAffixes,
    #[serde(default)]
    pub exporter: ExporterSettings,
    #[serde(default)]
    pub prometheus: PrometheusSettings,
    #[serde(default)]
    pub namespaces: Vec<ServiceSpec>,
}

fn default_interval() -> u64 {
    60
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_endpoint() -> String {
    "/metrics".to_string()
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_query_timeout() -> u64 {
    10
}

impl CapacityConfig {
    /// Load and validate configuration from a file and the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("CAPACITY").separator("__"))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    /// Build from a YAML string; used by tests and the CLI
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;

        Self::finish(config.try_deserialize()?)
    }

    fn finish(mut parsed: CapacityConfig) -> Result<Self, ConfigError> {
        parsed.prometheus.normalize_template_names();
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check invariants that do not need the dependency graph
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.exporter.metrics_endpoint;
        if !endpoint.starts_with('/') || RESERVED_PATHS.contains(&endpoint.as_str()) {
            return Err(ConfigError::InvalidMetricsEndpoint(endpoint.clone()));
        }

        let mut seen = HashSet::new();

        for service in &self.namespaces {
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }

            for (field, value) in [
                (
                    "frontend_successful_percentage",
                    service.frontend_successful_percentage,
                ),
                (
                    "frontend_to_shared_percentage",
                    service.frontend_to_shared_percentage,
                ),
            ] {
                if !(0.0..=100.0).contains(&value) {
                    return Err(ConfigError::PercentOutOfRange {
                        service: service.name.clone(),
                        field,
                        value,
                    });
                }
            }

            if let Some(TrafficQuery::Template { template, .. }) = &service.traffic {
                if self.prometheus.template(template).is_none() {
                    return Err(ConfigError::UnknownQueryTemplate {
                        service: service.name.clone(),
                        template: template.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.namespaces.iter().find(|s| s.name == name)
    }

    /// Direct dependency lists keyed by service name
    pub fn dependency_graph(&self) -> BTreeMap<String, Vec<String>> {
        self.namespaces
            .iter()
            .map(|s| (s.name.clone(), s.depends_on.clone()))
            .collect()
    }

    /// Whether a deployment affinity key/operator pair is on the allow-list
    pub fn recognizes_affinity(&self, key: &str, operator: &str) -> bool {
        self.affinity
            .iter()
            .any(|rule| rule.key == key && rule.operator == operator)
    }
}
