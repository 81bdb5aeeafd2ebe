//! Prometheus instant-query client
//!
//! Request rates are read with `GET /api/v1/query`. Only the first sample of
//! the result is used; an empty result means no traffic.

use super::{async_trait, FetchError, TrafficSource};
use crate::config::PrometheusSettings;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const QUERY_PATH: &str = "api/v1/query";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: Value,
}

/// HTTP-backed [`TrafficSource`]
#[derive(Clone)]
pub struct PrometheusClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl PrometheusClient {
    pub fn new(settings: &PrometheusSettings) -> Result<Self, FetchError> {
        let timeout = settings.timeout();
        let client = Client::builder().timeout(timeout).build()?;

        let mut base = settings.url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join(QUERY_PATH))
            .map_err(|e| FetchError::Malformed(format!("invalid Prometheus URL '{}': {e}", settings.url)))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_error(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(err)
        }
    }
}

/// Extract the sample value from a `[timestamp, "value"]` pair
fn sample_value(sample: &Value) -> Result<f64, FetchError> {
    let raw = sample
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Malformed(format!("unexpected sample: {sample}")))?;

    let value: f64 = raw
        .parse()
        .map_err(|_| FetchError::Malformed(format!("non-numeric sample value '{raw}'")))?;

    // NaN shows up for rate() over an idle window
    Ok(if value.is_finite() { value } else { 0.0 })
}

fn first_value(data: &QueryData) -> Result<f64, FetchError> {
    match data.result_type.as_str() {
        "vector" | "matrix" => {
            let series = data
                .result
                .as_array()
                .ok_or_else(|| FetchError::Malformed("result is not an array".to_string()))?;

            match series.first() {
                None => Ok(0.0),
                Some(first) => {
                    let sample = first
                        .get("value")
                        .or_else(|| first.get("values").and_then(|v| v.as_array()?.last()))
                        .ok_or_else(|| FetchError::Malformed("series without samples".to_string()))?;
                    sample_value(sample)
                }
            }
        }
        "scalar" => sample_value(&data.result),
        other => Err(FetchError::Malformed(format!("unsupported result type '{other}'"))),
    }
}

#[async_trait]
impl TrafficSource for PrometheusClient {
    async fn current_rate(&self, query: &str) -> Result<f64, FetchError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| self.map_error(e))?
            .error_for_status()?;

        let body: QueryResponse = response.json().await.map_err(|e| self.map_error(e))?;

        if body.status != "success" {
            return Err(FetchError::Malformed(format!(
                "query failed: {}",
                body.error.unwrap_or(body.status)
            )));
        }

        let data = body
            .data
            .ok_or_else(|| FetchError::Malformed("response without data".to_string()))?;
        let value = first_value(&data)?;

        debug!(query, value, "Prometheus query answered");
        Ok(value)
    }
}
