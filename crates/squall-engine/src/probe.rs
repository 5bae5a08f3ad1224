use crate::{ProbeError, ServiceEndpoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One snapshot of external state, as reported by a target service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub observed_at: DateTime<Utc>,
    pub data: Value,
}

/// What an evaluator wants to look at: a read-only surface on one service,
/// optionally narrowed by filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationQuery {
    pub surface: String,
    pub service: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl ObservationQuery {
    pub fn surface(surface: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            service: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn on_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

/// Read-only window onto the ecosystem. Evaluators never inject chaos; this
/// seam is the only way they see the world, and tests substitute it.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn sample(&self, query: &ObservationQuery) -> Result<Vec<Observation>, ProbeError>;
}

pub type SharedObservationSource = Arc<dyn ObservationSource>;

/// Service a surface is read from when the query does not name one.
pub fn default_service_for_surface(surface: &str) -> Option<&'static str> {
    match surface {
        "alerts" => Some("risk"),
        "trading" => Some("trading"),
        "market" => Some("market-data"),
        "metrics" => Some("audit"),
        "audit" => Some("audit"),
        _ => None,
    }
}

/// HTTP observation source: GET `<base_url>/observe/<surface>` with the
/// query filters, expecting a JSON array of observations.
pub struct HttpObservationSource {
    client: reqwest::Client,
    services: BTreeMap<String, ServiceEndpoint>,
}

impl HttpObservationSource {
    pub fn new(client: reqwest::Client, services: BTreeMap<String, ServiceEndpoint>) -> Self {
        Self { client, services }
    }

    fn endpoint_for(&self, query: &ObservationQuery) -> Result<&ServiceEndpoint, ProbeError> {
        let service = query
            .service
            .as_deref()
            .or_else(|| default_service_for_surface(&query.surface))
            .ok_or_else(|| ProbeError::UnknownService(query.surface.clone()))?;
        self.services
            .get(service)
            .ok_or_else(|| ProbeError::UnknownService(service.to_string()))
    }
}

#[async_trait]
impl ObservationSource for HttpObservationSource {
    async fn sample(&self, query: &ObservationQuery) -> Result<Vec<Observation>, ProbeError> {
        let endpoint = self.endpoint_for(query)?;
        let url = format!(
            "{}/observe/{}",
            endpoint.base_url.trim_end_matches('/'),
            query.surface
        );
        let request = self
            .client
            .get(&url)
            .query(&query.filters.iter().collect::<Vec<_>>())
            .send();
        let response = tokio::time::timeout(endpoint.timeout, request)
            .await
            .map_err(|_| ProbeError::Transport(format!("no response from {url}")))?
            .map_err(|error| ProbeError::Transport(error.to_string()))?;
        if !response.status().is_success() {
            return Err(ProbeError::Transport(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|error| ProbeError::Malformed(error.to_string()))?;
        parse_observations(body)
    }
}

fn parse_observations(body: Value) -> Result<Vec<Observation>, ProbeError> {
    let Value::Array(items) = body else {
        return Err(ProbeError::Malformed(
            "observation payload is not an array".to_string(),
        ));
    };
    let mut observations = Vec::with_capacity(items.len());
    for item in items {
        let observed_at = item
            .get("observed_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        observations.push(Observation {
            observed_at,
            data: item,
        });
    }
    Ok(observations)
}
