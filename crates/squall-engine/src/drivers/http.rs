use crate::drivers::schema;
use crate::{ActionDriver, ActionError, ServiceEndpoint};
use async_trait::async_trait;
use serde_json::{Map, Value};
use squall_scenario::{Action, ParamValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const CORRELATION_HEADER: &str = "X-Chaos-Correlation-Id";

/// Transport-level retry ladder; application-level failures are never
/// retried in-driver.
const TRANSPORT_RETRY_BACKOFF_MS: [u64; 2] = [100, 400];

/// Driver speaking the chaos wire contract: POST to the service's chaos
/// endpoint, 2xx success, 4xx non-retryable, 5xx retryable, correlation id
/// in a header so the remote side can deduplicate and clear.
pub struct HttpChaosDriver {
    client: reqwest::Client,
    service: String,
    endpoint: ServiceEndpoint,
}

impl HttpChaosDriver {
    pub fn new(client: reqwest::Client, service: impl Into<String>, endpoint: ServiceEndpoint) -> Self {
        Self {
            client,
            service: service.into(),
            endpoint,
        }
    }

    fn inject_url(&self, kind: &str) -> String {
        format!("{}/chaos/{kind}", self.endpoint.base_url.trim_end_matches('/'))
    }

    fn clear_url(&self) -> String {
        format!("{}/chaos", self.endpoint.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ActionDriver for HttpChaosDriver {
    fn validate(&self, action: &Action) -> Result<(), ActionError> {
        schema::validate_parameters(action)
    }

    async fn execute(
        &self,
        action: &Action,
        deadline: Instant,
        cancel: &CancellationToken,
        correlation_id: &str,
    ) -> Result<(), ActionError> {
        self.validate(action)?;
        let url = self.inject_url(&action.kind);
        let body = parameters_to_json(&action.parameters);
        let mut backoff = TRANSPORT_RETRY_BACKOFF_MS.iter();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ActionError::deadline_exceeded());
            }
            let attempt_budget = remaining.min(self.endpoint.timeout);

            let request = self
                .client
                .post(&url)
                .header(CORRELATION_HEADER, correlation_id)
                .json(&body)
                .send();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ActionError::canceled()),
                result = tokio::time::timeout(attempt_budget, request) => result,
            };

            let transport_failure = match outcome {
                Ok(Ok(response)) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if status.is_server_error() {
                        return Err(ActionError::retryable(format!(
                            "{} returned {status}",
                            self.service
                        )));
                    }
                    return Err(ActionError::fatal(format!(
                        "{} returned {status}",
                        self.service
                    )));
                }
                Ok(Err(error)) => error.to_string(),
                Err(_elapsed) if remaining <= self.endpoint.timeout => {
                    return Err(ActionError::deadline_exceeded());
                }
                Err(_elapsed) => format!("no response within {:?}", self.endpoint.timeout),
            };

            let Some(delay_ms) = backoff.next() else {
                return Err(ActionError::retryable(format!(
                    "transport failure talking to {}: {transport_failure}",
                    self.service
                )));
            };
            tracing::debug!(
                service = %self.service,
                kind = %action.kind,
                delay_ms = *delay_ms,
                "transport failure, retrying: {transport_failure}"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(ActionError::canceled()),
                _ = tokio::time::sleep(Duration::from_millis(*delay_ms)) => {}
            }
        }
    }

    async fn clear(&self, correlation_id: &str, deadline: Instant) -> Result<(), ActionError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ActionError::deadline_exceeded());
        }
        let request = self
            .client
            .delete(self.clear_url())
            .header(CORRELATION_HEADER, correlation_id)
            .send();
        match tokio::time::timeout(remaining.min(self.endpoint.timeout), request).await {
            Err(_elapsed) => Err(ActionError::deadline_exceeded()),
            Ok(Err(error)) => Err(ActionError::retryable(format!(
                "transport failure clearing on {}: {error}",
                self.service
            ))),
            Ok(Ok(response)) => {
                let status = response.status();
                // 404 means nothing to clear, which the contract tolerates.
                if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
                    Ok(())
                } else {
                    Err(ActionError::fatal(format!(
                        "{} refused clear with {status}",
                        self.service
                    )))
                }
            }
        }
    }
}

fn parameters_to_json(parameters: &BTreeMap<String, ParamValue>) -> Value {
    let mut body = Map::new();
    for (key, value) in parameters {
        body.insert(key.clone(), param_value_to_json(value));
    }
    Value::Object(body)
}

fn param_value_to_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::String(inner) => Value::String(inner.clone()),
        ParamValue::Integer(inner) => Value::from(*inner),
        ParamValue::Float(inner) => Value::from(*inner),
        ParamValue::Boolean(inner) => Value::Bool(*inner),
        ParamValue::Duration(inner) => Value::String(inner.raw.clone()),
        ParamValue::List(items) => Value::Array(items.iter().map(param_value_to_json).collect()),
        ParamValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), param_value_to_json(value)))
                .collect(),
        ),
    }
}
