use crate::evaluators::poll::{poll_until, verdict_to_result};
use crate::{
    AssertionEvaluator, AssertionResult, EvalWindow, ObservationQuery, SharedObservationSource,
};
use async_trait::async_trait;
use serde_json::Value;
use squall_scenario::{Assertion, ParamValue};
use tokio::time::Instant;

fn query_for(assertion: &Assertion, surface: &str) -> ObservationQuery {
    let mut query = ObservationQuery::surface(surface);
    if let Some(service) = assertion.parameters.get("service").and_then(ParamValue::as_str) {
        query = query.on_service(service);
    }
    query
}

/// `system_health` / `system_recovery`: a service reports the expected
/// health status (default "healthy").
pub struct HealthEvaluator {
    source: SharedObservationSource,
}

impl HealthEvaluator {
    pub fn new(source: SharedObservationSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AssertionEvaluator for HealthEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let query = query_for(assertion, "health");
        let expected = if assertion.expect.is_empty() {
            "healthy"
        } else {
            assertion.expect.as_str()
        };
        let verdict = poll_until(self.source.as_ref(), &query, window, |observation| {
            observation.data["status"] == expected
        })
        .await;
        verdict_to_result(&assertion.kind, "health", verdict, started)
    }
}

/// `risk_alert` / `alert_resolution`: an alert named by `expect` is present
/// in the required state.
pub struct AlertEvaluator {
    source: SharedObservationSource,
    required_state: &'static str,
}

impl AlertEvaluator {
    pub fn new(source: SharedObservationSource, required_state: &'static str) -> Self {
        Self {
            source,
            required_state,
        }
    }
}

#[async_trait]
impl AssertionEvaluator for AlertEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let query = query_for(assertion, "alerts");
        let name = assertion.expect.clone();
        let state = self.required_state;
        let verdict = poll_until(self.source.as_ref(), &query, window, move |observation| {
            observation.data["state"] == state
                && (name.is_empty() || observation.data["alert"] == name.as_str())
        })
        .await;
        verdict_to_result(&assertion.kind, "alert", verdict, started)
    }
}

/// `trading_adaptation`: the trading system switched into the expected mode
/// in response to injected chaos.
pub struct TradingAdaptationEvaluator {
    source: SharedObservationSource,
}

impl TradingAdaptationEvaluator {
    pub fn new(source: SharedObservationSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AssertionEvaluator for TradingAdaptationEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let query = query_for(assertion, "trading");
        let expect = assertion.expect.clone();
        let verdict = poll_until(self.source.as_ref(), &query, window, move |observation| {
            if expect.is_empty() {
                observation.data["adapted"] == true
            } else {
                observation.data["mode"] == expect.as_str()
            }
        })
        .await;
        verdict_to_result(&assertion.kind, "trading", verdict, started)
    }
}

/// `price_divergence`: the spread between venues reached the threshold, in
/// basis points.
pub struct PriceDivergenceEvaluator {
    source: SharedObservationSource,
}

impl PriceDivergenceEvaluator {
    pub fn new(source: SharedObservationSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AssertionEvaluator for PriceDivergenceEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let query = query_for(assertion, "market");
        let threshold = assertion
            .parameters
            .get("min_bps")
            .and_then(ParamValue::as_f64)
            .or_else(|| assertion.expect.parse().ok())
            .unwrap_or(0.0);
        let verdict = poll_until(self.source.as_ref(), &query, window, move |observation| {
            observation.data["divergence_bps"]
                .as_f64()
                .is_some_and(|bps| bps.abs() >= threshold)
        })
        .await;
        verdict_to_result(&assertion.kind, "market", verdict, started)
    }
}

/// `performance_recovery`: a named metric dropped back to (or under) its
/// threshold.
pub struct MetricThresholdEvaluator {
    source: SharedObservationSource,
}

impl MetricThresholdEvaluator {
    pub fn new(source: SharedObservationSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AssertionEvaluator for MetricThresholdEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let query = query_for(assertion, "metrics");
        let metric = assertion
            .parameters
            .get("metric")
            .and_then(ParamValue::as_str)
            .unwrap_or(assertion.expect.as_str())
            .to_string();
        let threshold = assertion
            .parameters
            .get("threshold")
            .and_then(ParamValue::as_f64)
            .unwrap_or(0.0);
        let verdict = poll_until(self.source.as_ref(), &query, window, move |observation| {
            observation.data["metric"] == metric.as_str()
                && observation.data["value"]
                    .as_f64()
                    .is_some_and(|value| value <= threshold)
        })
        .await;
        verdict_to_result(&assertion.kind, "metric", verdict, started)
    }
}

/// `audit_correlation`: the audit trail recorded an event carrying the
/// given correlation id.
pub struct AuditCorrelationEvaluator {
    source: SharedObservationSource,
}

impl AuditCorrelationEvaluator {
    pub fn new(source: SharedObservationSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AssertionEvaluator for AuditCorrelationEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let query = query_for(assertion, "audit");
        let correlation = assertion
            .parameters
            .get("correlation_id")
            .and_then(ParamValue::as_str)
            .unwrap_or(assertion.expect.as_str())
            .to_string();
        let verdict = poll_until(self.source.as_ref(), &query, window, move |observation| {
            observation.data["correlation_id"] == correlation.as_str()
        })
        .await;
        verdict_to_result(&assertion.kind, "audit_event", verdict, started)
    }
}

/// `custom`: `expect` is a comparison expression `<field> <op> <value>`
/// judged against each sampled observation. The field may be a dotted path.
pub struct CustomExpressionEvaluator {
    source: SharedObservationSource,
}

impl CustomExpressionEvaluator {
    pub fn new(source: SharedObservationSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl AssertionEvaluator for CustomExpressionEvaluator {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult {
        let started = Instant::now();
        let surface = assertion
            .parameters
            .get("surface")
            .and_then(ParamValue::as_str)
            .unwrap_or("metrics");
        let query = query_for(assertion, surface);

        let Some(expression) = parse_expectation(&assertion.expect) else {
            // Malformed expression can never be observed; report the timeout
            // path with an explanatory message once the window closes.
            let mut result = verdict_to_result(
                &assertion.kind,
                "observation",
                crate::evaluators::poll::PollVerdict::Timeout { polls: 0 },
                started,
            );
            result.message = format!("unparsable expectation '{}'", assertion.expect);
            return result;
        };

        let verdict = poll_until(self.source.as_ref(), &query, window, move |observation| {
            expression.holds(&observation.data)
        })
        .await;
        verdict_to_result(&assertion.kind, "observation", verdict, started)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExpectOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
struct Expectation {
    field: String,
    op: ExpectOp,
    rhs: String,
}

impl Expectation {
    fn holds(&self, data: &Value) -> bool {
        let pointer = format!("/{}", self.field.replace('.', "/"));
        let Some(actual) = data.pointer(&pointer) else {
            return false;
        };
        match (actual.as_f64(), self.rhs.parse::<f64>().ok()) {
            (Some(lhs), Some(rhs)) => match self.op {
                ExpectOp::Eq => lhs == rhs,
                ExpectOp::Ne => lhs != rhs,
                ExpectOp::Lt => lhs < rhs,
                ExpectOp::Le => lhs <= rhs,
                ExpectOp::Gt => lhs > rhs,
                ExpectOp::Ge => lhs >= rhs,
            },
            _ => {
                let lhs = match actual {
                    Value::String(inner) => inner.clone(),
                    other => other.to_string(),
                };
                match self.op {
                    ExpectOp::Eq => lhs == self.rhs,
                    ExpectOp::Ne => lhs != self.rhs,
                    _ => false,
                }
            }
        }
    }
}

fn parse_expectation(expect: &str) -> Option<Expectation> {
    // Longest operators first so ">=" is not split as ">" + "=".
    for (token, op) in [
        (">=", ExpectOp::Ge),
        ("<=", ExpectOp::Le),
        ("!=", ExpectOp::Ne),
        ("==", ExpectOp::Eq),
        (">", ExpectOp::Gt),
        ("<", ExpectOp::Lt),
    ] {
        if let Some((field, rhs)) = expect.split_once(token) {
            let field = field.trim();
            let rhs = rhs.trim();
            if field.is_empty() || rhs.is_empty() {
                return None;
            }
            return Some(Expectation {
                field: field.to_string(),
                op,
                rhs: rhs.to_string(),
            });
        }
    }
    None
}
