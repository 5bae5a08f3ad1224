use crate::ActionError;
use squall_scenario::{Action, ParamValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn spec(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind }
}

/// Required parameters per built-in `(service, action kind)` pair.
///
/// Unknown pairs are accepted with no schema: custom chaos kinds validate on
/// the remote side.
pub fn required_parameters(service: &str, kind: &str) -> Option<&'static [ParamSpec]> {
    const NETWORK_LATENCY: [ParamSpec; 1] = [spec("latency_ms", ParamKind::Integer)];
    const NETWORK_PARTITION: [ParamSpec; 1] = [spec("duration", ParamKind::Duration)];
    const SERVICE_FAILURE: [ParamSpec; 1] = [spec("probability", ParamKind::Float)];
    const RESOURCE_PRESSURE: [ParamSpec; 1] = [spec("cpu_percent", ParamKind::Integer)];
    const SLOW_RESPONSE: [ParamSpec; 1] = [spec("factor", ParamKind::Float)];
    const HALT_MATCHING: [ParamSpec; 1] = [spec("instrument", ParamKind::String)];
    const PRICE_SPIKE: [ParamSpec; 2] = [
        spec("instrument", ParamKind::String),
        spec("offset_bps", ParamKind::Integer),
    ];
    const STALE_FEED: [ParamSpec; 1] = [spec("duration", ParamKind::Duration)];
    const SETTLEMENT_DELAY: [ParamSpec; 1] = [spec("delay", ParamKind::Duration)];
    const ORDER_REJECTS: [ParamSpec; 1] = [spec("probability", ParamKind::Float)];
    const LIMIT_BREACH: [ParamSpec; 1] = [spec("limit", ParamKind::String)];
    const ALERT_FLOOD: [ParamSpec; 1] = [spec("rate_per_second", ParamKind::Integer)];
    const DROP_EVENTS: [ParamSpec; 1] = [spec("probability", ParamKind::Float)];

    let specs: &'static [ParamSpec] = match (service, kind) {
        (_, "network_latency") => &NETWORK_LATENCY,
        (_, "network_partition") => &NETWORK_PARTITION,
        (_, "service_failure") => &SERVICE_FAILURE,
        (_, "resource_pressure") => &RESOURCE_PRESSURE,
        (_, "slow_response") => &SLOW_RESPONSE,
        ("exchange", "halt_matching") => &HALT_MATCHING,
        ("market-data", "price_spike") => &PRICE_SPIKE,
        ("market-data", "stale_feed") => &STALE_FEED,
        ("custodian", "settlement_delay") => &SETTLEMENT_DELAY,
        ("trading", "order_rejects") => &ORDER_REJECTS,
        ("risk", "limit_breach") => &LIMIT_BREACH,
        ("risk", "alert_flood") => &ALERT_FLOOD,
        ("audit", "drop_events") => &DROP_EVENTS,
        _ => return None,
    };
    Some(specs)
}

pub fn known_action(service: &str, kind: &str) -> bool {
    required_parameters(service, kind).is_some()
}

/// Checks presence and type of every required parameter.
pub fn validate_parameters(action: &Action) -> Result<(), ActionError> {
    let Some(specs) = required_parameters(&action.service, &action.kind) else {
        return Ok(());
    };
    for spec in specs {
        let Some(value) = action.parameters.get(spec.name) else {
            return Err(ActionError::fatal(format!(
                "action '{}/{}' is missing required parameter '{}'",
                action.service, action.kind, spec.name
            )));
        };
        let matches = match spec.kind {
            ParamKind::String => value.as_str().is_some(),
            ParamKind::Integer => value.as_i64().is_some(),
            ParamKind::Float => value.as_f64().is_some(),
            ParamKind::Boolean => value.as_bool().is_some(),
            ParamKind::Duration => value.as_duration().is_some(),
        };
        if !matches {
            return Err(ActionError::fatal(format!(
                "action '{}/{}' parameter '{}' has the wrong type",
                action.service, action.kind, spec.name
            )));
        }
    }
    validate_ranges(action)
}

fn validate_ranges(action: &Action) -> Result<(), ActionError> {
    if let Some(probability) = action.parameters.get("probability").and_then(ParamValue::as_f64) {
        if !(0.0..=1.0).contains(&probability) {
            return Err(ActionError::fatal(format!(
                "action '{}/{}' probability {probability} is outside [0, 1]",
                action.service, action.kind
            )));
        }
    }
    if let Some(cpu) = action.parameters.get("cpu_percent").and_then(ParamValue::as_i64) {
        if !(0..=100).contains(&cpu) {
            return Err(ActionError::fatal(format!(
                "action '{}/{}' cpu_percent {cpu} is outside [0, 100]",
                action.service, action.kind
            )));
        }
    }
    Ok(())
}
