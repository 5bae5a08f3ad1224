use crate::value::{DurationValue, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Document version this engine accepts.
pub const API_VERSION: &str = "chaos.trading/v1";

/// Target services of the trading ecosystem with built-in chaos endpoints.
pub const BUILTIN_SERVICES: &[&str] = &[
    "exchange",
    "custodian",
    "market-data",
    "trading",
    "risk",
    "audit",
];

/// A complete declarative chaos experiment.
///
/// Frozen once submitted; the engine never mutates the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub api_version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    pub duration: DurationValue,
    pub timeout: DurationValue,
    #[serde(default)]
    pub variables: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub rollback: RollbackSpec,
    #[serde(default)]
    pub success_criteria: BTreeSet<String>,
}

/// A named contiguous interval of a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub duration: DurationValue,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub parallel_actions: Vec<ParallelAction>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// A directive to cause a specific chaos effect on a named service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub service: String,
    pub kind: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

impl Action {
    pub fn new(service: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            kind: kind.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// An action scheduled concurrently with the phase, `delay` after phase start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParallelAction {
    #[serde(flatten)]
    pub action: Action,
    pub delay: DurationValue,
}

/// A predicate over observable system state, evaluated with a deadline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub kind: String,
    #[serde(default)]
    pub expect: String,
    pub within: DurationValue,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

impl Assertion {
    pub fn new(kind: impl Into<String>, expect: impl Into<String>, within: DurationValue) -> Self {
        Self {
            kind: kind.into(),
            expect: expect.into(),
            within,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Best-effort reverse-of-chaos sequence run after failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackSpec {
    #[serde(default)]
    pub on_failure: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Scenario {
    /// Minimal well-formed scenario; used by tests and fixtures.
    pub fn named(name: impl Into<String>, duration: DurationValue, timeout: DurationValue) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            name: name.into(),
            description: String::new(),
            version: "1".to_string(),
            duration,
            timeout,
            variables: BTreeMap::new(),
            phases: Vec::new(),
            rollback: RollbackSpec::default(),
            success_criteria: BTreeSet::new(),
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }
}

impl Phase {
    pub fn named(name: impl Into<String>, duration: DurationValue) -> Self {
        Self {
            name: name.into(),
            duration,
            actions: Vec::new(),
            parallel_actions: Vec::new(),
            assertions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_parallel_action(mut self, action: Action, delay: DurationValue) -> Self {
        self.parallel_actions.push(ParallelAction { action, delay });
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }
}
