use thiserror::Error;

/// Failures surfaced by the registry boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("execution capacity exceeded: {active} active of {limit} allowed")]
    CapacityExceeded { active: usize, limit: usize },
    #[error("unknown execution '{0}'")]
    UnknownExecution(String),
    #[error("execution '{0}' already finished")]
    AlreadyFinished(String),
    #[error("engine is shutting down")]
    Shutdown,
    #[error(transparent)]
    Validation(#[from] squall_scenario::ValidationError),
}

/// A driver call that did not succeed.
///
/// Never raised past the phase runner; converted into an `ActionResult`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ActionError {
    pub reason: String,
    pub retryable: bool,
}

impl ActionError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn canceled() -> Self {
        Self {
            reason: "canceled".to_string(),
            retryable: false,
        }
    }

    pub fn deadline_exceeded() -> Self {
        Self {
            reason: "deadline exceeded".to_string(),
            retryable: true,
        }
    }
}

/// An observation-source failure during assertion polling.
///
/// Treated as "condition not yet observed": the evaluator keeps polling
/// until its deadline.
#[derive(Debug, Error, Clone)]
pub enum ProbeError {
    #[error("observation transport failed: {0}")]
    Transport(String),
    #[error("observation payload malformed: {0}")]
    Malformed(String),
    #[error("no observation surface configured for service '{0}'")]
    UnknownService(String),
}

/// Record persistence failure at finalize; best-effort, never user-visible.
#[derive(Debug, Error, Clone)]
#[error("record store failure: {0}")]
pub struct StoreError(pub String);

/// Why an execution ended the way it did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    PhaseFailed { phase: String, detail: String },
    DeadlineExceeded,
    Stopped,
}

impl TerminationReason {
    pub fn render(&self) -> String {
        match self {
            Self::PhaseFailed { phase, detail } => {
                format!("phase '{phase}' failed: {detail}")
            }
            Self::DeadlineExceeded => "scenario timeout exceeded".to_string(),
            Self::Stopped => "stopped by external request".to_string(),
        }
    }
}
