use crate::AssertionResult;
use async_trait::async_trait;
use squall_scenario::Assertion;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Time box handed to an evaluator: the phase it runs inside, the assertion's
/// own deadline (already clamped to the phase deadline), and the poll cadence
/// resolved for its kind.
#[derive(Clone, Debug)]
pub struct EvalWindow {
    pub phase_start: Instant,
    pub deadline: Instant,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

/// Adapter that judges one assertion kind against observed system state.
///
/// Read-only: an evaluator never injects chaos. Failures of the observation
/// surface are absorbed into the verdict, never raised.
#[async_trait]
pub trait AssertionEvaluator: Send + Sync {
    async fn evaluate(&self, assertion: &Assertion, window: &EvalWindow) -> AssertionResult;
}

pub type SharedAssertionEvaluator = Arc<dyn AssertionEvaluator>;

/// Evaluator lookup keyed by assertion kind.
#[derive(Default)]
pub struct EvaluatorRegistry {
    by_kind: BTreeMap<String, SharedAssertionEvaluator>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: impl Into<String>,
        evaluator: SharedAssertionEvaluator,
    ) -> Option<SharedAssertionEvaluator> {
        self.by_kind.insert(kind.into(), evaluator)
    }

    pub fn resolve(&self, kind: &str) -> Option<SharedAssertionEvaluator> {
        self.by_kind.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.by_kind.keys().map(String::as_str)
    }
}
