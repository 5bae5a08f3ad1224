use crate::{
    correlation_id, ActionError, ActionResult, AssertionResult, DriverRegistry, EngineConfig,
    EvalWindow, EvaluatorRegistry, EventSink, ExecutionEvent, PhaseResult, SharedActionDriver,
};
use chrono::Utc;
use futures::future::join_all;
use squall_scenario::{Action, Assertion, Phase};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Executes a single phase: the sequential action stream, the delayed
/// parallel injections, and the concurrent assertion block, all under the
/// phase deadline.
///
/// Every action launched here is accounted for in the returned
/// `PhaseResult`, and no spawned task outlives the call by more than the
/// cancellation grace.
pub struct PhaseRunner {
    config: Arc<EngineConfig>,
    drivers: Arc<DriverRegistry>,
    evaluators: Arc<EvaluatorRegistry>,
    events: EventSink,
}

impl PhaseRunner {
    pub fn new(
        config: Arc<EngineConfig>,
        drivers: Arc<DriverRegistry>,
        evaluators: Arc<EvaluatorRegistry>,
        events: EventSink,
    ) -> Self {
        Self {
            config,
            drivers,
            evaluators,
            events,
        }
    }

    pub async fn run(
        &self,
        execution_id: &str,
        phase: &Phase,
        scenario_deadline: Instant,
        cancel: &CancellationToken,
    ) -> PhaseResult {
        let started_at = Utc::now();
        let phase_start = Instant::now();
        let phase_deadline = (phase_start + phase.duration.as_duration()).min(scenario_deadline);
        let phase_cancel = cancel.child_token();
        self.events.emit(ExecutionEvent::PhaseStarted {
            execution_id: execution_id.to_string(),
            phase: phase.name.clone(),
        });

        let mut parallel_tasks = Vec::with_capacity(phase.parallel_actions.len());
        for parallel in &phase.parallel_actions {
            let driver = self.drivers.resolve(&parallel.action);
            let action = parallel.action.clone();
            let token = phase_cancel.clone();
            let delay = parallel.delay.as_duration();
            let cid = correlation_id(&action.service, &action.kind);
            let identity = (action.service.clone(), action.kind.clone(), cid.clone());
            let grace = self.config.cancellation_grace;
            let handle = tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return canceled_result(&action, &cid),
                    _ = tokio::time::sleep(delay) => {}
                }
                execute_action(driver, &action, phase_deadline, &token, &cid, grace).await
            });
            parallel_tasks.push((identity, handle));
        }

        let mut actions = Vec::new();
        let mut error: Option<String> = None;

        for action in &phase.actions {
            let cid = correlation_id(&action.service, &action.kind);
            let result = if phase_cancel.is_cancelled() {
                canceled_result(action, &cid)
            } else {
                let action_deadline = (Instant::now()
                    + self.config.action_timeout_for(&action.service))
                .min(phase_deadline);
                execute_action(
                    self.drivers.resolve(action),
                    action,
                    action_deadline,
                    &phase_cancel,
                    &cid,
                    self.config.cancellation_grace,
                )
                .await
            };
            self.emit_action(execution_id, &phase.name, &result);
            let failed = !result.success;
            if failed {
                error = Some(describe_action_failure(&result));
            }
            actions.push(result);
            if failed {
                break;
            }
        }

        // The assertion block is the phase's oracle; it only runs when the
        // sequential stream survived.
        let mut assertions: Vec<AssertionResult> = Vec::new();
        if error.is_none() {
            let futures = phase.assertions.iter().map(|assertion| {
                let window = EvalWindow {
                    phase_start,
                    deadline: (phase_start + assertion.within.as_duration()).min(phase_deadline),
                    poll_interval: self.config.poll_interval_for(&assertion.kind),
                    cancel: phase_cancel.clone(),
                };
                async move {
                    match self.evaluators.resolve(&assertion.kind) {
                        Some(evaluator) => evaluator.evaluate(assertion, &window).await,
                        None => unknown_kind_result(assertion),
                    }
                }
            });
            assertions = join_all(futures).await;
            for result in &assertions {
                self.events.emit(ExecutionEvent::AssertionCompleted {
                    execution_id: execution_id.to_string(),
                    phase: phase.name.clone(),
                    assertion_kind: result.kind.clone(),
                    passed: result.passed,
                });
            }
            if let Some(first_failed) = assertions.iter().find(|result| !result.passed) {
                error = Some(format!(
                    "assertion '{}' failed: {}",
                    first_failed.kind, first_failed.message
                ));
            }
        }

        // Phase is over: cut the phase-scoped signal and reel the parallel
        // injections back in within the grace period.
        phase_cancel.cancel();
        for ((service, kind, cid), mut handle) in parallel_tasks {
            let result =
                match tokio::time::timeout(self.config.cancellation_grace, &mut handle).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => {
                        tracing::warn!(%service, %kind, "parallel action task failed: {join_error}");
                        synthesized_result(&service, &kind, &cid, "task failed")
                    }
                    Err(_elapsed) => {
                        tracing::warn!(
                            %service,
                            %kind,
                            "parallel action did not unwind within grace; abandoning"
                        );
                        handle.abort();
                        synthesized_result(&service, &kind, &cid, "canceled")
                    }
                };
            self.emit_action(execution_id, &phase.name, &result);
            actions.push(result);
        }

        let success = error.is_none();
        self.events.emit(ExecutionEvent::PhaseCompleted {
            execution_id: execution_id.to_string(),
            phase: phase.name.clone(),
            success,
        });
        PhaseResult {
            phase_name: phase.name.clone(),
            start_time: started_at,
            end_time: Utc::now(),
            success,
            error,
            actions,
            assertions,
        }
    }

    fn emit_action(&self, execution_id: &str, phase: &str, result: &ActionResult) {
        self.events.emit(ExecutionEvent::ActionCompleted {
            execution_id: execution_id.to_string(),
            phase: phase.to_string(),
            service: result.service.clone(),
            action_kind: result.kind.clone(),
            correlation_id: result.correlation_id.clone(),
            success: result.success,
        });
    }
}

/// Runs one driver call and converts the outcome into an `ActionResult`.
///
/// Bounded three ways: the driver's own deadline handling, the cancellation
/// signal, and a hard stop at deadline plus grace for drivers that misbehave.
pub(crate) async fn execute_action(
    driver: Option<SharedActionDriver>,
    action: &Action,
    deadline: Instant,
    cancel: &CancellationToken,
    correlation_id: &str,
    grace: Duration,
) -> ActionResult {
    let start_time = Utc::now();
    let outcome = match driver {
        None => Err(ActionError::fatal(format!(
            "no driver registered for service '{}'",
            action.service
        ))),
        Some(driver) => match driver.validate(action) {
            Err(error) => Err(error),
            Ok(()) => {
                tokio::select! {
                    result = driver.execute(action, deadline, cancel, correlation_id) => result,
                    _ = cancel.cancelled() => Err(ActionError::canceled()),
                    _ = tokio::time::sleep_until(deadline + grace) => {
                        Err(ActionError::deadline_exceeded())
                    }
                }
            }
        },
    };
    ActionResult {
        service: action.service.clone(),
        kind: action.kind.clone(),
        correlation_id: correlation_id.to_string(),
        start_time,
        end_time: Utc::now(),
        success: outcome.is_ok(),
        error: outcome.err().map(|error| error.reason),
    }
}

fn canceled_result(action: &Action, correlation_id: &str) -> ActionResult {
    synthesized_result(&action.service, &action.kind, correlation_id, "canceled")
}

fn synthesized_result(service: &str, kind: &str, correlation_id: &str, reason: &str) -> ActionResult {
    let now = Utc::now();
    ActionResult {
        service: service.to_string(),
        kind: kind.to_string(),
        correlation_id: correlation_id.to_string(),
        start_time: now,
        end_time: now,
        success: false,
        error: Some(reason.to_string()),
    }
}

fn unknown_kind_result(assertion: &Assertion) -> AssertionResult {
    AssertionResult {
        kind: assertion.kind.clone(),
        passed: false,
        message: format!("no evaluator registered for kind '{}'", assertion.kind),
        timestamp: Utc::now(),
        evidence: BTreeMap::new(),
        elapsed_ms: 0,
    }
}

fn describe_action_failure(result: &ActionResult) -> String {
    format!(
        "action '{}/{}' failed: {}",
        result.service,
        result.kind,
        result.error.as_deref().unwrap_or("unknown error")
    )
}
