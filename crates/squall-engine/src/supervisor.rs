use crate::rollback::successful_injections;
use crate::{
    DriverRegistry, EngineConfig, EvaluatorRegistry, EventSink, ExecutionEvent, ExecutionRecord,
    ExecutionStatus, PhaseRunner, RollbackController, SharedRecordStore, TerminationReason,
};
use squall_scenario::Scenario;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Control surface shared between a running execution and the registry:
/// the scenario-level cancellation signal plus the flags that tell the
/// finalizer why it fired.
pub struct ExecutionSignals {
    pub cancel: CancellationToken,
    stop_requested: AtomicBool,
    timed_out: AtomicBool,
}

impl ExecutionSignals {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            stop_requested: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
        }
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }
}

impl Default for ExecutionSignals {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn lock_record<'a>(
    record: &'a Arc<Mutex<ExecutionRecord>>,
) -> MutexGuard<'a, ExecutionRecord> {
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives one execution from Pending to a terminal status: walks phases
/// through the phase runner, enforces the scenario timeout, triggers
/// rollback, finalizes and persists the record.
pub struct ExecutionSupervisor {
    config: Arc<EngineConfig>,
    phase_runner: PhaseRunner,
    rollback: RollbackController,
    store: Option<SharedRecordStore>,
    events: EventSink,
}

impl ExecutionSupervisor {
    pub fn new(
        config: Arc<EngineConfig>,
        drivers: Arc<DriverRegistry>,
        evaluators: Arc<EvaluatorRegistry>,
        store: Option<SharedRecordStore>,
        events: EventSink,
    ) -> Self {
        Self {
            phase_runner: PhaseRunner::new(
                config.clone(),
                drivers.clone(),
                evaluators,
                events.clone(),
            ),
            rollback: RollbackController::new(config.clone(), drivers, events.clone()),
            config,
            store,
            events,
        }
    }

    pub async fn run(
        &self,
        scenario: Arc<Scenario>,
        record: Arc<Mutex<ExecutionRecord>>,
        signals: Arc<ExecutionSignals>,
    ) -> ExecutionStatus {
        let execution_id = lock_record(&record).execution_id.clone();

        // A stop that lands before the first phase short-circuits the run.
        if signals.cancel.is_cancelled() {
            return self
                .finalize(&record, ExecutionStatus::Stopped, Some(TerminationReason::Stopped))
                .await;
        }

        lock_record(&record).mark_running();
        self.events.emit(ExecutionEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            scenario: scenario.name.clone(),
        });
        tracing::info!(%execution_id, scenario = %scenario.name, "execution started");

        let timeout = if scenario.timeout.is_zero() {
            self.config.default_scenario_timeout
        } else {
            scenario.timeout.as_duration()
        };
        let scenario_deadline = Instant::now() + timeout;
        let watchdog = tokio::spawn({
            let signals = signals.clone();
            async move {
                tokio::select! {
                    _ = signals.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(scenario_deadline) => signals.mark_timed_out(),
                }
            }
        });

        let mut failed_phase: Option<TerminationReason> = None;
        for phase in &scenario.phases {
            if signals.cancel.is_cancelled() {
                break;
            }
            let result = self
                .phase_runner
                .run(&execution_id, phase, scenario_deadline, &signals.cancel)
                .await;
            let failure = (!result.success).then(|| TerminationReason::PhaseFailed {
                phase: result.phase_name.clone(),
                detail: result
                    .error
                    .clone()
                    .unwrap_or_else(|| "phase failed".to_string()),
            });
            lock_record(&record).append_phase(result);
            if let Some(reason) = failure {
                failed_phase = Some(reason);
                break;
            }
        }
        watchdog.abort();

        let stopped = signals.stop_requested();
        let timed_out = signals.timed_out();

        // A stop is an operator abort, not a failure: it rolls back only
        // under aggressive cleanup, even when it made the current phase fail.
        let rollback_wanted = self.config.rollback.enabled
            && if stopped {
                self.config.rollback.aggressive_cleanup
            } else {
                failed_phase.is_some() && scenario.rollback.on_failure
            };
        if rollback_wanted {
            let targets = successful_injections(&lock_record(&record));
            let report = self
                .rollback
                .run(&execution_id, &scenario.rollback.actions, &targets)
                .await;
            lock_record(&record).set_rollback(report);
        }

        let (status, reason) = if stopped {
            (ExecutionStatus::Stopped, Some(TerminationReason::Stopped))
        } else if timed_out {
            (
                ExecutionStatus::TimedOut,
                Some(TerminationReason::DeadlineExceeded),
            )
        } else if let Some(reason) = failed_phase {
            (ExecutionStatus::Failed, Some(reason))
        } else {
            (ExecutionStatus::Completed, None)
        };
        self.finalize(&record, status, reason).await
    }

    async fn finalize(
        &self,
        record: &Arc<Mutex<ExecutionRecord>>,
        status: ExecutionStatus,
        reason: Option<TerminationReason>,
    ) -> ExecutionStatus {
        let snapshot = {
            let mut guard = lock_record(record);
            guard.finalize(status, reason.map(|reason| reason.render()));
            guard.clone()
        };
        self.events.emit(ExecutionEvent::ExecutionFinalized {
            execution_id: snapshot.execution_id.clone(),
            status: snapshot.status,
        });
        tracing::info!(
            execution_id = %snapshot.execution_id,
            status = snapshot.status.as_str(),
            "execution finalized"
        );
        if let Some(store) = &self.store {
            // Persistence is best-effort: a failed write never changes the
            // user-visible verdict.
            if let Err(error) = store.persist(&snapshot).await {
                tracing::warn!(
                    execution_id = %snapshot.execution_id,
                    "record persistence failed: {error}"
                );
            }
        }
        snapshot.status
    }
}
