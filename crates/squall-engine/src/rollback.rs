use crate::phase::execute_action;
use crate::{
    correlation_id, ActionError, ClearOutcome, DriverRegistry, EngineConfig, EventSink,
    ExecutionEvent, ExecutionRecord, RollbackReport,
};
use squall_scenario::Action;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A previously recorded injection that rollback should try to reverse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClearTarget {
    pub service: String,
    pub kind: String,
    pub correlation_id: String,
}

/// Injections worth clearing: every action that actually reached its target.
pub fn successful_injections(record: &ExecutionRecord) -> Vec<ClearTarget> {
    record
        .phases
        .iter()
        .flat_map(|phase| &phase.actions)
        .filter(|action| action.success)
        .map(|action| ClearTarget {
            service: action.service.clone(),
            kind: action.kind.clone(),
            correlation_id: action.correlation_id.clone(),
        })
        .collect()
}

/// Best-effort reverse-of-chaos pass.
///
/// Clears recorded injections first, then runs the scenario's declared
/// rollback actions in order. Failures are recorded and skipped past; the
/// pass never runs assertions and can never trigger another rollback.
pub struct RollbackController {
    config: Arc<EngineConfig>,
    drivers: Arc<DriverRegistry>,
    events: EventSink,
}

impl RollbackController {
    pub fn new(config: Arc<EngineConfig>, drivers: Arc<DriverRegistry>, events: EventSink) -> Self {
        Self {
            config,
            drivers,
            events,
        }
    }

    pub async fn run(
        &self,
        execution_id: &str,
        declared: &[Action],
        targets: &[ClearTarget],
    ) -> RollbackReport {
        self.events.emit(ExecutionEvent::RollbackStarted {
            execution_id: execution_id.to_string(),
        });
        let overall_deadline = Instant::now() + self.config.rollback.timeout;
        // Rollback runs after the scenario signal has often already fired,
        // so it carries its own token and is bounded by deadlines alone.
        let token = CancellationToken::new();
        let mut report = RollbackReport::default();

        for target in targets {
            let deadline = self.per_call_deadline(&target.service, overall_deadline);
            let lookup = Action::new(target.service.clone(), target.kind.clone());
            let outcome = match self.drivers.resolve(&lookup) {
                None => Err(ActionError::fatal(format!(
                    "no driver registered for service '{}'",
                    target.service
                ))),
                Some(driver) => driver.clear(&target.correlation_id, deadline).await,
            };
            if let Err(error) = &outcome {
                tracing::warn!(
                    service = %target.service,
                    correlation_id = %target.correlation_id,
                    "rollback clear failed: {error}"
                );
            }
            report.clears.push(ClearOutcome {
                service: target.service.clone(),
                correlation_id: target.correlation_id.clone(),
                success: outcome.is_ok(),
                error: outcome.err().map(|error| error.reason),
            });
        }

        for action in declared {
            let cid = correlation_id(&action.service, &action.kind);
            let deadline = self.per_call_deadline(&action.service, overall_deadline);
            let result = execute_action(
                self.drivers.resolve(action),
                action,
                deadline,
                &token,
                &cid,
                self.config.cancellation_grace,
            )
            .await;
            if let Some(error) = &result.error {
                tracing::warn!(
                    service = %action.service,
                    kind = %action.kind,
                    "rollback action failed: {error}"
                );
            }
            report.actions.push(result);
        }

        let failed_actions = report
            .actions
            .iter()
            .filter(|result| !result.success)
            .count()
            + report.clears.iter().filter(|clear| !clear.success).count();
        self.events.emit(ExecutionEvent::RollbackCompleted {
            execution_id: execution_id.to_string(),
            failed_actions,
        });
        report
    }

    fn per_call_deadline(&self, service: &str, overall: Instant) -> Instant {
        (Instant::now() + self.config.action_timeout_for(service)).min(overall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActionDriver, ExecutionStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingDriver {
        cleared: Mutex<Vec<String>>,
        fail_kind: Option<&'static str>,
    }

    impl RecordingDriver {
        fn new(fail_kind: Option<&'static str>) -> Self {
            Self {
                cleared: Mutex::new(Vec::new()),
                fail_kind,
            }
        }
    }

    #[async_trait]
    impl ActionDriver for RecordingDriver {
        fn validate(&self, _action: &Action) -> Result<(), ActionError> {
            Ok(())
        }

        async fn execute(
            &self,
            action: &Action,
            _deadline: Instant,
            _cancel: &CancellationToken,
            _correlation_id: &str,
        ) -> Result<(), ActionError> {
            match self.fail_kind {
                Some(kind) if kind == action.kind => Err(ActionError::fatal("remote refused")),
                _ => Ok(()),
            }
        }

        async fn clear(
            &self,
            correlation_id: &str,
            _deadline: Instant,
        ) -> Result<(), ActionError> {
            self.cleared
                .lock()
                .expect("cleared mutex should lock")
                .push(correlation_id.to_string());
            Ok(())
        }
    }

    fn controller(drivers: DriverRegistry) -> RollbackController {
        RollbackController::new(
            Arc::new(EngineConfig::default()),
            Arc::new(drivers),
            EventSink::default(),
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn declared_action_failure_does_not_stop_the_rest() {
        let mut drivers = DriverRegistry::new();
        drivers.register_service("exchange", Arc::new(RecordingDriver::new(Some("reset_books"))));
        let declared = vec![
            Action::new("exchange", "reset_books"),
            Action::new("exchange", "resume_matching"),
        ];

        let report = controller(drivers).run("exec-1", &declared, &[]).await;

        assert_eq!(report.actions.len(), 2);
        assert!(!report.actions[0].success);
        assert!(report.actions[1].success);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn clears_run_before_declared_actions_and_tolerate_missing_drivers() {
        let driver = Arc::new(RecordingDriver::new(None));
        let mut drivers = DriverRegistry::new();
        drivers.register_service("exchange", driver.clone());
        let targets = vec![
            ClearTarget {
                service: "exchange".to_string(),
                kind: "network_latency".to_string(),
                correlation_id: "chaos-exchange-network_latency-aaaa".to_string(),
            },
            ClearTarget {
                service: "ghost".to_string(),
                kind: "noop".to_string(),
                correlation_id: "chaos-ghost-noop-bbbb".to_string(),
            },
        ];

        let report = controller(drivers).run("exec-2", &[], &targets).await;

        assert_eq!(report.clears.len(), 2);
        assert!(report.clears[0].success);
        assert!(!report.clears[1].success);
        assert_eq!(
            driver
                .cleared
                .lock()
                .expect("cleared mutex should lock")
                .as_slice(),
            &["chaos-exchange-network_latency-aaaa".to_string()]
        );
    }

    #[test]
    fn successful_injections_skip_failed_actions() {
        let mut record = ExecutionRecord::new("exec-3", "fixture", "1");
        record.mark_running();
        record.append_phase(crate::PhaseResult {
            phase_name: "inject".to_string(),
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            success: false,
            error: None,
            actions: vec![
                crate::ActionResult {
                    service: "exchange".to_string(),
                    kind: "network_latency".to_string(),
                    correlation_id: "chaos-1".to_string(),
                    start_time: chrono::Utc::now(),
                    end_time: chrono::Utc::now(),
                    success: true,
                    error: None,
                },
                crate::ActionResult {
                    service: "risk".to_string(),
                    kind: "alert_flood".to_string(),
                    correlation_id: "chaos-2".to_string(),
                    start_time: chrono::Utc::now(),
                    end_time: chrono::Utc::now(),
                    success: false,
                    error: Some("bad_param".to_string()),
                },
            ],
            assertions: Vec::new(),
        });
        record.finalize(ExecutionStatus::Failed, None);

        let targets = successful_injections(&record);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].correlation_id, "chaos-1");
    }
}
