mod support;

use serde_json::json;
use squall_engine::ExecutionStatus;
use squall_scenario::{Action, Assertion, Phase, RollbackSpec, Scenario};
use std::collections::BTreeSet;
use std::time::Duration;
use support::{
    millis, registry_with, seconds, test_config, wait_terminal, DriverScript, ScriptedDriver,
    SurfaceSource,
};

fn healthy_source() -> squall_engine::SharedObservationSource {
    SurfaceSource::new([("health", vec![json!({"status": "healthy"})])])
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn single_phase_success_produces_completed_record() {
    let driver = ScriptedDriver::new([("noop", DriverScript::Succeed)]);
    let registry = registry_with(test_config(), driver.clone(), healthy_source());

    let scenario = Scenario::named("single-phase", seconds(1), seconds(10)).with_phase(
        Phase::named("steady", seconds(1))
            .with_action(Action::new("exchange", "noop"))
            .with_assertion(Assertion::new("system_health", "", millis(500))),
    );

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(record.termination_reason.is_none());
    assert_eq!(record.phases.len(), 1);
    let phase = &record.phases[0];
    assert!(phase.success);
    assert_eq!(phase.actions.len(), 1);
    assert!(phase.actions[0].success);
    assert!(phase.actions[0]
        .correlation_id
        .starts_with("chaos-exchange-noop-"));
    assert_eq!(phase.assertions.len(), 1);
    assert!(phase.assertions[0].passed);
    assert_eq!(driver.executed_kinds(), vec!["noop".to_string()]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn action_failure_aborts_phase_and_skips_the_rest() {
    let driver = ScriptedDriver::new([
        ("break_feed", DriverScript::FailFatal("bad_param")),
        ("noop", DriverScript::Succeed),
    ]);
    let registry = registry_with(test_config(), driver.clone(), healthy_source());

    let scenario = Scenario::named("abort-on-failure", seconds(5), seconds(30)).with_phase(
        Phase::named("inject", seconds(5))
            .with_action(Action::new("market-data", "break_feed"))
            .with_action(Action::new("market-data", "noop"))
            .with_assertion(Assertion::new("system_health", "", seconds(1))),
    );

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.phases.len(), 1);
    let phase = &record.phases[0];
    assert!(!phase.success);
    assert_eq!(phase.actions.len(), 1);
    assert!(!phase.actions[0].success);
    assert_eq!(phase.actions[0].error.as_deref(), Some("bad_param"));
    assert!(phase.assertions.is_empty());
    assert_eq!(driver.executed_kinds(), vec!["break_feed".to_string()]);
    assert!(record
        .termination_reason
        .as_deref()
        .expect("termination reason should be set")
        .contains("market-data/break_feed"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn assertion_that_never_observes_times_out_at_its_deadline() {
    let driver = ScriptedDriver::new([]);
    let source = SurfaceSource::new([("health", vec![json!({"status": "degraded"})])]);
    let registry = registry_with(test_config(), driver, source);

    let scenario = Scenario::named("assertion-timeout", seconds(3), seconds(30)).with_phase(
        Phase::named("observe", seconds(3)).with_assertion(Assertion::new(
            "system_health",
            "healthy",
            seconds(1),
        )),
    );

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    let assertion = &record.phases[0].assertions[0];
    assert!(!assertion.passed);
    assert_eq!(assertion.message, "timeout");
    assert!(
        (900..=1_200).contains(&assertion.elapsed_ms),
        "elapsed was {}ms",
        assertion.elapsed_ms
    );
    assert!(record
        .termination_reason
        .as_deref()
        .expect("termination reason should be set")
        .contains("system_health"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn external_stop_midway_leaves_partial_record_without_rollback() {
    let driver = ScriptedDriver::new([("reset", DriverScript::Succeed)]);
    let source = SurfaceSource::new([
        ("health", vec![json!({"status": "healthy"})]),
        ("alerts", vec![]),
    ]);
    let registry = registry_with(test_config(), driver.clone(), source);

    let mut scenario = Scenario::named("stop-midway", seconds(15), seconds(30))
        .with_phase(
            Phase::named("warmup", seconds(5)).with_assertion(Assertion::new(
                "system_health",
                "",
                millis(500),
            )),
        )
        .with_phase(
            Phase::named("inject", seconds(5)).with_assertion(Assertion::new(
                "risk_alert",
                "var_breach",
                seconds(5),
            )),
        )
        .with_phase(
            Phase::named("recover", seconds(5)).with_assertion(Assertion::new(
                "system_health",
                "",
                millis(500),
            )),
        );
    scenario.rollback = RollbackSpec {
        on_failure: true,
        actions: vec![Action::new("exchange", "reset")],
    };

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    tokio::time::sleep(Duration::from_secs(2)).await;
    registry.stop(&execution_id).expect("stop should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Stopped);
    assert_eq!(record.phases.len(), 2);
    assert!(record.phases[0].success);
    assert!(!record.phases[1].success);
    assert_eq!(record.phases[1].assertions[0].message, "canceled");
    // Plain stop with aggressive cleanup off: rollback must not have run.
    assert!(record.rollback.is_none());
    assert!(driver.executed_kinds().is_empty());
    assert_eq!(
        record.termination_reason.as_deref(),
        Some("stopped by external request")
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn phase_failure_triggers_rollback_with_clears_and_declared_actions() {
    let driver = ScriptedDriver::new([
        ("latency", DriverScript::Succeed),
        ("break_engine", DriverScript::FailFatal("remote refused")),
        ("restore", DriverScript::Succeed),
        ("reset_limits", DriverScript::FailFatal("rollback boom")),
    ]);
    let registry = registry_with(test_config(), driver.clone(), healthy_source());

    let mut scenario = Scenario::named("rollback-on-failure", seconds(10), seconds(60))
        .with_phase(
            Phase::named("inject", seconds(5))
                .with_action(Action::new("exchange", "latency"))
                .with_assertion(Assertion::new("system_health", "", millis(500))),
        )
        .with_phase(
            Phase::named("escalate", seconds(5))
                .with_action(Action::new("trading", "break_engine")),
        );
    scenario.rollback = RollbackSpec {
        on_failure: true,
        actions: vec![
            Action::new("exchange", "restore"),
            Action::new("risk", "reset_limits"),
        ],
    };

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(record
        .termination_reason
        .as_deref()
        .expect("termination reason should be set")
        .contains("trading/break_engine"));

    let rollback = record.rollback.as_ref().expect("rollback should have run");
    assert_eq!(rollback.actions.len(), 2);
    assert!(rollback.actions[0].success);
    assert!(!rollback.actions[1].success);
    assert_eq!(
        rollback.actions[1].error.as_deref(),
        Some("rollback boom")
    );

    // The phase-1 injection that succeeded was cleared by correlation id.
    let injected = &record.phases[0].actions[0];
    assert!(injected.success);
    assert_eq!(rollback.clears.len(), 1);
    assert_eq!(rollback.clears[0].correlation_id, injected.correlation_id);
    assert_eq!(driver.cleared_ids(), vec![injected.correlation_id.clone()]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn zero_width_assertion_window_judges_the_first_poll_only() {
    let driver = ScriptedDriver::new([]);
    let registry = registry_with(test_config(), driver, healthy_source());

    let scenario = Scenario::named("first-poll-only", seconds(2), seconds(10)).with_phase(
        Phase::named("snap", seconds(1))
            .with_assertion(Assertion::new("system_health", "", millis(0))),
    );

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(record.phases[0].assertions[0].passed);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn record_invariants_hold_for_a_mixed_execution() {
    let driver = ScriptedDriver::new([("noop", DriverScript::Succeed)]);
    let registry = registry_with(test_config(), driver, healthy_source());

    let scenario = Scenario::named("invariants", seconds(4), seconds(30))
        .with_phase(
            Phase::named("one", seconds(2))
                .with_action(Action::new("exchange", "noop"))
                .with_parallel_action(Action::new("risk", "noop"), millis(100))
                .with_assertion(Assertion::new("system_health", "", seconds(1))),
        )
        .with_phase(
            Phase::named("two", seconds(2))
                .with_action(Action::new("audit", "noop"))
                .with_assertion(Assertion::new("system_health", "", millis(500))),
        );

    let execution_id = registry.submit(scenario).expect("submit should succeed");
    let record = wait_terminal(&registry, &execution_id).await;

    assert_eq!(record.status, ExecutionStatus::Completed);
    let end_time = record.end_time.expect("end time should be set");
    assert!(record.start_time <= end_time);

    let mut correlation_ids = BTreeSet::new();
    for phase in &record.phases {
        assert!(record.start_time <= phase.start_time);
        assert!(phase.end_time <= end_time);
        assert!(phase.success);
        for action in &phase.actions {
            assert!(
                correlation_ids.insert(action.correlation_id.clone()),
                "correlation id '{}' is not unique",
                action.correlation_id
            );
        }
        for assertion in &phase.assertions {
            assert!(assertion.passed);
            assert!(assertion.timestamp <= end_time);
        }
    }
    assert_eq!(correlation_ids.len(), 3);

    // The snapshot is sealed: a later read returns the identical record.
    let again = registry
        .status(&execution_id)
        .expect("record should remain readable");
    assert_eq!(again, record);
}
