use crate::supervisor::lock_record;
use crate::{
    DriverRegistry, EngineConfig, EngineError, EngineHealth, EvaluatorRegistry, EventSink,
    ExecutionRecord, ExecutionSignals, ExecutionStatus, ExecutionSupervisor, SharedRecordStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use squall_scenario::{validate_or_raise, Scenario};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// One row of `list_active` / `list_all`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub scenario_name: String,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

struct RegistryEntry {
    scenario: Arc<Scenario>,
    record: Arc<Mutex<ExecutionRecord>>,
    // Immutable snapshot installed at finalize; terminal reads skip the
    // record mutex entirely.
    frozen: Option<Arc<ExecutionRecord>>,
    signals: Arc<ExecutionSignals>,
    finished_rx: watch::Receiver<bool>,
    finished_at: Option<DateTime<Utc>>,
    submitted_at: DateTime<Utc>,
}

struct RegistryInner {
    entries: BTreeMap<String, RegistryEntry>,
    active: usize,
    finished_total: usize,
    shutting_down: bool,
}

/// Process-wide map of executions: submission with a concurrency cap,
/// status snapshots, external stop, and cleanup after the retention window.
///
/// The single mutex here is the engine's only shared mutable state; all
/// writes to the map are serialized under it.
pub struct ExecutionRegistry {
    config: Arc<EngineConfig>,
    supervisor: Arc<ExecutionSupervisor>,
    inner: Arc<Mutex<RegistryInner>>,
}

impl ExecutionRegistry {
    pub fn new(config: EngineConfig, drivers: DriverRegistry, evaluators: EvaluatorRegistry) -> Self {
        Self::with_store_and_events(config, drivers, evaluators, None, EventSink::default())
    }

    pub fn with_store_and_events(
        config: EngineConfig,
        drivers: DriverRegistry,
        evaluators: EvaluatorRegistry,
        store: Option<SharedRecordStore>,
        events: EventSink,
    ) -> Self {
        let config = Arc::new(config);
        let supervisor = Arc::new(ExecutionSupervisor::new(
            config.clone(),
            Arc::new(drivers),
            Arc::new(evaluators),
            store,
            events,
        ));
        Self {
            config,
            supervisor,
            inner: Arc::new(Mutex::new(RegistryInner {
                entries: BTreeMap::new(),
                active: 0,
                finished_total: 0,
                shutting_down: false,
            })),
        }
    }

    /// Accepts a scenario and schedules it concurrently, returning the fresh
    /// execution id. Rejects deterministically once the active count reaches
    /// the configured cap.
    pub fn submit(&self, scenario: Scenario) -> Result<String, EngineError> {
        validate_or_raise(&scenario, &[])?;
        self.sweep_expired();
        let scenario = Arc::new(scenario);

        let (execution_id, record, signals, finished_tx) = {
            let mut inner = self.lock_inner();
            if inner.shutting_down {
                return Err(EngineError::Shutdown);
            }
            if inner.active >= self.config.max_concurrent_executions {
                return Err(EngineError::CapacityExceeded {
                    active: inner.active,
                    limit: self.config.max_concurrent_executions,
                });
            }
            let execution_id = fresh_execution_id(&inner.entries);
            let record = Arc::new(Mutex::new(ExecutionRecord::new(
                execution_id.clone(),
                scenario.name.clone(),
                scenario.version.clone(),
            )));
            let signals = Arc::new(ExecutionSignals::new());
            let (finished_tx, finished_rx) = watch::channel(false);
            inner.active += 1;
            inner.entries.insert(
                execution_id.clone(),
                RegistryEntry {
                    scenario: scenario.clone(),
                    record: record.clone(),
                    frozen: None,
                    signals: signals.clone(),
                    finished_rx,
                    finished_at: None,
                    submitted_at: Utc::now(),
                },
            );
            (execution_id, record, signals, finished_tx)
        };

        let supervisor = self.supervisor.clone();
        let inner = self.inner.clone();
        let task_id = execution_id.clone();
        let task_scenario = scenario.clone();
        let task_record = record.clone();
        tokio::spawn(async move {
            let _status = supervisor.run(task_scenario, task_record.clone(), signals).await;
            {
                let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(entry) = inner.entries.get_mut(&task_id) {
                    entry.frozen = Some(Arc::new(lock_record(&task_record).clone()));
                    entry.finished_at = Some(Utc::now());
                }
                inner.active = inner.active.saturating_sub(1);
                inner.finished_total += 1;
            }
            let _ = finished_tx.send(true);
        });

        Ok(execution_id)
    }

    /// Snapshot of the execution record as it stands right now.
    pub fn status(&self, execution_id: &str) -> Result<ExecutionRecord, EngineError> {
        let inner = self.lock_inner();
        let entry = inner
            .entries
            .get(execution_id)
            .ok_or_else(|| EngineError::UnknownExecution(execution_id.to_string()))?;
        match &entry.frozen {
            Some(frozen) => Ok((**frozen).clone()),
            None => Ok(lock_record(&entry.record).clone()),
        }
    }

    /// Requests an execution to stop. Terminal entries are absorbing.
    pub fn stop(&self, execution_id: &str) -> Result<(), EngineError> {
        let inner = self.lock_inner();
        let entry = inner
            .entries
            .get(execution_id)
            .ok_or_else(|| EngineError::UnknownExecution(execution_id.to_string()))?;
        if entry.frozen.is_some() || *entry.finished_rx.borrow() {
            return Err(EngineError::AlreadyFinished(execution_id.to_string()));
        }
        tracing::info!(execution_id, "stop requested");
        entry.signals.request_stop();
        Ok(())
    }

    pub fn list_active(&self) -> Vec<ExecutionSummary> {
        let inner = self.lock_inner();
        inner
            .entries
            .values()
            .filter(|entry| entry.frozen.is_none())
            .map(summarize)
            .collect()
    }

    pub fn list_all(&self, since: Option<DateTime<Utc>>) -> Vec<ExecutionSummary> {
        let inner = self.lock_inner();
        inner
            .entries
            .values()
            .filter(|entry| since.is_none_or(|cutoff| entry.submitted_at >= cutoff))
            .map(summarize)
            .collect()
    }

    pub fn scenario_of(&self, execution_id: &str) -> Result<Arc<Scenario>, EngineError> {
        let inner = self.lock_inner();
        inner
            .entries
            .get(execution_id)
            .map(|entry| entry.scenario.clone())
            .ok_or_else(|| EngineError::UnknownExecution(execution_id.to_string()))
    }

    pub fn engine_health(&self) -> EngineHealth {
        let inner = self.lock_inner();
        EngineHealth {
            active_executions: inner.active,
            capacity: self.config.max_concurrent_executions,
            total_finished: inner.finished_total,
        }
    }

    /// Drops terminal entries whose retention window has passed. Capacity is
    /// freed at finalize, not here; this only ends status visibility.
    pub fn sweep_expired(&self) {
        let retention = chrono::Duration::from_std(self.config.execution_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = Utc::now() - retention;
        let mut inner = self.lock_inner();
        inner
            .entries
            .retain(|_, entry| entry.finished_at.is_none_or(|finished| finished > cutoff));
    }

    /// Cancels every live execution and waits for finalize, bounded by twice
    /// the cancellation grace. Further submits are rejected.
    pub async fn shutdown(&self) {
        let receivers: Vec<watch::Receiver<bool>> = {
            let mut inner = self.lock_inner();
            inner.shutting_down = true;
            inner
                .entries
                .values()
                .filter(|entry| entry.frozen.is_none())
                .map(|entry| {
                    entry.signals.request_stop();
                    entry.finished_rx.clone()
                })
                .collect()
        };
        let deadline = Instant::now() + 2 * self.config.cancellation_grace;
        for mut rx in receivers {
            let budget = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(budget, rx.wait_for(|done| *done))
                .await
                .is_err()
            {
                tracing::warn!("execution did not finalize within shutdown grace");
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn summarize(entry: &RegistryEntry) -> ExecutionSummary {
    match &entry.frozen {
        Some(frozen) => ExecutionSummary {
            execution_id: frozen.execution_id.clone(),
            scenario_name: frozen.scenario_name.clone(),
            status: frozen.status,
            start_time: frozen.start_time,
            end_time: frozen.end_time,
        },
        None => {
            let record = lock_record(&entry.record);
            ExecutionSummary {
                execution_id: record.execution_id.clone(),
                scenario_name: record.scenario_name.clone(),
                status: record.status,
                start_time: record.start_time,
                end_time: record.end_time,
            }
        }
    }
}

fn fresh_execution_id(entries: &BTreeMap<String, RegistryEntry>) -> String {
    loop {
        let uuid = Uuid::new_v4().simple().to_string();
        let candidate = format!("exec-{}", &uuid[..8]);
        if !entries.contains_key(&candidate) {
            return candidate;
        }
    }
}
