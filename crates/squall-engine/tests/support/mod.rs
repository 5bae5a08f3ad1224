#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use squall_engine::{
    ActionDriver, ActionError, DriverRegistry, EngineConfig, ExecutionRecord, ExecutionRegistry,
    Observation, ObservationQuery, ObservationSource, ProbeError, SharedObservationSource,
};
use squall_scenario::{Action, DurationValue};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How the scripted driver reacts to one action kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverScript {
    Succeed,
    FailFatal(&'static str),
}

/// Test driver with per-kind behavior; records every execute and clear.
pub struct ScriptedDriver {
    scripts: BTreeMap<&'static str, DriverScript>,
    pub executed: Mutex<Vec<String>>,
    pub cleared: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new(scripts: impl IntoIterator<Item = (&'static str, DriverScript)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts.into_iter().collect(),
            executed: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
        })
    }

    pub fn executed_kinds(&self) -> Vec<String> {
        self.executed
            .lock()
            .expect("executed mutex should lock")
            .clone()
    }

    pub fn cleared_ids(&self) -> Vec<String> {
        self.cleared
            .lock()
            .expect("cleared mutex should lock")
            .clone()
    }
}

#[async_trait]
impl ActionDriver for ScriptedDriver {
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
        self.executed
            .lock()
            .expect("executed mutex should lock")
            .push(action.kind.clone());
        match self.scripts.get(action.kind.as_str()).copied() {
            None | Some(DriverScript::Succeed) => Ok(()),
            Some(DriverScript::FailFatal(reason)) => Err(ActionError::fatal(reason)),
        }
    }

    async fn clear(&self, correlation_id: &str, _deadline: Instant) -> Result<(), ActionError> {
        self.cleared
            .lock()
            .expect("cleared mutex should lock")
            .push(correlation_id.to_string());
        Ok(())
    }
}

/// Observation source scripted per surface; unknown surfaces report nothing.
pub struct SurfaceSource {
    surfaces: BTreeMap<&'static str, Vec<serde_json::Value>>,
}

impl SurfaceSource {
    pub fn new(
        surfaces: impl IntoIterator<Item = (&'static str, Vec<serde_json::Value>)>,
    ) -> SharedObservationSource {
        Arc::new(Self {
            surfaces: surfaces.into_iter().collect(),
        })
    }
}

#[async_trait]
impl ObservationSource for SurfaceSource {
    async fn sample(&self, query: &ObservationQuery) -> Result<Vec<Observation>, ProbeError> {
        Ok(self
            .surfaces
            .get(query.surface.as_str())
            .map(|observations| {
                observations
                    .iter()
                    .map(|data| Observation {
                        observed_at: Utc::now(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Engine config tuned for paused-clock tests: tight poll cadence, short
/// grace, everything else at defaults.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.assertion_poll_interval = Duration::from_millis(100);
    config.cancellation_grace = Duration::from_millis(500);
    config
}

pub fn registry_with(
    config: EngineConfig,
    driver: Arc<ScriptedDriver>,
    source: SharedObservationSource,
) -> ExecutionRegistry {
    let mut drivers = DriverRegistry::new();
    for service in squall_scenario::BUILTIN_SERVICES {
        drivers.register_service(*service, driver.clone());
    }
    let evaluators = squall_engine::evaluators::builtin_registry(source);
    ExecutionRegistry::new(config, drivers, evaluators)
}

pub fn seconds(n: u64) -> DurationValue {
    DurationValue::from_millis(n * 1_000)
}

pub fn millis(n: u64) -> DurationValue {
    DurationValue::from_millis(n)
}

/// Polls the registry until the execution reaches a terminal status.
pub async fn wait_terminal(registry: &ExecutionRegistry, execution_id: &str) -> ExecutionRecord {
    loop {
        let record = registry
            .status(execution_id)
            .expect("execution should be known");
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
