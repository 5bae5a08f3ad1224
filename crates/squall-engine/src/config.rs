use std::collections::BTreeMap;
use std::time::Duration;

/// Runtime configuration for the execution engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub max_concurrent_executions: usize,
    pub default_scenario_timeout: Duration,
    pub assertion_poll_interval: Duration,
    pub assertion_poll_overrides: BTreeMap<String, Duration>,
    pub action_timeout_default: Duration,
    pub action_timeout_overrides: BTreeMap<String, Duration>,
    pub cancellation_grace: Duration,
    pub rollback: RollbackConfig,
    pub execution_retention: Duration,
    pub services: BTreeMap<String, ServiceEndpoint>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RollbackConfig {
    pub enabled: bool,
    pub timeout: Duration,
    pub aggressive_cleanup: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 3,
            default_scenario_timeout: Duration::from_secs(2 * 60 * 60),
            assertion_poll_interval: Duration::from_secs(5),
            assertion_poll_overrides: BTreeMap::new(),
            action_timeout_default: Duration::from_secs(30),
            action_timeout_overrides: BTreeMap::new(),
            cancellation_grace: Duration::from_secs(2),
            rollback: RollbackConfig::default(),
            execution_retention: Duration::from_secs(60 * 60),
            services: default_service_endpoints(),
        }
    }
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(10 * 60),
            aggressive_cleanup: false,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval_for(&self, assertion_kind: &str) -> Duration {
        self.assertion_poll_overrides
            .get(assertion_kind)
            .copied()
            .unwrap_or(self.assertion_poll_interval)
    }

    pub fn action_timeout_for(&self, service: &str) -> Duration {
        self.action_timeout_overrides
            .get(service)
            .copied()
            .unwrap_or(self.action_timeout_default)
    }
}

pub fn default_service_endpoints() -> BTreeMap<String, ServiceEndpoint> {
    squall_scenario::BUILTIN_SERVICES
        .iter()
        .map(|service| {
            (
                service.to_string(),
                ServiceEndpoint {
                    base_url: format!("http://{service}:8080"),
                    timeout: Duration::from_secs(30),
                },
            )
        })
        .collect()
}
