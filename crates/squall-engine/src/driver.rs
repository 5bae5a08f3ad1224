use crate::ActionError;
use async_trait::async_trait;
use squall_scenario::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Adapter that turns an abstract chaos action into a remote call on one
/// target service.
#[async_trait]
pub trait ActionDriver: Send + Sync {
    /// Pure parameter check; re-run by the engine immediately before
    /// `execute`.
    fn validate(&self, action: &Action) -> Result<(), ActionError>;

    /// Performs the remote call. Must return promptly when `cancel` fires
    /// and must not outlive `deadline`. Retries under the same
    /// `correlation_id` must be idempotent on the remote side.
    async fn execute(
        &self,
        action: &Action,
        deadline: Instant,
        cancel: &CancellationToken,
        correlation_id: &str,
    ) -> Result<(), ActionError>;

    /// Reverses the effect of a prior `execute`. Tolerates nothing-to-clear.
    async fn clear(&self, correlation_id: &str, deadline: Instant) -> Result<(), ActionError>;
}

pub type SharedActionDriver = Arc<dyn ActionDriver>;

/// Driver lookup keyed by `(service, action kind)` with a service-wide
/// fallback, resolved from the action's own fields.
#[derive(Default)]
pub struct DriverRegistry {
    by_action: BTreeMap<(String, String), SharedActionDriver>,
    by_service: BTreeMap<String, SharedActionDriver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service(
        &mut self,
        service: impl Into<String>,
        driver: SharedActionDriver,
    ) -> Option<SharedActionDriver> {
        self.by_service.insert(service.into(), driver)
    }

    pub fn register_action(
        &mut self,
        service: impl Into<String>,
        kind: impl Into<String>,
        driver: SharedActionDriver,
    ) -> Option<SharedActionDriver> {
        self.by_action.insert((service.into(), kind.into()), driver)
    }

    pub fn resolve(&self, action: &Action) -> Option<SharedActionDriver> {
        self.by_action
            .get(&(action.service.clone(), action.kind.clone()))
            .or_else(|| self.by_service.get(&action.service))
            .cloned()
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.by_service.keys().map(String::as_str)
    }
}
