use serde::{Deserialize, Serialize};

/// Engine-side health snapshot, serialized by the external health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineHealth {
    pub active_executions: usize,
    pub capacity: usize,
    pub total_finished: usize,
}

impl EngineHealth {
    pub fn has_capacity(&self) -> bool {
        self.active_executions < self.capacity
    }
}
