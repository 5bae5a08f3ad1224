use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    TimedOut,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Stopped | Self::TimedOut
        )
    }
}

/// Outcome of one driver call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub service: String,
    pub kind: String,
    pub correlation_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

/// Verdict of one assertion evaluation, with the evidence that justifies it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub kind: String,
    pub passed: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub evidence: BTreeMap<String, Value>,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub actions: Vec<ActionResult>,
    pub assertions: Vec<AssertionResult>,
}

/// Outcome of reversing one prior injection during rollback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClearOutcome {
    pub service: String,
    pub correlation_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Best-effort rollback report: one entry per declared rollback action, plus
/// the clears issued for previously recorded injections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub actions: Vec<ActionResult>,
    pub clears: Vec<ClearOutcome>,
}

/// Append-only record of one scenario execution.
///
/// Owned exclusively by the supervisor until finalize; everyone else reads
/// snapshot clones. Once the status is terminal the record never changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub scenario_name: String,
    pub scenario_version: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub phases: Vec<PhaseResult>,
    pub rollback: Option<RollbackReport>,
    pub termination_reason: Option<String>,
}

impl ExecutionRecord {
    pub fn new(
        execution_id: impl Into<String>,
        scenario_name: impl Into<String>,
        scenario_version: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            scenario_name: scenario_name.into(),
            scenario_version: scenario_version.into(),
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Pending,
            phases: Vec::new(),
            rollback: None,
            termination_reason: None,
        }
    }

    pub fn mark_running(&mut self) {
        if !self.status.is_terminal() {
            self.status = ExecutionStatus::Running;
            self.start_time = Utc::now();
        }
    }

    pub fn append_phase(&mut self, phase: PhaseResult) {
        if !self.status.is_terminal() {
            self.phases.push(phase);
        }
    }

    pub fn set_rollback(&mut self, report: RollbackReport) {
        if !self.status.is_terminal() {
            self.rollback = Some(report);
        }
    }

    /// Seals the record. Idempotent: a second finalize is ignored.
    pub fn finalize(&mut self, status: ExecutionStatus, termination_reason: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.termination_reason = termination_reason;
        self.end_time = Some(Utc::now());
    }

    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Fresh opaque token attached to every remote chaos call, enabling
/// idempotent retry and targeted clear.
pub fn correlation_id(service: &str, kind: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("chaos-{service}-{kind}-{}", &uuid[..8])
}
