use crate::ExecutionStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress notification emitted while an execution runs.
///
/// This is the handle the presentation layer uses to stream updates; the
/// engine itself never blocks on delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        execution_id: String,
        scenario: String,
    },
    PhaseStarted {
        execution_id: String,
        phase: String,
    },
    ActionCompleted {
        execution_id: String,
        phase: String,
        service: String,
        action_kind: String,
        correlation_id: String,
        success: bool,
    },
    AssertionCompleted {
        execution_id: String,
        phase: String,
        assertion_kind: String,
        passed: bool,
    },
    PhaseCompleted {
        execution_id: String,
        phase: String,
        success: bool,
    },
    RollbackStarted {
        execution_id: String,
    },
    RollbackCompleted {
        execution_id: String,
        failed_actions: usize,
    },
    ExecutionFinalized {
        execution_id: String,
        status: ExecutionStatus,
    },
}

pub trait ExecutionEventObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

impl<F> ExecutionEventObserver for F
where
    F: Fn(&ExecutionEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExecutionEvent) {
        self(event);
    }
}

pub type SharedExecutionEventObserver = Arc<dyn ExecutionEventObserver>;
pub type ExecutionEventSender = mpsc::UnboundedSender<ExecutionEvent>;
pub type ExecutionEventReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

#[derive(Clone, Default)]
pub struct EventSink {
    observer: Option<SharedExecutionEventObserver>,
    sender: Option<ExecutionEventSender>,
}

impl EventSink {
    pub fn with_observer(observer: SharedExecutionEventObserver) -> Self {
        Self {
            observer: Some(observer),
            sender: None,
        }
    }

    pub fn with_sender(sender: ExecutionEventSender) -> Self {
        Self {
            observer: None,
            sender: Some(sender),
        }
    }

    pub fn observer(mut self, observer: SharedExecutionEventObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn sender(mut self, sender: ExecutionEventSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.is_some() || self.sender.is_some()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if let Some(observer) = self.observer.as_ref() {
            observer.on_event(&event);
        }
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(event);
        }
    }
}

pub fn execution_event_channel() -> (ExecutionEventSender, ExecutionEventReceiver) {
    mpsc::unbounded_channel()
}
