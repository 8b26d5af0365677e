//! User-visible notices raised by the orchestrators.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadAgents,
    LoadMessages,
    CreateAgent,
    DeleteAgent,
    CreateThread,
    Upload,
    SendMessage,
    RunStatus,
    RunFailed,
    CancelRun,
    LoadWorkflows,
    StartWorkflow,
    WorkflowStatus,
    WorkflowFailed,
    ApproveWorkflow,
    LoadHistory,
    DeleteExecution,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::LoadAgents => "load agents",
            Operation::LoadMessages => "load messages",
            Operation::CreateAgent => "create agent",
            Operation::DeleteAgent => "delete agent",
            Operation::CreateThread => "create thread",
            Operation::Upload => "upload",
            Operation::SendMessage => "send message",
            Operation::RunStatus => "run status",
            Operation::RunFailed => "run",
            Operation::CancelRun => "cancel run",
            Operation::LoadWorkflows => "load workflows",
            Operation::StartWorkflow => "start workflow",
            Operation::WorkflowStatus => "workflow status",
            Operation::WorkflowFailed => "workflow",
            Operation::ApproveWorkflow => "approve workflow",
            Operation::LoadHistory => "load history",
            Operation::DeleteExecution => "delete execution",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub operation: Operation,
    pub message: String,
}

impl Notice {
    pub fn new(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Presentation hook for blocking failure notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

