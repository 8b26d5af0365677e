//! Workflow execution tracking: submit, poll, pause for approval, resume.
//!
//! One execution occupies the "current" slot at a time and only that slot is
//! polled, under a single fixed poll key.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gateway::{Gateway, GatewayError};
use super::notify::{Notice, Notifier, Operation};
use super::poller::{DEFAULT_POLL_INTERVAL, PollOutcome, PollingController};
use super::store::ExecutionStore;
use super::types::{ExecutionStatus, WorkflowExecution, WorkflowInputs};

pub const CURRENT_EXECUTION_KEY: &str = "workflow:current";

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("workflow name is empty")]
    EmptyWorkflowName,
    #[error("workflow '{workflow}' is missing required inputs: {}", fields.join(", "))]
    MissingInputs {
        workflow: String,
        fields: Vec<String>,
    },
    #[error("a workflow submission is already in progress")]
    Busy,
    #[error("execution {0} is not waiting for approval")]
    NotAwaitingApproval(String),
    #[error("superseded by a newer request")]
    Superseded,
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Idle,
    Submitting,
    Running,
    WaitingForApproval,
    Completed,
    Failed,
}

impl WorkflowPhase {
    pub fn of(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Completed => WorkflowPhase::Completed,
            ExecutionStatus::Failed => WorkflowPhase::Failed,
            ExecutionStatus::WaitingForApproval => WorkflowPhase::WaitingForApproval,
            _ => WorkflowPhase::Running,
        }
    }
}

/// Lifecycle of the tracked execution. Navigating history swaps the tracked
/// execution and is not a transition.
pub fn can_transition(from: WorkflowPhase, to: WorkflowPhase) -> bool {
    use WorkflowPhase::*;
    match from {
        Idle => matches!(to, Submitting),
        Submitting => matches!(to, Idle | Running | WaitingForApproval | Completed | Failed),
        Running => matches!(
            to,
            Running | WaitingForApproval | Completed | Failed | Submitting
        ),
        WaitingForApproval => matches!(to, Submitting | Running | Completed | Failed),
        Completed | Failed => matches!(to, Submitting),
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub poll_interval: Duration,
    /// Fields that must be non-blank before a workflow is submitted.
    pub required_inputs: BTreeMap<String, Vec<String>>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        let mut required_inputs = BTreeMap::new();
        required_inputs.insert(
            "hr-onboarding".to_string(),
            vec!["name".to_string(), "role".to_string()],
        );
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            required_inputs,
        }
    }
}

#[derive(Debug)]
pub enum WorkflowSettlement {
    Completed(WorkflowExecution),
    Failed(WorkflowExecution),
    AwaitingApproval(WorkflowExecution),
    PollFailed(GatewayError),
    Abandoned,
}

pub struct ExecutionTicket {
    pub execution: WorkflowExecution,
    settlement: JoinHandle<WorkflowSettlement>,
}

impl ExecutionTicket {
    pub async fn settled(self) -> WorkflowSettlement {
        self.settlement.await.unwrap_or(WorkflowSettlement::Abandoned)
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSnapshot {
    pub phase: WorkflowPhase,
    pub workflows: Vec<String>,
    pub current: Option<WorkflowExecution>,
    /// Newest first.
    pub history: Vec<WorkflowExecution>,
    pub is_polling: bool,
    pub is_submitting: bool,
}

#[derive(Default)]
struct State {
    workflows: Vec<String>,
    executions: ExecutionStore,
    is_polling: bool,
    is_submitting: bool,
    epoch: u64,
}

impl State {
    fn phase(&self) -> WorkflowPhase {
        if self.is_submitting {
            return WorkflowPhase::Submitting;
        }
        match self.executions.current() {
            Some(exec) => WorkflowPhase::of(exec.status),
            None => WorkflowPhase::Idle,
        }
    }
}

fn failure_message(exec: &WorkflowExecution) -> String {
    let base = format!("Workflow {} failed", exec.workflow_name);
    match exec.failure_detail() {
        Some(detail) => format!("{}\nReason: {}", base, detail),
        None => base,
    }
}

#[derive(Clone)]
pub struct WorkflowOrchestrator {
    gateway: Arc<dyn Gateway>,
    poller: PollingController,
    notifier: Arc<dyn Notifier>,
    settings: Arc<WorkflowSettings>,
    state: Arc<Mutex<State>>,
}

impl WorkflowOrchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        poller: PollingController,
        notifier: Arc<dyn Notifier>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            gateway,
            poller,
            notifier,
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let st = self.state.lock();
        WorkflowSnapshot {
            phase: st.phase(),
            workflows: st.workflows.clone(),
            current: st.executions.current().cloned(),
            history: st.executions.history_by_recency(),
            is_polling: st.is_polling,
            is_submitting: st.is_submitting,
        }
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.state.lock().phase()
    }

    pub fn find_in_history(&self, execution_id: &str) -> Option<WorkflowExecution> {
        self.state.lock().executions.find(execution_id).cloned()
    }

    fn notify(&self, operation: Operation, message: impl Into<String>) {
        self.notifier.notify(Notice::new(operation, message));
    }

    /// Required fields of `workflow` that are absent or blank in `inputs`.
    pub fn missing_inputs(&self, workflow: &str, inputs: &WorkflowInputs) -> Vec<String> {
        self.settings
            .required_inputs
            .get(workflow)
            .map(|fields| {
                fields
                    .iter()
                    .filter(|f| inputs.get(*f).is_none_or(|v| v.trim().is_empty()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn required_inputs(&self, workflow: &str) -> Vec<String> {
        self.settings
            .required_inputs
            .get(workflow)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn list_workflows(&self) -> WorkflowResult<Vec<String>> {
        match self.gateway.list_workflows().await {
            Ok(workflows) => {
                self.state.lock().workflows = workflows.clone();
                Ok(workflows)
            }
            Err(err) => {
                self.notify(Operation::LoadWorkflows, err.to_string());
                Err(err.into())
            }
        }
    }

    pub async fn refresh_history(&self) -> WorkflowResult<Vec<WorkflowExecution>> {
        match self.gateway.list_executions().await {
            Ok(history) => {
                let mut st = self.state.lock();
                st.executions.replace_history(history);
                Ok(st.executions.history_by_recency())
            }
            Err(err) => {
                self.notify(Operation::LoadHistory, err.to_string());
                Err(err.into())
            }
        }
    }

    /// Validates inputs, submits the workflow and tracks the new execution in
    /// the current slot.
    pub async fn start(
        &self,
        workflow: &str,
        inputs: WorkflowInputs,
    ) -> WorkflowResult<ExecutionTicket> {
        if workflow.trim().is_empty() {
            return Err(WorkflowError::EmptyWorkflowName);
        }
        let missing = self.missing_inputs(workflow, &inputs);
        if !missing.is_empty() {
            return Err(WorkflowError::MissingInputs {
                workflow: workflow.to_string(),
                fields: missing,
            });
        }

        let epoch = self.begin_submission()?;
        info!("Submitting workflow {}", workflow);
        let submitted = self.gateway.execute_workflow(workflow, &inputs).await;
        self.finish_submission(epoch, submitted, Operation::StartWorkflow)
    }

    /// Resumes a paused execution. Rejected without a request unless the
    /// current slot holds `execution_id` waiting for approval.
    pub async fn approve(&self, execution_id: &str) -> WorkflowResult<ExecutionTicket> {
        {
            let st = self.state.lock();
            let waiting = st
                .executions
                .current()
                .is_some_and(|c| c.execution_id == execution_id && c.status.is_waiting());
            if !waiting {
                return Err(WorkflowError::NotAwaitingApproval(execution_id.to_string()));
            }
        }

        let epoch = self.begin_submission()?;
        info!("Approving execution {}", execution_id);
        let approved = self.gateway.approve_execution(execution_id).await;
        self.finish_submission(epoch, approved, Operation::ApproveWorkflow)
    }

    fn begin_submission(&self) -> WorkflowResult<u64> {
        let mut st = self.state.lock();
        if !can_transition(st.phase(), WorkflowPhase::Submitting) {
            return Err(WorkflowError::Busy);
        }
        st.epoch += 1;
        st.is_submitting = true;
        st.is_polling = false;
        self.poller.cancel(CURRENT_EXECUTION_KEY);
        Ok(st.epoch)
    }

    fn finish_submission(
        &self,
        epoch: u64,
        submitted: Result<WorkflowExecution, GatewayError>,
        operation: Operation,
    ) -> WorkflowResult<ExecutionTicket> {
        let execution = {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return Err(WorkflowError::Superseded);
            }
            st.is_submitting = false;
            match submitted {
                Ok(execution) => {
                    st.executions.set_current(Some(execution.clone()));
                    execution
                }
                Err(err) => {
                    let resume = st
                        .executions
                        .current()
                        .filter(|c| c.status.is_active())
                        .cloned();
                    drop(st);
                    warn!("{} failed: {}", operation, err);
                    self.notify(operation, err.to_string());
                    // The submission stopped the slot's poll; an execution
                    // still in flight goes back to being tracked.
                    if let Some(current) = resume {
                        info!("Resuming execution {}", current.execution_id);
                        drop(self.track(epoch, current));
                    }
                    return Err(err.into());
                }
            }
        };
        info!(
            "Tracking execution {} ({})",
            execution.execution_id,
            execution.status.as_str()
        );
        let settlement = self.track(epoch, execution.clone());
        Ok(ExecutionTicket {
            execution,
            settlement,
        })
    }

    /// Shows a history entry in the current slot. Only active executions are
    /// polled; the slot's previous poll is replaced.
    pub fn select_from_history(&self, execution: WorkflowExecution) -> Option<ExecutionTicket> {
        let epoch = {
            let mut st = self.state.lock();
            st.epoch += 1;
            st.is_polling = false;
            st.is_submitting = false;
            st.executions.set_current(Some(execution.clone()));
            st.epoch
        };
        self.poller.cancel(CURRENT_EXECUTION_KEY);
        if !execution.status.is_active() {
            return None;
        }
        let settlement = self.track(epoch, execution.clone());
        Some(ExecutionTicket {
            execution,
            settlement,
        })
    }

    pub async fn delete(&self, execution_id: &str) -> WorkflowResult<()> {
        if let Err(err) = self.gateway.delete_execution(execution_id).await {
            self.notify(Operation::DeleteExecution, err.to_string());
            return Err(err.into());
        }
        let was_current = {
            let mut st = self.state.lock();
            st.executions.remove_from_history(execution_id);
            let was_current = st.executions.is_current(execution_id);
            if was_current {
                st.epoch += 1;
                st.executions.set_current(None);
                st.is_polling = false;
            }
            was_current
        };
        if was_current {
            self.poller.cancel(CURRENT_EXECUTION_KEY);
        }
        info!("Deleted execution {}", execution_id);
        Ok(())
    }

    fn track(&self, epoch: u64, execution: WorkflowExecution) -> JoinHandle<WorkflowSettlement> {
        let this = self.clone();
        if !execution.status.is_active() {
            return tokio::spawn(async move {
                this.settle(epoch, PollOutcome::Finished(execution)).await
            });
        }

        let gateway = Arc::clone(&self.gateway);
        let execution_id = execution.execution_id.clone();
        let fetch = move || {
            let gateway = Arc::clone(&gateway);
            let execution_id = execution_id.clone();
            async move { gateway.get_execution(&execution_id).await }
        };

        let state = Arc::clone(&self.state);
        let on_update = move |exec: &WorkflowExecution| {
            debug!("Execution {} is {}", exec.execution_id, exec.status.as_str());
            let mut st = state.lock();
            if st.epoch != epoch {
                return;
            }
            let from = st.phase();
            let to = WorkflowPhase::of(exec.status);
            if !can_transition(from, to) {
                warn!("Execution {} moved {:?} -> {:?}", exec.execution_id, from, to);
            }
            if !st.executions.update_current(exec) {
                debug!("Execution {} left the current slot", exec.execution_id);
            }
        };

        let handle = {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return tokio::spawn(async { WorkflowSettlement::Abandoned });
            }
            st.is_polling = true;
            self.poller.start_polling(
                CURRENT_EXECUTION_KEY,
                self.settings.poll_interval,
                fetch,
                |exec: &WorkflowExecution| !exec.status.is_active(),
                on_update,
            )
        };

        tokio::spawn(async move { this.settle(epoch, handle.outcome().await).await })
    }

    async fn settle(
        &self,
        epoch: u64,
        outcome: PollOutcome<WorkflowExecution>,
    ) -> WorkflowSettlement {
        match outcome {
            PollOutcome::Finished(exec) if exec.status.is_waiting() => {
                if !self.stop_polling(epoch) {
                    return WorkflowSettlement::Abandoned;
                }
                info!("Execution {} is waiting for approval", exec.execution_id);
                WorkflowSettlement::AwaitingApproval(exec)
            }
            PollOutcome::Finished(exec) => {
                if !self.stop_polling(epoch) {
                    return WorkflowSettlement::Abandoned;
                }
                match self.gateway.list_executions().await {
                    Ok(history) => {
                        let mut st = self.state.lock();
                        if st.epoch == epoch {
                            st.executions.replace_history(history);
                        }
                    }
                    Err(err) => {
                        warn!("History refresh after {} failed: {}", exec.execution_id, err)
                    }
                }
                if exec.status == ExecutionStatus::Failed {
                    warn!("Execution {} failed", exec.execution_id);
                    self.notify(Operation::WorkflowFailed, failure_message(&exec));
                    WorkflowSettlement::Failed(exec)
                } else {
                    info!("Execution {} completed", exec.execution_id);
                    WorkflowSettlement::Completed(exec)
                }
            }
            PollOutcome::Failed(err) => {
                if !self.stop_polling(epoch) {
                    return WorkflowSettlement::Abandoned;
                }
                warn!("Polling execution failed: {}", err);
                self.notify(Operation::WorkflowStatus, err.to_string());
                WorkflowSettlement::PollFailed(err)
            }
            PollOutcome::Cancelled => {
                self.stop_polling(epoch);
                WorkflowSettlement::Abandoned
            }
        }
    }

    /// Clears the polling flag if `epoch` is still current.
    fn stop_polling(&self, epoch: u64) -> bool {
        let mut st = self.state.lock();
        if st.epoch != epoch {
            return false;
        }
        st.is_polling = false;
        true
    }
}
