//! Scripted in-memory backend and recording notifier for orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::content::MessageContent;
use super::gateway::{Gateway, GatewayError, GatewayResult};
use super::notify::{Notice, Notifier, Operation};
use super::types::{
    Agent, AgentDraft, AttachmentRef, ExecutionStatus, FileAttachment, FileUpload, HealthStatus,
    Message, NewMessage, Role, Run, RunStatus, Thread, WorkflowExecution,
    WorkflowInputs, WorkflowResult, WorkflowStep,
};

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    clock: i64,
    next_id: u64,
    agents: Vec<Agent>,
    bindings: HashMap<String, String>,
    threads: HashMap<String, Thread>,
    messages: HashMap<String, Vec<Message>>,
    runs: HashMap<String, Run>,
    run_script: VecDeque<RunStatus>,
    run_error: Option<serde_json::Value>,
    assistant_reply: Option<String>,
    executions: Vec<WorkflowExecution>,
    execution_script: VecDeque<ExecutionStatus>,
    execution_error: Option<String>,
    failures: HashMap<&'static str, (u16, String)>,
    delays: HashMap<&'static str, Duration>,
}

impl FakeState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&self, id: &str, name: &str) -> Agent {
        let mut st = self.state.lock();
        let created_at = st.tick();
        let agent = Agent {
            id: id.to_string(),
            name: name.to_string(),
            model: "gpt-4o-mini".to_string(),
            instructions: format!("You are {}.", name),
            tools: Vec::new(),
            created_at,
        };
        st.agents.push(agent.clone());
        agent
    }

    /// Binds `agent_id` to a new thread holding one prior message.
    pub fn seed_bound_thread(&self, agent_id: &str, thread_id: &str, text: &str) {
        let mut st = self.state.lock();
        let created_at = st.tick();
        st.threads.insert(
            thread_id.to_string(),
            Thread {
                id: thread_id.to_string(),
                metadata: Default::default(),
                created_at,
            },
        );
        let id = st.id("msg");
        st.messages.entry(thread_id.to_string()).or_default().push(Message {
            id,
            thread_id: thread_id.to_string(),
            role: Role::User,
            content: MessageContent::Plain(text.to_string()),
            attachments: None,
            created_at,
        });
        st.bindings.insert(agent_id.to_string(), thread_id.to_string());
    }

    /// Statuses handed out by successive `get_run` calls. The last one repeats.
    pub fn script_run(&self, statuses: &[RunStatus]) {
        self.state.lock().run_script = statuses.iter().copied().collect();
    }

    pub fn set_run_error(&self, message: &str) {
        self.state.lock().run_error =
            Some(serde_json::json!({"code": "server_error", "message": message}));
    }

    pub fn set_assistant_reply(&self, text: &str) {
        self.state.lock().assistant_reply = Some(text.to_string());
    }

    /// Statuses handed out by successive `get_execution` calls. The last one repeats.
    pub fn script_execution(&self, statuses: &[ExecutionStatus]) {
        self.state.lock().execution_script = statuses.iter().copied().collect();
    }

    pub fn set_execution_error(&self, message: &str) {
        self.state.lock().execution_error = Some(message.to_string());
    }

    pub fn seed_execution(&self, id: &str, status: ExecutionStatus, created_at: i64) {
        self.state.lock().executions.push(WorkflowExecution {
            execution_id: id.to_string(),
            workflow_name: "hr-onboarding".to_string(),
            status,
            result: None,
            inputs: None,
            created_at,
        });
    }

    pub fn fail(&self, op: &'static str, status: u16, detail: &str) {
        self.state
            .lock()
            .failures
            .insert(op, (status, detail.to_string()));
    }

    pub fn heal(&self, op: &'static str) {
        self.state.lock().failures.remove(op);
    }

    pub fn delay(&self, op: &'static str, by: Duration) {
        self.state.lock().delays.insert(op, by);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    pub fn messages_in(&self, thread_id: &str) -> Vec<Message> {
        self.state
            .lock()
            .messages
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn binding(&self, agent_id: &str) -> Option<String> {
        self.state.lock().bindings.get(agent_id).cloned()
    }

    /// Records the call, waits out any configured delay, then applies
    /// failure injection.
    async fn enter(&self, op: &'static str) -> GatewayResult<()> {
        let delay = {
            let mut st = self.state.lock();
            st.calls.push(op.to_string());
            st.delays.get(op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state.lock().failures.get(op) {
            Some((status, detail)) => Err(GatewayError::Status {
                status: *status,
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> GatewayError {
    GatewayError::Status {
        status: 404,
        detail: format!("{} not found", what),
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn health(&self) -> GatewayResult<HealthStatus> {
        self.enter("health").await?;
        Ok(HealthStatus {
            status: "healthy".to_string(),
            service: Some("fake".to_string()),
        })
    }

    async fn list_agents(&self) -> GatewayResult<Vec<Agent>> {
        self.enter("list_agents").await?;
        Ok(self.state.lock().agents.clone())
    }

    async fn create_agent(&self, draft: &AgentDraft) -> GatewayResult<Agent> {
        self.enter("create_agent").await?;
        let mut st = self.state.lock();
        let id = st.id("asst");
        let created_at = st.tick();
        let agent = Agent {
            id,
            name: draft.name.clone(),
            model: draft.model.clone(),
            instructions: draft.instructions.clone(),
            tools: draft.tools.clone(),
            created_at,
        };
        st.agents.push(agent.clone());
        Ok(agent)
    }

    async fn delete_agent(&self, agent_id: &str) -> GatewayResult<()> {
        self.enter("delete_agent").await?;
        let mut st = self.state.lock();
        let before = st.agents.len();
        st.agents.retain(|a| a.id != agent_id);
        if st.agents.len() == before {
            return Err(not_found("Agent"));
        }
        st.bindings.remove(agent_id);
        Ok(())
    }

    async fn get_agent_thread(&self, agent_id: &str) -> GatewayResult<Option<String>> {
        self.enter("get_agent_thread").await?;
        Ok(self.state.lock().bindings.get(agent_id).cloned())
    }

    async fn bind_agent_thread(&self, agent_id: &str, thread_id: &str) -> GatewayResult<String> {
        self.enter("bind_agent_thread").await?;
        self.state
            .lock()
            .bindings
            .insert(agent_id.to_string(), thread_id.to_string());
        Ok(thread_id.to_string())
    }

    async fn create_thread(&self) -> GatewayResult<Thread> {
        self.enter("create_thread").await?;
        let mut st = self.state.lock();
        let id = st.id("thread");
        let created_at = st.tick();
        let thread = Thread {
            id: id.clone(),
            metadata: Default::default(),
            created_at,
        };
        st.threads.insert(id, thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &str) -> GatewayResult<Thread> {
        self.enter("get_thread").await?;
        self.state
            .lock()
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| not_found("Thread"))
    }

    async fn list_messages(&self, thread_id: &str) -> GatewayResult<Vec<Message>> {
        self.enter("list_messages").await?;
        Ok(self.messages_in(thread_id))
    }

    async fn create_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> GatewayResult<Message> {
        self.enter("create_message").await?;
        let mut st = self.state.lock();
        let id = st.id("msg");
        let created_at = st.tick();
        let created = Message {
            id,
            thread_id: thread_id.to_string(),
            role: message.role,
            content: MessageContent::Plain(message.content.clone()),
            attachments: if message.attachments.is_empty() {
                None
            } else {
                Some(message.attachments.clone())
            },
            created_at,
        };
        st.messages
            .entry(thread_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn upload_file(
        &self,
        upload: FileUpload,
        purpose: &str,
    ) -> GatewayResult<FileAttachment> {
        self.enter("upload_file").await?;
        let mut st = self.state.lock();
        let id = st.id("file");
        let created_at = st.tick();
        Ok(FileAttachment {
            id,
            filename: upload.filename,
            purpose: purpose.to_string(),
            mime_type: upload.mime_type,
            created_at,
        })
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> GatewayResult<Run> {
        self.enter("create_run").await?;
        let mut st = self.state.lock();
        let id = st.id("run");
        let created_at = st.tick();
        let run = Run {
            id: id.clone(),
            thread_id: thread_id.to_string(),
            agent_id: Some(agent_id.to_string()),
            status: RunStatus::Queued,
            created_at,
            last_error: None,
        };
        st.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        self.enter("get_run").await?;
        let mut st = self.state.lock();
        let next = if st.run_script.len() > 1 {
            st.run_script.pop_front()
        } else {
            st.run_script.front().copied()
        };
        let status = next.unwrap_or(RunStatus::Completed);
        let error = st.run_error.clone();
        let reply = st.assistant_reply.clone();
        let mut run = st.runs.get(run_id).cloned().ok_or_else(|| not_found("Run"))?;
        let finished_now = !run.status.is_terminal() && status.is_terminal();
        run.status = status;
        if status.is_unsuccessful() {
            run.last_error = error;
        }
        if finished_now && status == RunStatus::Completed {
            if let Some(text) = reply {
                let id = st.id("msg");
                let created_at = st.tick();
                st.messages
                    .entry(run.thread_id.clone())
                    .or_default()
                    .push(Message {
                        id,
                        thread_id: run.thread_id.clone(),
                        role: Role::Assistant,
                        content: MessageContent::Plain(text),
                        attachments: None,
                        created_at,
                    });
            }
        }
        st.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        self.enter("cancel_run").await?;
        let mut st = self.state.lock();
        st.run_script = VecDeque::from([RunStatus::Cancelled]);
        let run = st.runs.get_mut(run_id).ok_or_else(|| not_found("Run"))?;
        run.status = RunStatus::Cancelling;
        Ok(run.clone())
    }

    async fn list_workflows(&self) -> GatewayResult<Vec<String>> {
        self.enter("list_workflows").await?;
        Ok(vec!["hr-onboarding".to_string(), "trip-planner".to_string()])
    }

    async fn execute_workflow(
        &self,
        workflow_name: &str,
        inputs: &WorkflowInputs,
    ) -> GatewayResult<WorkflowExecution> {
        self.enter("execute_workflow").await?;
        let mut st = self.state.lock();
        let execution_id = st.id("exec");
        let created_at = st.tick();
        let inputs = inputs
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let execution = WorkflowExecution {
            execution_id,
            workflow_name: workflow_name.to_string(),
            status: ExecutionStatus::Queued,
            result: None,
            inputs: Some(inputs),
            created_at,
        };
        st.executions.push(execution.clone());
        Ok(execution)
    }

    async fn get_execution(&self, execution_id: &str) -> GatewayResult<WorkflowExecution> {
        self.enter("get_execution").await?;
        let mut st = self.state.lock();
        let next = if st.execution_script.len() > 1 {
            st.execution_script.pop_front()
        } else {
            st.execution_script.front().copied()
        };
        let error = st.execution_error.clone();
        let execution = st
            .executions
            .iter_mut()
            .find(|e| e.execution_id == execution_id)
            .ok_or_else(|| not_found("Execution"))?;
        if let Some(status) = next {
            execution.status = status;
        }
        let result = execution.result.get_or_insert_with(WorkflowResult::default);
        match execution.status {
            ExecutionStatus::WaitingForApproval => {
                result.plan = Some("1. **Create** account\n2. Order laptop".to_string());
            }
            ExecutionStatus::Completed if result.steps.is_empty() => {
                result.steps.push(WorkflowStep {
                    agent: "it-agent".to_string(),
                    action: "provision".to_string(),
                    details: "**Account** created for hr__lookup".to_string(),
                    timestamp: None,
                });
            }
            ExecutionStatus::Failed => result.error = error,
            _ => {}
        }
        Ok(execution.clone())
    }

    async fn approve_execution(&self, execution_id: &str) -> GatewayResult<WorkflowExecution> {
        self.enter("approve_execution").await?;
        let mut st = self.state.lock();
        let execution = st
            .executions
            .iter_mut()
            .find(|e| e.execution_id == execution_id)
            .ok_or_else(|| not_found("Execution"))?;
        if execution.status != ExecutionStatus::WaitingForApproval {
            return Err(GatewayError::Status {
                status: 400,
                detail: "Execution is not waiting for approval".to_string(),
            });
        }
        execution.status = ExecutionStatus::Running;
        Ok(execution.clone())
    }

    async fn delete_execution(&self, execution_id: &str) -> GatewayResult<()> {
        self.enter("delete_execution").await?;
        let mut st = self.state.lock();
        let before = st.executions.len();
        st.executions.retain(|e| e.execution_id != execution_id);
        if st.executions.len() == before {
            return Err(not_found("Execution"));
        }
        Ok(())
    }

    async fn list_executions(&self) -> GatewayResult<Vec<WorkflowExecution>> {
        self.enter("list_executions").await?;
        Ok(self.state.lock().executions.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn messages_for(&self, operation: Operation) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.operation == operation)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

pub fn attachment_ids(refs: &[AttachmentRef]) -> Vec<String> {
    refs.iter().map(|r| r.id.clone()).collect()
}
