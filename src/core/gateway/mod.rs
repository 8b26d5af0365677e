//! Typed access to the agent backend. The orchestrators only see the
//! [`Gateway`] trait; [`HttpGateway`] is the production implementation.

mod http;

pub use http::{DEFAULT_API_URL, HttpGateway};

use async_trait::async_trait;

use super::types::{
    Agent, AgentDraft, FileAttachment, FileUpload, HealthStatus, Message, NewMessage, Run, Thread,
    WorkflowExecution, WorkflowInputs,
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("backend unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("unexpected response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid API base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err)
        } else {
            GatewayError::Transport(err)
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn health(&self) -> GatewayResult<HealthStatus>;

    async fn list_agents(&self) -> GatewayResult<Vec<Agent>>;
    async fn create_agent(&self, draft: &AgentDraft) -> GatewayResult<Agent>;
    async fn delete_agent(&self, agent_id: &str) -> GatewayResult<()>;

    /// Thread previously bound to the agent, if any.
    async fn get_agent_thread(&self, agent_id: &str) -> GatewayResult<Option<String>>;
    async fn bind_agent_thread(&self, agent_id: &str, thread_id: &str) -> GatewayResult<String>;

    async fn create_thread(&self) -> GatewayResult<Thread>;
    async fn get_thread(&self, thread_id: &str) -> GatewayResult<Thread>;
    async fn list_messages(&self, thread_id: &str) -> GatewayResult<Vec<Message>>;
    async fn create_message(&self, thread_id: &str, message: &NewMessage)
    -> GatewayResult<Message>;

    async fn upload_file(&self, upload: FileUpload, purpose: &str)
    -> GatewayResult<FileAttachment>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> GatewayResult<Run>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run>;

    async fn list_workflows(&self) -> GatewayResult<Vec<String>>;
    async fn execute_workflow(
        &self,
        workflow_name: &str,
        inputs: &WorkflowInputs,
    ) -> GatewayResult<WorkflowExecution>;
    async fn get_execution(&self, execution_id: &str) -> GatewayResult<WorkflowExecution>;
    async fn approve_execution(&self, execution_id: &str) -> GatewayResult<WorkflowExecution>;
    async fn delete_execution(&self, execution_id: &str) -> GatewayResult<()>;
    async fn list_executions(&self) -> GatewayResult<Vec<WorkflowExecution>>;
}
