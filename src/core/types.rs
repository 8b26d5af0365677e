use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::content::{MessageContent, strip_emphasis};

/// Unix seconds, as issued by the backend.
pub type Timestamp = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub model: String,
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub created_at: Timestamp,
}

/// Payload for creating an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentDraft {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<String>,
}

impl AgentDraft {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Name and instructions are required; a model always has a default upstream.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.instructions.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// `{id, type}` pair a message uses to point at an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentRef>>,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl Message {
    pub fn text(&self) -> String {
        self.content.render()
    }

    pub fn attachment_ids(&self) -> Vec<&str> {
        self.attachments
            .iter()
            .flatten()
            .map(|a| a.id.as_str())
            .collect()
    }
}

/// Body of `create message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl FileAttachment {
    pub fn reference(&self) -> AttachmentRef {
        AttachmentRef {
            id: self.id.clone(),
            kind: self.mime_type.clone(),
        }
    }
}

/// A local file queued for upload. Consumed by the upload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();
        Self {
            filename,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        Ok(Self::new(filename, bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired
        )
    }

    pub fn is_unsuccessful(self) -> bool {
        self.is_terminal() && self != RunStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub created_at: Timestamp,
    /// Backend-shaped error descriptor, usually `{code, message}`.
    #[serde(default)]
    pub last_error: Option<serde_json::Value>,
}

impl Run {
    pub fn error_message(&self) -> Option<String> {
        match self.last_error.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    InProgress,
    WaitingForApproval,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::InProgress => "in_progress",
            ExecutionStatus::WaitingForApproval => "waiting_for_approval",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    pub fn is_waiting(self) -> bool {
        self == ExecutionStatus::WaitingForApproval
    }

    /// In flight: worth polling.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && !self.is_waiting()
    }
}

/// Step timestamps arrive either as unix seconds or preformatted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepTime {
    Unix(Timestamp),
    Text(String),
}

impl fmt::Display for StepTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTime::Unix(secs) => match chrono::DateTime::from_timestamp(*secs, 0) {
                Some(dt) => write!(f, "{}", dt.format("%H:%M:%S")),
                None => write!(f, "{}", secs),
            },
            StepTime::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(default, alias = "agent_name")]
    pub agent: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub timestamp: Option<StepTime>,
}

impl WorkflowStep {
    pub fn display_details(&self) -> String {
        strip_emphasis(&self.details)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub workflow_name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub result: Option<WorkflowResult>,
    #[serde(default)]
    pub inputs: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub created_at: Timestamp,
}

impl WorkflowExecution {
    pub fn steps(&self) -> &[WorkflowStep] {
        self.result.as_ref().map(|r| r.steps.as_slice()).unwrap_or(&[])
    }

    pub fn plan(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.plan.as_deref())
    }

    /// Backend-supplied reason for a failure, if any.
    pub fn failure_detail(&self) -> Option<&str> {
        let result = self.result.as_ref()?;
        result
            .error
            .as_deref()
            .or(result.message.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Form inputs for a workflow, keyed by field name.
pub type WorkflowInputs = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}
