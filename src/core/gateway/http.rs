use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;
use urlencoding::encode;

use super::{Gateway, GatewayError, GatewayResult};
use crate::core::types::{
    Agent, AgentDraft, FileAttachment, FileUpload, HealthStatus, Message, NewMessage, Run, Thread,
    WorkflowExecution, WorkflowInputs,
};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";

/// reqwest-backed gateway. Stateless apart from the connection pool.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct ThreadBinding {
    thread_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkflowList {
    Wrapped { workflows: Vec<String> },
    Bare(Vec<String>),
}

impl HttpGateway {
    pub fn new(api_url: &str) -> GatewayResult<Self> {
        Self::with_client(Client::new(), api_url)
    }

    pub fn with_client(client: Client, api_url: &str) -> GatewayResult<Self> {
        Url::parse(api_url).map_err(|source| GatewayError::InvalidBaseUrl {
            url: api_url.to_string(),
            source,
        })?;
        Ok(Self {
            client,
            base: api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base, path);
        debug!("{} {}", method, url);
        self.client.request(method, url)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> GatewayResult<T> {
        let resp = builder.send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> GatewayResult<()> {
        let resp = builder.send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response) -> GatewayResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        detail: error_detail(&body, status.canonical_reason().unwrap_or("request failed")),
    })
}

/// Pulls the `detail` string out of a FastAPI-style error body.
fn error_detail(body: &str, fallback: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        match json.get("detail") {
            Some(serde_json::Value::String(s)) => return s.clone(),
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
        if let Some(msg) = json.get("error").and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn health(&self) -> GatewayResult<HealthStatus> {
        self.send_json(self.request(Method::GET, "/health")).await
    }

    async fn list_agents(&self) -> GatewayResult<Vec<Agent>> {
        self.send_json(self.request(Method::GET, "/agents")).await
    }

    async fn create_agent(&self, draft: &AgentDraft) -> GatewayResult<Agent> {
        self.send_json(self.request(Method::POST, "/agents").json(draft))
            .await
    }

    async fn delete_agent(&self, agent_id: &str) -> GatewayResult<()> {
        let path = format!("/agents/{}", encode(agent_id));
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn get_agent_thread(&self, agent_id: &str) -> GatewayResult<Option<String>> {
        let path = format!("/agents/{}/thread", encode(agent_id));
        let binding: ThreadBinding = self.send_json(self.request(Method::GET, &path)).await?;
        Ok(binding.thread_id.filter(|id| !id.is_empty()))
    }

    async fn bind_agent_thread(&self, agent_id: &str, thread_id: &str) -> GatewayResult<String> {
        let path = format!("/agents/{}/thread", encode(agent_id));
        let body = serde_json::json!({ "thread_id": thread_id });
        let binding: ThreadBinding = self
            .send_json(self.request(Method::POST, &path).json(&body))
            .await?;
        Ok(binding.thread_id.unwrap_or_else(|| thread_id.to_string()))
    }

    async fn create_thread(&self) -> GatewayResult<Thread> {
        self.send_json(
            self.request(Method::POST, "/threads")
                .json(&serde_json::json!({})),
        )
        .await
    }

    async fn get_thread(&self, thread_id: &str) -> GatewayResult<Thread> {
        let path = format!("/threads/{}", encode(thread_id));
        self.send_json(self.request(Method::GET, &path)).await
    }

    async fn list_messages(&self, thread_id: &str) -> GatewayResult<Vec<Message>> {
        let path = format!("/threads/{}/messages", encode(thread_id));
        self.send_json(self.request(Method::GET, &path)).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        message: &NewMessage,
    ) -> GatewayResult<Message> {
        let path = format!("/threads/{}/messages", encode(thread_id));
        self.send_json(self.request(Method::POST, &path).json(message))
            .await
    }

    async fn upload_file(
        &self,
        upload: FileUpload,
        purpose: &str,
    ) -> GatewayResult<FileAttachment> {
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(&upload.mime_type)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("purpose", purpose.to_string());
        let builder = self
            .request(Method::POST, "/files")
            .query(&[("purpose", purpose)])
            .multipart(form);
        self.send_json(builder).await
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> GatewayResult<Run> {
        let path = format!("/threads/{}/runs", encode(thread_id));
        let body = serde_json::json!({ "agent_id": agent_id });
        self.send_json(self.request(Method::POST, &path).json(&body))
            .await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        let path = format!("/threads/{}/runs/{}", encode(thread_id), encode(run_id));
        self.send_json(self.request(Method::GET, &path)).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> GatewayResult<Run> {
        let path = format!(
            "/threads/{}/runs/{}/cancel",
            encode(thread_id),
            encode(run_id)
        );
        self.send_json(self.request(Method::POST, &path)).await
    }

    async fn list_workflows(&self) -> GatewayResult<Vec<String>> {
        let list: WorkflowList = self.send_json(self.request(Method::GET, "/workflows")).await?;
        Ok(match list {
            WorkflowList::Wrapped { workflows } => workflows,
            WorkflowList::Bare(workflows) => workflows,
        })
    }

    async fn execute_workflow(
        &self,
        workflow_name: &str,
        inputs: &WorkflowInputs,
    ) -> GatewayResult<WorkflowExecution> {
        let path = format!("/workflows/{}/execute", encode(workflow_name));
        let body = serde_json::json!({ "inputs": inputs });
        self.send_json(self.request(Method::POST, &path).json(&body))
            .await
    }

    async fn get_execution(&self, execution_id: &str) -> GatewayResult<WorkflowExecution> {
        let path = format!("/workflows/executions/{}", encode(execution_id));
        self.send_json(self.request(Method::GET, &path)).await
    }

    async fn approve_execution(&self, execution_id: &str) -> GatewayResult<WorkflowExecution> {
        let path = format!("/workflows/executions/{}/approve", encode(execution_id));
        self.send_json(self.request(Method::POST, &path)).await
    }

    async fn delete_execution(&self, execution_id: &str) -> GatewayResult<()> {
        let path = format!("/workflows/executions/{}", encode(execution_id));
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn list_executions(&self) -> GatewayResult<Vec<WorkflowExecution>> {
        self.send_json(self.request(Method::GET, "/workflows/executions"))
            .await
    }
}
