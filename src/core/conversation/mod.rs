//! Agent selection, attachments, and the send → run → poll → refresh cycle.
//!
//! All mutable state lives behind one short-held lock. Every flow records
//! the epoch it started in; selecting another agent or opening a new chat
//! bumps the epoch, so results arriving for an abandoned flow are dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gateway::{Gateway, GatewayError};
use super::notify::{Notice, Notifier, Operation};
use super::poller::{DEFAULT_POLL_INTERVAL, PollOutcome, PollingController};
use super::store::{AgentStore, AttachmentSet, MessageStore};
use super::types::{
    Agent, AgentDraft, FileAttachment, FileUpload, Message, NewMessage, Run, Thread,
};

const RUN_FAILED_MESSAGE: &str = "Agent run failed or cancelled";
const THREAD_FAILED_MESSAGE: &str = "Failed to create thread. Check backend connection.";
const UPLOAD_FAILED_MESSAGE: &str = "File upload failed";
const RUN_STATUS_FAILED_MESSAGE: &str = "Failed to check run status";

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("superseded by a newer selection")]
    Superseded,
    #[error("no agent selected")]
    NoAgentSelected,
}

pub type ConversationResult<T> = Result<T, ConversationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    Idle,
    AgentSelecting,
    ThreadReady,
    Sending,
    AwaitingRun,
}

#[derive(Debug, Clone)]
pub struct ConversationSettings {
    pub poll_interval: Duration,
    pub upload_purpose: String,
    pub default_model: String,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            upload_purpose: "agents".to_string(),
            default_model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NothingToSend,
    NoAgent,
    NoThread,
    RunInFlight,
}

/// How a run ended, as handled by the orchestrator.
#[derive(Debug)]
pub enum RunSettlement {
    Completed(Run),
    Unsuccessful(Run),
    PollFailed(GatewayError),
    /// The flow was superseded or its poll stopped before a terminal status.
    Abandoned,
}

pub struct RunTicket {
    pub message: Message,
    pub run: Run,
    settlement: JoinHandle<RunSettlement>,
}

impl RunTicket {
    pub async fn settled(self) -> RunSettlement {
        self.settlement.await.unwrap_or(RunSettlement::Abandoned)
    }
}

pub enum SendOutcome {
    Skipped(SkipReason),
    Started(RunTicket),
}

#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub phase: ConversationPhase,
    pub agents: Vec<Agent>,
    pub selected_agent: Option<Agent>,
    pub thread: Option<Thread>,
    pub messages: Vec<Message>,
    pub attachments: Vec<FileAttachment>,
    pub draft: String,
    pub is_loading: bool,
    pub is_sending: bool,
    pub uploads_in_flight: usize,
    pub active_run: Option<Run>,
}

#[derive(Default)]
struct State {
    agents: AgentStore,
    selected_agent: Option<Agent>,
    thread: Option<Thread>,
    messages: MessageStore,
    attachments: AttachmentSet,
    draft: String,
    is_loading: bool,
    is_sending: bool,
    uploads_in_flight: usize,
    active_run: Option<Run>,
    epoch: u64,
}

impl State {
    fn phase(&self) -> ConversationPhase {
        if self.is_loading {
            ConversationPhase::AgentSelecting
        } else if self.active_run.is_some() {
            ConversationPhase::AwaitingRun
        } else if self.is_sending {
            ConversationPhase::Sending
        } else if self.thread.is_some() {
            ConversationPhase::ThreadReady
        } else {
            ConversationPhase::Idle
        }
    }

    /// Starts a new epoch and drops everything tied to the current thread.
    /// Returns the thread whose poll must be cancelled.
    fn abandon_thread(&mut self) -> Option<String> {
        self.epoch += 1;
        let old = self.thread.take().map(|t| t.id);
        self.messages.reset(None);
        self.attachments.clear();
        self.active_run = None;
        self.is_sending = false;
        old
    }
}

fn run_key(thread_id: &str) -> String {
    format!("run:{}", thread_id)
}

fn run_failure_message(run: &Run) -> String {
    match run.error_message() {
        Some(reason) => format!("{}\nReason: {}", RUN_FAILED_MESSAGE, reason),
        None => RUN_FAILED_MESSAGE.to_string(),
    }
}

#[derive(Clone)]
pub struct ConversationOrchestrator {
    gateway: Arc<dyn Gateway>,
    poller: PollingController,
    notifier: Arc<dyn Notifier>,
    settings: Arc<ConversationSettings>,
    state: Arc<Mutex<State>>,
}

impl ConversationOrchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        poller: PollingController,
        notifier: Arc<dyn Notifier>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            gateway,
            poller,
            notifier,
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let st = self.state.lock();
        ConversationSnapshot {
            phase: st.phase(),
            agents: st.agents.all().to_vec(),
            selected_agent: st.selected_agent.clone(),
            thread: st.thread.clone(),
            messages: st.messages.chronological().to_vec(),
            attachments: st.attachments.files().to_vec(),
            draft: st.draft.clone(),
            is_loading: st.is_loading,
            is_sending: st.is_sending,
            uploads_in_flight: st.uploads_in_flight,
            active_run: st.active_run.clone(),
        }
    }

    pub fn phase(&self) -> ConversationPhase {
        self.state.lock().phase()
    }

    pub fn find_agent(&self, id_or_name: &str) -> Option<Agent> {
        self.state.lock().agents.find(id_or_name).cloned()
    }

    fn notify(&self, operation: Operation, message: impl Into<String>) {
        self.notifier.notify(Notice::new(operation, message));
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.state.lock().epoch == epoch
    }

    pub async fn load_agents(&self) -> ConversationResult<Vec<Agent>> {
        match self.gateway.list_agents().await {
            Ok(agents) => {
                info!("Loaded {} agents", agents.len());
                self.state.lock().agents.replace_all(agents.clone());
                Ok(agents)
            }
            Err(err) => {
                self.notify(Operation::LoadAgents, err.to_string());
                Err(err.into())
            }
        }
    }

    /// Creates the agent and selects it. Returns `None` without a request
    /// when the name or instructions are blank.
    pub async fn create_agent(&self, mut draft: AgentDraft) -> ConversationResult<Option<Agent>> {
        if !draft.is_complete() {
            return Ok(None);
        }
        if draft.model.trim().is_empty() {
            draft.model = self.settings.default_model.clone();
        }
        let agent = match self.gateway.create_agent(&draft).await {
            Ok(agent) => agent,
            Err(err) => {
                self.notify(Operation::CreateAgent, format!("Failed to create agent: {}", err));
                return Err(err.into());
            }
        };
        info!("Created agent {} ({})", agent.name, agent.id);
        self.state.lock().agents.upsert(agent.clone());
        if let Err(err) = self.select_agent(agent.clone()).await {
            warn!("Created agent {} but could not open a thread: {}", agent.id, err);
        }
        Ok(Some(agent))
    }

    pub async fn delete_agent(&self, agent_id: &str) -> ConversationResult<()> {
        if let Err(err) = self.gateway.delete_agent(agent_id).await {
            self.notify(Operation::DeleteAgent, err.to_string());
            return Err(err.into());
        }
        let stale_thread = {
            let mut st = self.state.lock();
            st.agents.remove(agent_id);
            if st.selected_agent.as_ref().is_some_and(|a| a.id == agent_id) {
                st.selected_agent = None;
                st.is_loading = false;
                st.abandon_thread()
            } else {
                None
            }
        };
        if let Some(thread_id) = stale_thread {
            self.poller.cancel(&run_key(&thread_id));
        }
        info!("Deleted agent {}", agent_id);
        Ok(())
    }

    /// Makes `agent` current and resolves its thread: the bound thread is
    /// resumed with its history, otherwise a fresh thread is created and bound.
    pub async fn select_agent(&self, agent: Agent) -> ConversationResult<Thread> {
        let (epoch, stale_thread) = {
            let mut st = self.state.lock();
            let stale = st.abandon_thread();
            st.selected_agent = Some(agent.clone());
            st.is_loading = true;
            (st.epoch, stale)
        };
        if let Some(thread_id) = stale_thread {
            self.poller.cancel(&run_key(&thread_id));
        }
        info!("Selecting agent {} ({})", agent.name, agent.id);

        if let Some((thread, history)) = self.resume_bound_thread(&agent.id, epoch).await? {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return Err(ConversationError::Superseded);
            }
            st.messages.reset(Some(thread.id.clone()));
            st.messages.replace_all(history);
            st.thread = Some(thread.clone());
            st.is_loading = false;
            return Ok(thread);
        }

        self.open_fresh_thread(&agent.id, epoch).await
    }

    /// Returns the agent's bound thread and its messages, or `None` when the
    /// caller should fall back to a fresh thread.
    async fn resume_bound_thread(
        &self,
        agent_id: &str,
        epoch: u64,
    ) -> ConversationResult<Option<(Thread, Vec<Message>)>> {
        let bound = match self.gateway.get_agent_thread(agent_id).await {
            Ok(bound) => bound,
            Err(err) => {
                warn!("Thread lookup for agent {} failed, starting fresh: {}", agent_id, err);
                None
            }
        };
        if !self.is_current(epoch) {
            return Err(ConversationError::Superseded);
        }
        let Some(thread_id) = bound else {
            return Ok(None);
        };

        let thread = match self.gateway.get_thread(&thread_id).await {
            Ok(thread) => thread,
            Err(err) => {
                warn!("Bound thread {} is unavailable, starting fresh: {}", thread_id, err);
                return Ok(None);
            }
        };
        let history = match self.gateway.list_messages(&thread.id).await {
            Ok(history) => history,
            Err(err) => {
                warn!("Could not load history for thread {}: {}", thread.id, err);
                self.notify(Operation::LoadMessages, err.to_string());
                Vec::new()
            }
        };
        if !self.is_current(epoch) {
            return Err(ConversationError::Superseded);
        }
        info!("Resumed thread {} ({} messages)", thread.id, history.len());
        Ok(Some((thread, history)))
    }

    async fn open_fresh_thread(&self, agent_id: &str, epoch: u64) -> ConversationResult<Thread> {
        let created = self.gateway.create_thread().await;
        let thread = {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return Err(ConversationError::Superseded);
            }
            match created {
                Ok(thread) => thread,
                Err(err) => {
                    st.is_loading = false;
                    drop(st);
                    warn!("Thread creation failed: {}", err);
                    self.notify(Operation::CreateThread, THREAD_FAILED_MESSAGE);
                    return Err(err.into());
                }
            }
        };

        if let Err(err) = self.gateway.bind_agent_thread(agent_id, &thread.id).await {
            warn!("Could not bind agent {} to thread {}: {}", agent_id, thread.id, err);
        }

        let mut st = self.state.lock();
        if st.epoch != epoch {
            return Err(ConversationError::Superseded);
        }
        st.messages.reset(Some(thread.id.clone()));
        st.thread = Some(thread.clone());
        st.is_loading = false;
        info!("Opened thread {} for agent {}", thread.id, agent_id);
        Ok(thread)
    }

    /// Abandons the current thread of the selected agent and opens a new one.
    pub async fn new_chat(&self) -> ConversationResult<Thread> {
        let (agent_id, epoch, stale_thread) = {
            let mut st = self.state.lock();
            let Some(agent_id) = st.selected_agent.as_ref().map(|a| a.id.clone()) else {
                return Err(ConversationError::NoAgentSelected);
            };
            let stale = st.abandon_thread();
            st.is_loading = true;
            (agent_id, st.epoch, stale)
        };
        if let Some(thread_id) = stale_thread {
            self.poller.cancel(&run_key(&thread_id));
        }
        self.open_fresh_thread(&agent_id, epoch).await
    }

    /// Uploads one file and adds it to the pending attachments. Uploads run
    /// independently; a file finishing after an agent switch is discarded.
    pub async fn upload_attachment(
        &self,
        upload: FileUpload,
    ) -> ConversationResult<FileAttachment> {
        let epoch = {
            let mut st = self.state.lock();
            st.uploads_in_flight += 1;
            st.epoch
        };
        let filename = upload.filename.clone();
        let uploaded = self
            .gateway
            .upload_file(upload, &self.settings.upload_purpose)
            .await;

        let mut st = self.state.lock();
        st.uploads_in_flight = st.uploads_in_flight.saturating_sub(1);
        match uploaded {
            Ok(file) => {
                if st.epoch != epoch {
                    debug!("Discarding upload {} from an abandoned thread", file.id);
                    return Err(ConversationError::Superseded);
                }
                info!("Uploaded {} as {}", filename, file.id);
                st.attachments.push(file.clone());
                Ok(file)
            }
            Err(err) => {
                drop(st);
                warn!("Upload of {} failed: {}", filename, err);
                self.notify(Operation::Upload, UPLOAD_FAILED_MESSAGE);
                Err(err.into())
            }
        }
    }

    pub fn remove_attachment(&self, file_id: &str) -> Option<FileAttachment> {
        self.state.lock().attachments.remove(file_id)
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state.lock().draft = text.into();
    }

    /// Sends the current draft.
    pub async fn send_draft(&self) -> ConversationResult<SendOutcome> {
        let text = self.state.lock().draft.clone();
        self.send_message(&text).await
    }

    /// Posts a user message with the pending attachments and starts a run.
    ///
    /// Draft and attachments are cleared up front and restored if the message
    /// cannot be created.
    pub async fn send_message(&self, text: &str) -> ConversationResult<SendOutcome> {
        let (epoch, thread_id, agent_id, taken) = {
            let mut st = self.state.lock();
            if text.trim().is_empty() && st.attachments.is_empty() {
                return Ok(SendOutcome::Skipped(SkipReason::NothingToSend));
            }
            let Some(agent_id) = st.selected_agent.as_ref().map(|a| a.id.clone()) else {
                return Ok(SendOutcome::Skipped(SkipReason::NoAgent));
            };
            let Some(thread_id) = st.thread.as_ref().map(|t| t.id.clone()) else {
                return Ok(SendOutcome::Skipped(SkipReason::NoThread));
            };
            if st.is_sending || st.active_run.is_some() {
                return Ok(SendOutcome::Skipped(SkipReason::RunInFlight));
            }
            st.is_sending = true;
            st.draft.clear();
            (st.epoch, thread_id, agent_id, st.attachments.take())
        };

        let refs = taken.iter().map(FileAttachment::reference).collect();
        let request = NewMessage::user(text, refs);
        let message = match self.gateway.create_message(&thread_id, &request).await {
            Ok(message) => message,
            Err(err) => {
                {
                    let mut st = self.state.lock();
                    if st.epoch == epoch {
                        if st.draft.is_empty() {
                            st.draft = text.to_string();
                        }
                        st.attachments.restore(taken);
                        st.is_sending = false;
                    }
                }
                warn!("Message creation on thread {} failed: {}", thread_id, err);
                self.notify(Operation::SendMessage, err.to_string());
                return Err(err.into());
            }
        };

        {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return Err(ConversationError::Superseded);
            }
            st.messages.append(message.clone());
        }

        let run = match self.gateway.create_run(&thread_id, &agent_id).await {
            Ok(run) => run,
            Err(err) => {
                {
                    let mut st = self.state.lock();
                    if st.epoch == epoch {
                        st.is_sending = false;
                    }
                }
                warn!("Run creation on thread {} failed: {}", thread_id, err);
                self.notify(Operation::SendMessage, err.to_string());
                return Err(err.into());
            }
        };

        {
            let mut st = self.state.lock();
            if st.epoch != epoch {
                return Err(ConversationError::Superseded);
            }
            st.active_run = Some(run.clone());
        }
        info!("Started run {} on thread {}", run.id, thread_id);

        let settlement = self.track_run(epoch, thread_id, run.id.clone());
        Ok(SendOutcome::Started(RunTicket {
            message,
            run,
            settlement,
        }))
    }

    fn track_run(
        &self,
        epoch: u64,
        thread_id: String,
        run_id: String,
    ) -> JoinHandle<RunSettlement> {
        let gateway = Arc::clone(&self.gateway);
        let fetch_thread = thread_id.clone();
        let fetch_run = run_id.clone();
        let fetch = move || {
            let gateway = Arc::clone(&gateway);
            let thread_id = fetch_thread.clone();
            let run_id = fetch_run.clone();
            async move { gateway.get_run(&thread_id, &run_id).await }
        };

        let state = Arc::clone(&self.state);
        let on_update = move |run: &Run| {
            debug!("Run {} is {}", run.id, run.status.as_str());
            let mut st = state.lock();
            if st.epoch != epoch {
                return;
            }
            if let Some(active) = st.active_run.as_mut().filter(|a| a.id == run.id) {
                *active = run.clone();
            }
        };

        let handle = self.poller.start_polling(
            run_key(&thread_id),
            self.settings.poll_interval,
            fetch,
            |run: &Run| run.status.is_terminal(),
            on_update,
        );

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = handle.outcome().await;
            this.settle_run(epoch, &thread_id, &run_id, outcome).await
        })
    }

    async fn settle_run(
        &self,
        epoch: u64,
        thread_id: &str,
        run_id: &str,
        outcome: PollOutcome<Run>,
    ) -> RunSettlement {
        match outcome {
            PollOutcome::Finished(run) if !run.status.is_unsuccessful() => {
                let refreshed = self.gateway.list_messages(thread_id).await;
                let mut st = self.state.lock();
                if st.epoch != epoch {
                    return RunSettlement::Abandoned;
                }
                st.active_run = None;
                st.is_sending = false;
                match refreshed {
                    Ok(messages) => {
                        st.messages.replace_all(messages);
                        drop(st);
                        info!("Run {} completed", run.id);
                    }
                    Err(err) => {
                        drop(st);
                        warn!(
                            "Run {} completed but messages could not be reloaded: {}",
                            run.id, err
                        );
                        self.notify(Operation::LoadMessages, err.to_string());
                    }
                }
                RunSettlement::Completed(run)
            }
            PollOutcome::Finished(run) => {
                if !self.clear_run(epoch) {
                    return RunSettlement::Abandoned;
                }
                warn!("Run {} ended as {}", run.id, run.status.as_str());
                self.notify(Operation::RunFailed, run_failure_message(&run));
                RunSettlement::Unsuccessful(run)
            }
            PollOutcome::Failed(err) => {
                if !self.clear_run(epoch) {
                    return RunSettlement::Abandoned;
                }
                warn!("Polling run {} failed: {}", run_id, err);
                self.notify(
                    Operation::RunStatus,
                    format!("{}: {}", RUN_STATUS_FAILED_MESSAGE, err),
                );
                RunSettlement::PollFailed(err)
            }
            PollOutcome::Cancelled => {
                self.clear_run(epoch);
                debug!("Stopped tracking run {}", run_id);
                RunSettlement::Abandoned
            }
        }
    }

    /// Clears in-flight run flags if `epoch` is still current.
    fn clear_run(&self, epoch: u64) -> bool {
        let mut st = self.state.lock();
        if st.epoch != epoch {
            return false;
        }
        st.active_run = None;
        st.is_sending = false;
        true
    }

    /// Asks the backend to cancel the in-flight run. The poll then observes
    /// the cancelled status. Returns `false` when nothing is in flight.
    pub async fn cancel_run(&self) -> ConversationResult<bool> {
        let target = {
            let st = self.state.lock();
            st.active_run
                .as_ref()
                .map(|run| (run.thread_id.clone(), run.id.clone()))
        };
        let Some((thread_id, run_id)) = target else {
            return Ok(false);
        };
        match self.gateway.cancel_run(&thread_id, &run_id).await {
            Ok(run) => {
                info!("Cancellation requested for run {} ({})", run.id, run.status.as_str());
                Ok(true)
            }
            Err(err) => {
                self.notify(Operation::CancelRun, err.to_string());
                Err(err.into())
            }
        }
    }
}
