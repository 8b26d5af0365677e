//! In-memory entity caches. Only the orchestrators hold mutable access.

use tracing::warn;

use super::types::{Agent, FileAttachment, Message, WorkflowExecution};

#[derive(Debug, Clone, Default)]
pub struct AgentStore {
    agents: Vec<Agent>,
}

impl AgentStore {
    pub fn replace_all(&mut self, agents: Vec<Agent>) {
        self.agents = agents;
    }

    /// Appends, or replaces an entry with the same id in place.
    pub fn upsert(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn remove(&mut self, agent_id: &str) -> Option<Agent> {
        let idx = self.agents.iter().position(|a| a.id == agent_id)?;
        Some(self.agents.remove(idx))
    }

    pub fn get(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    /// Matches by id first, then by case-insensitive name.
    pub fn find(&self, id_or_name: &str) -> Option<&Agent> {
        self.get(id_or_name).or_else(|| {
            self.agents
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(id_or_name))
        })
    }

    pub fn all(&self) -> &[Agent] {
        &self.agents
    }
}

/// Messages of the current thread, kept in ascending `created_at` order.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    thread_id: Option<String>,
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn reset(&mut self, thread_id: Option<String>) {
        self.thread_id = thread_id;
        self.messages.clear();
    }

    /// Appends a message of the tracked thread. Messages for another thread
    /// are refused.
    pub fn append(&mut self, message: Message) -> bool {
        if self.thread_id.as_deref() != Some(message.thread_id.as_str()) {
            warn!(
                "Dropping message {} for thread {} (tracking {:?})",
                message.id, message.thread_id, self.thread_id
            );
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
        true
    }

    /// Authoritative refresh from the backend; supersedes optimistic entries.
    pub fn replace_all(&mut self, mut messages: Vec<Message>) {
        if let Some(thread_id) = self.thread_id.as_deref() {
            messages.retain(|m| m.thread_id == thread_id);
        }
        messages.sort_by_key(|m| m.created_at);
        self.messages = messages;
    }

    pub fn chronological(&self) -> &[Message] {
        &self.messages
    }
}

/// Uploaded files waiting to be referenced by the next message.
#[derive(Debug, Clone, Default)]
pub struct AttachmentSet {
    pending: Vec<FileAttachment>,
}

impl AttachmentSet {
    pub fn push(&mut self, file: FileAttachment) {
        if !self.pending.iter().any(|f| f.id == file.id) {
            self.pending.push(file);
        }
    }

    pub fn remove(&mut self, file_id: &str) -> Option<FileAttachment> {
        let idx = self.pending.iter().position(|f| f.id == file_id)?;
        Some(self.pending.remove(idx))
    }

    /// Empties the set, handing back the files in upload order.
    pub fn take(&mut self) -> Vec<FileAttachment> {
        std::mem::take(&mut self.pending)
    }

    /// Puts files back ahead of anything uploaded since they were taken.
    pub fn restore(&mut self, files: Vec<FileAttachment>) {
        let newer = std::mem::replace(&mut self.pending, files);
        for file in newer {
            self.push(file);
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn files(&self) -> &[FileAttachment] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Current execution slot plus the history list in the order the backend
/// returned it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStore {
    current: Option<WorkflowExecution>,
    history: Vec<WorkflowExecution>,
}

impl ExecutionStore {
    pub fn current(&self) -> Option<&WorkflowExecution> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, execution: Option<WorkflowExecution>) {
        self.current = execution;
    }

    /// Overwrites the current view only if it still shows the same execution.
    pub fn update_current(&mut self, execution: &WorkflowExecution) -> bool {
        match self.current.as_mut() {
            Some(cur) if cur.execution_id == execution.execution_id => {
                *cur = execution.clone();
                true
            }
            _ => false,
        }
    }

    pub fn is_current(&self, execution_id: &str) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.execution_id == execution_id)
    }

    pub fn replace_history(&mut self, history: Vec<WorkflowExecution>) {
        self.history = history;
    }

    pub fn remove_from_history(&mut self, execution_id: &str) -> Option<WorkflowExecution> {
        let idx = self
            .history
            .iter()
            .position(|e| e.execution_id == execution_id)?;
        Some(self.history.remove(idx))
    }

    pub fn find(&self, execution_id: &str) -> Option<&WorkflowExecution> {
        self.history.iter().find(|e| e.execution_id == execution_id)
    }

    pub fn history(&self) -> &[WorkflowExecution] {
        &self.history
    }

    /// Display copy sorted newest first. Ties keep their stored order.
    pub fn history_by_recency(&self) -> Vec<WorkflowExecution> {
        let mut sorted = self.history.clone();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionStatus, Role};

    fn message(id: &str, thread: &str, at: i64) -> Message {
        Message {
            id: id.to_string(),
            thread_id: thread.to_string(),
            role: Role::User,
            content: "x".into(),
            attachments: None,
            created_at: at,
        }
    }

    fn execution(id: &str, at: i64) -> WorkflowExecution {
        WorkflowExecution {
            execution_id: id.to_string(),
            workflow_name: "hr-onboarding".to_string(),
            status: ExecutionStatus::Completed,
            result: None,
            inputs: None,
            created_at: at,
        }
    }

    fn file(id: &str) -> FileAttachment {
        FileAttachment {
            id: id.to_string(),
            filename: format!("{}.txt", id),
            purpose: "agents".to_string(),
            mime_type: "text/plain".to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn history_display_is_descending_without_touching_store() {
        let mut store = ExecutionStore::default();
        store.replace_history(vec![execution("a", 3), execution("b", 1), execution("c", 2)]);

        let shown: Vec<i64> = store.history_by_recency().iter().map(|e| e.created_at).collect();
        assert_eq!(shown, vec![3, 2, 1]);

        let stored: Vec<i64> = store.history().iter().map(|e| e.created_at).collect();
        assert_eq!(stored, vec![3, 1, 2]);
    }

    #[test]
    fn messages_stay_ascending_and_thread_scoped() {
        let mut store = MessageStore::default();
        store.reset(Some("t1".into()));
        assert!(store.append(message("m2", "t1", 20)));
        assert!(store.append(message("m1", "t1", 10)));
        assert!(!store.append(message("other", "t2", 5)));
        assert!(!store.append(message("m1", "t1", 10)));

        let ids: Vec<&str> = store.chronological().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);

        store.replace_all(vec![message("s2", "t1", 9), message("s1", "t1", 1)]);
        let ids: Vec<&str> = store.chronological().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn attachments_restore_ahead_of_newer_uploads() {
        let mut set = AttachmentSet::default();
        set.push(file("f1"));
        set.push(file("f2"));
        let taken = set.take();
        assert!(set.is_empty());

        set.push(file("f3"));
        set.restore(taken);
        let ids: Vec<&str> = set.files().iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3"]);
    }

    #[test]
    fn agent_lookup_by_id_or_name() {
        let mut store = AgentStore::default();
        store.upsert(Agent {
            id: "asst_1".into(),
            name: "Analyst".into(),
            model: "gpt-4o-mini".into(),
            instructions: "be terse".into(),
            tools: vec![],
            created_at: 1,
        });
        assert!(store.find("asst_1").is_some());
        assert!(store.find("analyst").is_some());
        assert!(store.find("nobody").is_none());
        assert!(store.remove("asst_1").is_some());
        assert!(store.all().is_empty());
    }

    #[test]
    fn update_current_ignores_other_executions() {
        let mut store = ExecutionStore::default();
        store.set_current(Some(execution("a", 1)));
        assert!(!store.update_current(&execution("b", 2)));
        let mut newer = execution("a", 1);
        newer.status = ExecutionStatus::Failed;
        assert!(store.update_current(&newer));
        assert_eq!(store.current().map(|c| c.status), Some(ExecutionStatus::Failed));
    }
}
