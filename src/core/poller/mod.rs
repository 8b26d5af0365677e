//! Keyed, cancellable status polling.
//!
//! Each sequence is a tokio task paired with a [`CancellationToken`]. The
//! controller keeps one registry entry per key; starting a sequence for a key
//! that is already polling cancels the older one first.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::gateway::GatewayError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// How a poll sequence ended. Delivered once, through [`PollHandle::outcome`].
#[derive(Debug)]
pub enum PollOutcome<S, E = GatewayError> {
    Finished(S),
    Failed(E),
    Cancelled,
}

impl<S, E> PollOutcome<S, E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PollOutcome::Cancelled)
    }
}

pub struct PollHandle<S, E = GatewayError> {
    token: CancellationToken,
    task: JoinHandle<PollOutcome<S, E>>,
}

impl<S, E> PollHandle<S, E> {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn outcome(self) -> PollOutcome<S, E> {
        match self.task.await {
            Ok(outcome) => outcome,
            // Aborted or panicked tasks count as stopped.
            Err(_) => PollOutcome::Cancelled,
        }
    }
}

struct ActivePoll {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    active: HashMap<String, ActivePoll>,
}

/// Holds no entity state; only which keys are currently polling.
#[derive(Clone, Default)]
pub struct PollingController {
    registry: Arc<Mutex<Registry>>,
}

impl PollingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Polls `fetch` every `period` (first fetch one period after start) until
    /// `is_terminal` holds, a fetch fails, or the sequence is cancelled.
    ///
    /// `on_update` sees every successfully fetched status, including the
    /// terminal one, and is never called once the sequence is cancelled.
    pub fn start_polling<S, E, F, Fut, T, U>(
        &self,
        key: impl Into<String>,
        period: Duration,
        mut fetch: F,
        is_terminal: T,
        mut on_update: U,
    ) -> PollHandle<S, E>
    where
        S: Send + 'static,
        E: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<S, E>> + Send,
        T: Fn(&S) -> bool + Send + 'static,
        U: FnMut(&S) + Send + 'static,
    {
        let key = key.into();
        let token = CancellationToken::new();
        let id = {
            let mut reg = self.registry.lock();
            reg.next_id += 1;
            let id = reg.next_id;
            let previous = reg.active.insert(
                key.clone(),
                ActivePoll {
                    id,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                debug!("Replacing poll {} for key {}", previous.id, key);
                previous.token.cancel();
            }
            id
        };

        let period = period.max(Duration::from_millis(1));
        let registry = Arc::clone(&self.registry);
        let task_key = key;
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break PollOutcome::Cancelled,
                    _ = ticker.tick() => {}
                }

                let fetched = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break PollOutcome::Cancelled,
                    res = fetch() => res,
                };
                if task_token.is_cancelled() {
                    break PollOutcome::Cancelled;
                }

                match fetched {
                    Ok(status) => {
                        on_update(&status);
                        if is_terminal(&status) {
                            break PollOutcome::Finished(status);
                        }
                    }
                    Err(err) => break PollOutcome::Failed(err),
                }
            };

            release(&registry, &task_key, id);
            debug!("Poll {} for key {} ended", id, task_key);
            outcome
        });

        PollHandle { token, task }
    }

    /// Cancels the sequence for `key`, if any. Returns whether one was active.
    pub fn cancel(&self, key: &str) -> bool {
        match self.registry.lock().active.remove(key) {
            Some(active) => {
                active.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<ActivePoll> =
            self.registry.lock().active.drain().map(|(_, p)| p).collect();
        for poll in drained {
            poll.token.cancel();
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.registry.lock().active.contains_key(key)
    }

    pub fn active_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.lock().active.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Drops the registry entry only if it still belongs to sequence `id`; a
/// replacement may already own the key.
fn release(registry: &Mutex<Registry>, key: &str, id: u64) {
    let mut reg = registry.lock();
    if reg.active.get(key).is_some_and(|p| p.id == id) {
        reg.active.remove(key);
    }
}
