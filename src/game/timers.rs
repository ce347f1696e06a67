//! One-shot session timers (reload, respawn, cleanup)

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::session::SessionCommand;

/// What a pending timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Reload(Uuid),
    Respawn(Uuid),
    Cleanup,
}

struct PendingTimer {
    token: u64,
    task: JoinHandle<()>,
}

/// Pending timers of one session.
///
/// Each timer is a sleeping task that posts `SessionCommand::TimerFired` back
/// into the session's command channel. Cancelling aborts the task, but a
/// firing may already be queued, so the session must call [`TimerSet::complete`]
/// and drop the firing when it returns false.
pub struct TimerSet {
    tx: mpsc::Sender<SessionCommand>,
    pending: HashMap<TimerKey, PendingTimer>,
    next_token: u64,
}

impl TimerSet {
    pub fn new(tx: mpsc::Sender<SessionCommand>) -> Self {
        Self {
            tx,
            pending: HashMap::new(),
            next_token: 0,
        }
    }

    /// Arm a timer, replacing any pending timer with the same key
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(key);

        self.next_token += 1;
        let token = self.next_token;
        let tx = self.tx.clone();
        let deadline = Instant::now() + delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(SessionCommand::TimerFired { key, token }).await;
        });

        self.pending.insert(key, PendingTimer { token, task });
    }

    /// Revoke a pending timer. Returns true if one was armed.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.pending.remove(&key) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// Consume a firing. False means it was cancelled or superseded.
    pub fn complete(&mut self, key: TimerKey, token: u64) -> bool {
        match self.pending.get(&key) {
            Some(timer) if timer.token == token => {
                self.pending.remove(&key);
                true
            }
            _ => {
                debug!(?key, token, "Dropping stale timer firing");
                false
            }
        }
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.pending.contains_key(&key)
    }

    /// Cancel every timer owned by a participant
    pub fn cancel_participant(&mut self, participant_id: Uuid) {
        self.cancel(TimerKey::Reload(participant_id));
        self.cancel(TimerKey::Respawn(participant_id));
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        for (_, timer) in self.pending.drain() {
            timer.task.abort();
        }
    }
}
