//! Snapshot building for the tick broadcast

use crate::util::time::unix_millis;
use crate::ws::protocol::{ParticipantSnapshot, ServerMsg};

use super::ParticipantState;

/// Builds full-state snapshots for network transmission.
///
/// Every tick carries every participant's public state; there is no per-field
/// diffing, so a client that drops a message heals on the next one.
pub struct SnapshotBuilder {
    /// Ticks broadcast since the session last went active
    tick: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self { tick: 0 }
    }

    pub fn reset(&mut self) {
        self.tick = 0;
    }

    /// Public state of every participant, in join order
    pub fn participants(participants: &[ParticipantState]) -> Vec<ParticipantSnapshot> {
        participants.iter().map(ParticipantState::snapshot).collect()
    }

    /// Build the next tick message
    pub fn build(&mut self, participants: &[ParticipantState]) -> ServerMsg {
        self.tick += 1;
        ServerMsg::SessionTick {
            tick: self.tick,
            participants: Self::participants(participants),
            server_timestamp: unix_millis(),
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
