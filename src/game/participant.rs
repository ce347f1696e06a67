//! Authoritative per-participant state

use tokio::time::Instant;
use uuid::Uuid;

use crate::ws::protocol::ParticipantSnapshot;

use super::combat::{ShooterGate, MAX_AMMO, MAX_HEALTH};
use super::geometry::{Rotation, Vec3};
use super::spawn::SpawnPoint;

/// Participant state in a session (authoritative)
#[derive(Debug, Clone)]
pub struct ParticipantState {
    pub id: Uuid,
    pub display_name: String,

    // Transform, as last reported by the client
    pub position: Vec3,
    pub rotation: Rotation,

    // Combat
    pub health: i32,
    pub ammo: u32,
    pub alive: bool,
    pub reloading: bool,
    pub last_shot_at: Option<Instant>,

    // Stats
    pub kills: u32,
    pub deaths: u32,
}

impl ParticipantState {
    pub fn new(id: Uuid, display_name: String, spawn: SpawnPoint) -> Self {
        Self {
            id,
            display_name,
            position: spawn.position,
            rotation: spawn.rotation,
            health: MAX_HEALTH,
            ammo: MAX_AMMO,
            alive: true,
            reloading: false,
            last_shot_at: None,
            kills: 0,
            deaths: 0,
        }
    }

    pub fn place(&mut self, spawn: SpawnPoint) {
        self.position = spawn.position;
        self.rotation = spawn.rotation;
    }

    /// Restore vitals after death. Identity and kill/death counters survive.
    pub fn respawn(&mut self, spawn: SpawnPoint) {
        self.health = MAX_HEALTH;
        self.ammo = MAX_AMMO;
        self.alive = true;
        self.reloading = false;
        self.last_shot_at = None;
        self.place(spawn);
    }

    /// Mark dead; health is clamped and any reload in flight is abandoned
    pub fn die(&mut self) {
        self.health = 0;
        self.alive = false;
        self.reloading = false;
        self.deaths += 1;
    }

    pub fn needs_reload(&self) -> bool {
        self.alive && !self.reloading && self.ammo < MAX_AMMO
    }

    pub fn gate(&self) -> ShooterGate {
        ShooterGate {
            alive: self.alive,
            reloading: self.reloading,
            ammo: self.ammo,
            last_shot_at: self.last_shot_at,
        }
    }

    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            position: self.position,
            rotation: self.rotation,
            health: self.health,
            ammo: self.ammo,
            alive: self.alive,
            reloading: self.reloading,
            kills: self.kills,
            deaths: self.deaths,
        }
    }
}
