//! Combat rules - weapon stats, shot gating, damage

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::geometry::Vec3;

/// Maximum (and spawn) health
pub const MAX_HEALTH: i32 = 100;
/// Magazine size
pub const MAX_AMMO: u32 = 30;

/// Hitbox half extents; the box sits on the participant's feet position
pub const HITBOX_HALF_EXTENTS: Vec3 = Vec3::new(0.4, 0.9, 0.4);

/// The single weapon every participant carries
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage for a body hit
    pub body_damage: i32,
    /// Damage for a hit in the headshot window
    pub headshot_damage: i32,
    /// Minimum time between two shots
    pub cooldown: Duration,
    /// Time from reload start until the magazine is full
    pub reload_duration: Duration,
}

impl WeaponStats {
    pub const RIFLE: WeaponStats = WeaponStats {
        body_damage: 65,
        headshot_damage: 100,
        cooldown: Duration::from_millis(250),
        reload_duration: Duration::from_millis(2000),
    };

    pub fn damage(&self, headshot: bool) -> i32 {
        if headshot {
            self.headshot_damage
        } else {
            self.body_damage
        }
    }
}

/// Delay between death and respawn
pub const RESPAWN_DELAY: Duration = Duration::from_secs(3);

/// Why a shot was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    NotAlive,
    Reloading,
    OnCooldown,
    NoAmmo,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DenyReason::NotAlive => "not-alive",
            DenyReason::Reloading => "reloading",
            DenyReason::OnCooldown => "on-cooldown",
            DenyReason::NoAmmo => "no-ammo",
        };
        f.write_str(s)
    }
}

/// Shooter-side view needed to gate a shot
#[derive(Debug, Clone, Copy)]
pub struct ShooterGate {
    pub alive: bool,
    pub reloading: bool,
    pub ammo: u32,
    pub last_shot_at: Option<Instant>,
}

/// Combat system for gating shots and applying damage
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a participant may fire right now.
    /// Checks run in a fixed order so the reported reason is deterministic.
    pub fn can_fire(gate: ShooterGate, now: Instant, stats: &WeaponStats) -> Result<(), DenyReason> {
        if !gate.alive {
            return Err(DenyReason::NotAlive);
        }
        if gate.reloading {
            return Err(DenyReason::Reloading);
        }
        if let Some(last) = gate.last_shot_at {
            if now.saturating_duration_since(last) < stats.cooldown {
                return Err(DenyReason::OnCooldown);
            }
        }
        if gate.ammo == 0 {
            return Err(DenyReason::NoAmmo);
        }
        Ok(())
    }

    /// Apply damage to health, returns (new_health, is_dead). Health clamps at 0.
    pub fn apply_damage(current_health: i32, damage: i32) -> (i32, bool) {
        let new_health = (current_health - damage).max(0);
        (new_health, new_health <= 0)
    }

    /// Hitbox center for a participant standing at `feet`
    pub fn hitbox_center(feet: Vec3) -> Vec3 {
        feet + Vec3::new(0.0, HITBOX_HALF_EXTENTS.y, 0.0)
    }
}
