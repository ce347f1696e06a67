//! Session state machine and authoritative tick loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::TICK_DURATION;
use crate::ws::protocol::ServerMsg;

use super::combat::{CombatSystem, DenyReason, WeaponStats, HITBOX_HALF_EXTENTS, MAX_AMMO, RESPAWN_DELAY};
use super::error::RoomError;
use super::geometry::{Rotation, Vec3};
use super::hit::{HitDetector, HitResult};
use super::participant::ParticipantState;
use super::snapshot::SnapshotBuilder;
use super::spawn::{farthest_spawn, initial_spawn};
use super::timers::{TimerKey, TimerSet};

/// Participants per session
pub const SESSION_CAPACITY: usize = 2;

/// Outbound channel of one connection
pub type PlayerSender = mpsc::Sender<ServerMsg>;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the second participant
    Forming,
    /// Both seats taken, tick loop running
    Active,
    /// Lost a participant, tick loop stopped
    Suspended,
    /// Cleanup fired while empty; the task exits
    Terminated,
}

/// How the participant reached the session; decides the greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinVia {
    Create,
    Join,
}

/// Gameplay request from a seated participant
#[derive(Debug, Clone)]
pub enum Action {
    Move { position: Vec3, rotation: Rotation },
    Shoot { origin: Vec3, direction: Vec3 },
    Reload,
}

/// Commands consumed by the session task
pub enum SessionCommand {
    Join {
        participant_id: Uuid,
        display_name: String,
        outbox: PlayerSender,
        via: JoinVia,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Action {
        participant_id: Uuid,
        action: Action,
    },
    Leave {
        participant_id: Uuid,
    },
    TimerFired {
        key: TimerKey,
        token: u64,
    },
}

/// What happened to a shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShotOutcome {
    Denied(DenyReason),
    /// Unknown shooter or degenerate ray; nothing changed
    Rejected,
    Miss,
    Hit { target: Uuid, damage: i32, headshot: bool },
    Kill { target: Uuid, headshot: bool },
}

/// Tunables handed down from the registry
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// How long an empty session survives before removal
    pub grace_period: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
        }
    }
}

/// Handle to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub code: String,
    /// Distinguishes sessions that reuse the same code
    pub id: Uuid,
    tx: mpsc::Sender<SessionCommand>,
    occupancy: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Seat a participant. Resolves once the session has accepted or refused.
    pub async fn join(
        &self,
        participant_id: Uuid,
        display_name: String,
        outbox: PlayerSender,
        via: JoinVia,
    ) -> Result<(), RoomError> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(SessionCommand::Join {
            participant_id,
            display_name,
            outbox,
            via,
            reply,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::SessionClosed(self.code.clone()))?
    }

    pub async fn act(&self, participant_id: Uuid, action: Action) -> Result<(), RoomError> {
        self.send(SessionCommand::Action {
            participant_id,
            action,
        })
        .await
    }

    pub async fn leave(&self, participant_id: Uuid) -> Result<(), RoomError> {
        self.send(SessionCommand::Leave { participant_id }).await
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), RoomError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| RoomError::SessionClosed(self.code.clone()))
    }
}

/// Session state (owned by the session task)
pub struct SessionState {
    pub code: String,
    pub id: Uuid,
    pub phase: SessionPhase,
    pub running: bool,
    /// Seated participants in join order
    pub participants: Vec<ParticipantState>,
    connections: HashMap<Uuid, PlayerSender>,
    timers: TimerSet,
    snapshots: SnapshotBuilder,
    weapon: WeaponStats,
    settings: SessionSettings,
    occupancy: Arc<AtomicUsize>,
}

impl SessionState {
    fn index_of(&self, participant_id: Uuid) -> Option<usize> {
        self.participants.iter().position(|p| p.id == participant_id)
    }

    fn participant_mut(&mut self, participant_id: Uuid) -> Option<&mut ParticipantState> {
        self.participants.iter_mut().find(|p| p.id == participant_id)
    }

    /// Send to one participant, skipping slow or closed connections
    fn send_to(&self, participant_id: Uuid, msg: ServerMsg) {
        let Some(outbox) = self.connections.get(&participant_id) else {
            return;
        };
        match outbox.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(room = %self.code, participant_id = %participant_id, "Outbox full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(room = %self.code, participant_id = %participant_id, "Outbox closed");
            }
        }
    }

    fn broadcast(&self, msg: ServerMsg) {
        for id in self.connections.keys() {
            self.send_to(*id, msg.clone());
        }
    }

    fn sync_occupancy(&self) {
        self.occupancy.store(self.participants.len(), Ordering::Relaxed);
    }

    /// Process one command to completion
    pub fn handle_command(&mut self, cmd: SessionCommand, now: Instant) {
        match cmd {
            SessionCommand::Join {
                participant_id,
                display_name,
                outbox,
                via,
                reply,
            } => {
                let result = self.handle_join(participant_id, display_name, outbox, via);
                let seated = result.is_ok();
                if reply.send(result).is_err() && seated {
                    // Requester vanished while waiting; free the seat again
                    self.handle_leave(participant_id);
                }
            }
            SessionCommand::Action {
                participant_id,
                action,
            } => match action {
                Action::Move { position, rotation } => {
                    self.handle_move(participant_id, position, rotation);
                }
                Action::Shoot { origin, direction } => {
                    self.handle_shoot(participant_id, origin, direction, now);
                }
                Action::Reload => self.handle_reload(participant_id),
            },
            SessionCommand::Leave { participant_id } => self.handle_leave(participant_id),
            SessionCommand::TimerFired { key, token } => {
                if !self.timers.complete(key, token) {
                    return;
                }
                match key {
                    TimerKey::Reload(id) => self.finish_reload(id),
                    TimerKey::Respawn(id) => self.respawn(id),
                    TimerKey::Cleanup => self.expire(),
                }
            }
        }
    }

    /// Handle participant join request
    pub fn handle_join(
        &mut self,
        participant_id: Uuid,
        display_name: String,
        outbox: PlayerSender,
        via: JoinVia,
    ) -> Result<(), RoomError> {
        if self.index_of(participant_id).is_some() {
            return Err(RoomError::AlreadyInRoom(self.code.clone()));
        }
        if self.participants.len() >= SESSION_CAPACITY {
            return Err(RoomError::RoomFull(self.code.clone()));
        }

        if self.timers.cancel(TimerKey::Cleanup) {
            debug!(room = %self.code, "Cleanup cancelled by join");
        }

        let spawn = initial_spawn(self.participants.len());
        let participant = ParticipantState::new(participant_id, display_name.clone(), spawn);

        // Tell the current occupants before seating the newcomer
        self.broadcast(ServerMsg::PlayerJoined {
            id: participant_id,
            display_name: display_name.clone(),
        });

        self.connections.insert(participant_id, outbox);
        let greeting = match via {
            JoinVia::Create => ServerMsg::RoomCreated {
                room_code: self.code.clone(),
            },
            JoinVia::Join => ServerMsg::RoomJoined {
                room_code: self.code.clone(),
            },
        };
        self.send_to(participant_id, greeting);

        self.participants.push(participant);
        self.sync_occupancy();

        info!(
            room = %self.code,
            participant_id = %participant_id,
            display_name = %display_name,
            participant_count = self.participants.len(),
            "Participant joined session"
        );

        if self.participants.len() == SESSION_CAPACITY {
            self.start();
        }
        Ok(())
    }

    /// Place everyone and start ticking
    fn start(&mut self) {
        for (index, participant) in self.participants.iter_mut().enumerate() {
            participant.place(initial_spawn(index));
        }

        self.phase = SessionPhase::Active;
        self.running = true;
        self.snapshots.reset();

        self.broadcast(ServerMsg::SessionStart {
            participants: SnapshotBuilder::participants(&self.participants),
        });

        info!(room = %self.code, "Session active");
    }

    /// Handle participant leave
    pub fn handle_leave(&mut self, participant_id: Uuid) {
        let Some(index) = self.index_of(participant_id) else {
            return;
        };

        let departed = self.participants.remove(index);
        self.connections.remove(&participant_id);
        self.timers.cancel_participant(participant_id);
        self.sync_occupancy();

        self.broadcast(ServerMsg::PlayerDisconnected {
            id: departed.id,
            display_name: departed.display_name.clone(),
        });

        info!(
            room = %self.code,
            participant_id = %participant_id,
            participant_count = self.participants.len(),
            "Participant left session"
        );

        if self.running {
            self.running = false;
            self.phase = SessionPhase::Suspended;
            if !self.participants.is_empty() {
                self.broadcast(ServerMsg::SessionInterrupted {
                    reason: "opponent-disconnected".to_string(),
                });
            }
        }

        if self.participants.is_empty() {
            self.phase = SessionPhase::Suspended;
            self.timers.schedule(TimerKey::Cleanup, self.settings.grace_period);
            debug!(room = %self.code, grace_ms = self.settings.grace_period.as_millis() as u64, "Session empty, cleanup armed");
        }
    }

    /// Client-reported transform; dead participants stay where they fell
    pub fn handle_move(&mut self, participant_id: Uuid, position: Vec3, rotation: Rotation) {
        if !position.is_finite() || !rotation.yaw.is_finite() || !rotation.pitch.is_finite() {
            warn!(room = %self.code, participant_id = %participant_id, "Ignoring non-finite transform");
            return;
        }
        if let Some(participant) = self.participant_mut(participant_id) {
            if participant.alive {
                participant.position = position;
                participant.rotation = rotation;
            }
        }
    }

    pub fn handle_reload(&mut self, participant_id: Uuid) {
        let reload_duration = self.weapon.reload_duration;
        let Some(participant) = self.participant_mut(participant_id) else {
            return;
        };
        if !participant.needs_reload() {
            debug!(participant_id = %participant_id, "Reload ignored");
            return;
        }

        participant.reloading = true;
        self.broadcast(ServerMsg::ReloadStarted { id: participant_id });
        self.timers.schedule(TimerKey::Reload(participant_id), reload_duration);
    }

    fn finish_reload(&mut self, participant_id: Uuid) {
        let Some(participant) = self.participant_mut(participant_id) else {
            return;
        };
        if !participant.alive || !participant.reloading {
            return;
        }

        participant.ammo = MAX_AMMO;
        participant.reloading = false;
        self.broadcast(ServerMsg::ReloadFinished {
            id: participant_id,
            ammo: MAX_AMMO,
        });
    }

    /// Validate and resolve a shot
    pub fn handle_shoot(
        &mut self,
        participant_id: Uuid,
        origin: Vec3,
        direction: Vec3,
        now: Instant,
    ) -> ShotOutcome {
        let Some(shooter_idx) = self.index_of(participant_id) else {
            return ShotOutcome::Rejected;
        };

        if let Err(reason) =
            CombatSystem::can_fire(self.participants[shooter_idx].gate(), now, &self.weapon)
        {
            debug!(participant_id = %participant_id, %reason, "Shot denied");
            self.send_to(participant_id, ServerMsg::ShootDenied { reason });
            return ShotOutcome::Denied(reason);
        }

        let Some(direction) = direction.try_normalize().filter(|_| origin.is_finite()) else {
            warn!(participant_id = %participant_id, "Rejecting shot with degenerate ray");
            return ShotOutcome::Rejected;
        };

        let shooter = &mut self.participants[shooter_idx];
        shooter.ammo -= 1;
        shooter.last_shot_at = Some(now);

        // Nearest hit wins; equal distances keep the earlier joiner
        let mut nearest: Option<(usize, HitResult)> = None;
        for (idx, target) in self.participants.iter().enumerate() {
            if idx == shooter_idx || !target.alive {
                continue;
            }
            let result = HitDetector::test(
                origin,
                direction,
                CombatSystem::hitbox_center(target.position),
                HITBOX_HALF_EXTENTS,
            );
            if result.hit && nearest.map_or(true, |(_, best)| result.distance < best.distance) {
                nearest = Some((idx, result));
            }
        }

        let Some((target_idx, hit)) = nearest else {
            self.send_to(participant_id, ServerMsg::ShootMiss {});
            return ShotOutcome::Miss;
        };

        let damage = self.weapon.damage(hit.headshot);
        let target = &mut self.participants[target_idx];
        let target_id = target.id;
        let (health, killed) = CombatSystem::apply_damage(target.health, damage);
        target.health = health;

        if !killed {
            self.send_to(
                participant_id,
                ServerMsg::HitConfirmed {
                    target_id,
                    damage,
                    headshot: hit.headshot,
                },
            );
            return ShotOutcome::Hit {
                target: target_id,
                damage,
                headshot: hit.headshot,
            };
        }

        target.die();
        let victim_name = target.display_name.clone();
        self.timers.cancel(TimerKey::Reload(target_id));

        let shooter = &mut self.participants[shooter_idx];
        shooter.kills += 1;
        let killer_name = shooter.display_name.clone();

        self.broadcast(ServerMsg::Kill {
            killer_id: participant_id,
            killer_name: killer_name.clone(),
            victim_id: target_id,
            victim_name,
            headshot: hit.headshot,
        });
        self.send_to(
            target_id,
            ServerMsg::PlayerDied {
                killer_name,
                respawn_seconds: RESPAWN_DELAY.as_secs(),
            },
        );
        self.timers.schedule(TimerKey::Respawn(target_id), RESPAWN_DELAY);

        info!(
            room = %self.code,
            killer_id = %participant_id,
            victim_id = %target_id,
            headshot = hit.headshot,
            "Kill"
        );

        ShotOutcome::Kill {
            target: target_id,
            headshot: hit.headshot,
        }
    }

    /// Bring a dead participant back, as far from the opponent as possible
    fn respawn(&mut self, participant_id: Uuid) {
        let Some(idx) = self.index_of(participant_id) else {
            return;
        };
        if self.participants[idx].alive {
            return;
        }

        let opponent = self
            .participants
            .iter()
            .filter(|p| p.id != participant_id)
            .max_by_key(|p| p.alive)
            .map(|p| p.position);
        let spawn = farthest_spawn(opponent);

        let participant = &mut self.participants[idx];
        participant.respawn(spawn);
        let msg = ServerMsg::PlayerRespawned {
            id: participant_id,
            position: participant.position,
            health: participant.health,
        };
        self.send_to(participant_id, msg);

        debug!(room = %self.code, participant_id = %participant_id, "Participant respawned");
    }

    /// Cleanup timer fired
    fn expire(&mut self) {
        if !self.participants.is_empty() {
            return;
        }
        self.phase = SessionPhase::Terminated;
        info!(room = %self.code, "Grace period over, terminating session");
    }

    /// Broadcast the full-state tick
    pub fn broadcast_tick(&mut self) {
        if !self.running {
            return;
        }
        let msg = self.snapshots.build(&self.participants);
        self.broadcast(msg);
    }
}

/// The authoritative session task
pub struct Session {
    pub state: SessionState,
    input_rx: mpsc::Receiver<SessionCommand>,
}

impl Session {
    /// Create a new, empty session. The cleanup timer starts armed so a session
    /// nobody ever joins still gets collected.
    pub fn new(code: String, settings: SessionSettings) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let occupancy = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        let handle = SessionHandle {
            code: code.clone(),
            id,
            tx: input_tx.clone(),
            occupancy: occupancy.clone(),
        };

        let mut timers = TimerSet::new(input_tx);
        timers.schedule(TimerKey::Cleanup, settings.grace_period);

        let session = Self {
            state: SessionState {
                code,
                id,
                phase: SessionPhase::Forming,
                running: false,
                participants: Vec::with_capacity(SESSION_CAPACITY),
                connections: HashMap::new(),
                timers,
                snapshots: SnapshotBuilder::new(),
                weapon: WeaponStats::RIFLE,
                settings,
                occupancy,
            },
            input_rx,
        };

        (session, handle)
    }

    /// Run until the session terminates
    pub async fn run(mut self) {
        info!(room = %self.state.code, session_id = %self.state.id, "Session opened");

        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                cmd = self.input_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.state.handle_command(cmd, Instant::now());
                    if self.state.phase == SessionPhase::Terminated {
                        break;
                    }
                }
                _ = next_tick(&mut ticker) => self.state.broadcast_tick(),
            }

            match (self.state.running, ticker.is_some()) {
                (true, false) => {
                    let mut tick_interval = interval(TICK_DURATION);
                    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker = Some(tick_interval);
                }
                (false, true) => ticker = None,
                _ => {}
            }
        }

        self.state.occupancy.store(0, Ordering::Relaxed);
        info!(room = %self.state.code, session_id = %self.state.id, "Session closed");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(tick_interval) => {
            tick_interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
