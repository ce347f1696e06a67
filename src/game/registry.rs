//! Room registry - room codes to live sessions

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::RoomError;
use super::session::{JoinVia, PlayerSender, Session, SessionHandle, SessionSettings, SESSION_CAPACITY};

/// Room code length
pub const ROOM_CODE_LEN: usize = 4;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Who is asking to enter a room
#[derive(Debug, Clone)]
pub struct Requester {
    /// Stable connection id, becomes the participant id
    pub id: Uuid,
    pub display_name: String,
    pub outbox: PlayerSender,
}

/// Registry of all live sessions
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, SessionHandle>>,
    rng: Mutex<ChaCha8Rng>,
    settings: SessionSettings,
}

impl RoomRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_rng(settings, ChaCha8Rng::from_entropy())
    }

    /// Registry with a fixed code sequence
    pub fn with_rng(settings: SessionSettings, rng: ChaCha8Rng) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            rng: Mutex::new(rng),
            settings,
        }
    }

    pub fn get(&self, code: &str) -> Option<SessionHandle> {
        self.rooms
            .get(&normalize_code(code))
            .map(|r| r.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_participants(&self) -> usize {
        self.rooms.iter().map(|r| r.value().occupancy()).sum()
    }

    /// Create a room and seat the requester as its first participant
    pub async fn create_room(&self, requester: Requester) -> Result<SessionHandle, RoomError> {
        let display_name = validate_name(&requester.display_name)?;

        let handle = loop {
            let code = self.generate_code();
            if let Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                let handle = self.spawn_session(code);
                slot.insert(handle.clone());
                break handle;
            }
            debug!(room = %code, "Room code collision, drawing again");
        };

        info!(room = %handle.code, "Room created");

        handle
            .join(requester.id, display_name, requester.outbox, JoinVia::Create)
            .await?;
        Ok(handle)
    }

    /// Seat the requester in an existing room
    pub async fn join_room(&self, code: &str, requester: Requester) -> Result<SessionHandle, RoomError> {
        let code = validate_code(code)?;
        let display_name = validate_name(&requester.display_name)?;

        let handle = self
            .get(&code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        if handle.occupancy() >= SESSION_CAPACITY {
            return Err(RoomError::RoomFull(code));
        }

        match handle
            .join(requester.id, display_name, requester.outbox, JoinVia::Join)
            .await
        {
            Ok(()) => Ok(handle),
            // Lost the race against cleanup
            Err(RoomError::SessionClosed(_)) => Err(RoomError::NotFound(code)),
            Err(e) => Err(e),
        }
    }

    /// Reconnect path: join `code`, recreating the room if it was already
    /// collected.
    pub async fn resolve_or_recreate(
        &self,
        code: &str,
        requester: Requester,
    ) -> Result<SessionHandle, RoomError> {
        let code = validate_code(code)?;
        let display_name = validate_name(&requester.display_name)?;

        // A second pass covers a session that shut down between lookup and join
        for _ in 0..2 {
            let handle = match self.rooms.entry(code.clone()) {
                Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
                Entry::Occupied(mut entry) => {
                    let handle = self.spawn_session(code.clone());
                    entry.insert(handle.clone());
                    info!(room = %code, "Replaced closed room");
                    handle
                }
                Entry::Vacant(slot) => {
                    let handle = self.spawn_session(code.clone());
                    slot.insert(handle.clone());
                    info!(room = %code, "Recreated room for reconnect");
                    handle
                }
            };

            match handle
                .join(
                    requester.id,
                    display_name.clone(),
                    requester.outbox.clone(),
                    JoinVia::Join,
                )
                .await
            {
                Err(RoomError::SessionClosed(_)) => {
                    self.rooms.remove_if(&code, |_, h| h.id == handle.id);
                }
                result => return result.map(|()| handle),
            }
        }

        Err(RoomError::SessionClosed(code))
    }

    /// Drop a room mapping. Removing an absent code is a no-op.
    pub fn remove_room(&self, code: &str) {
        if self.rooms.remove(&normalize_code(code)).is_some() {
            info!(room = %code, "Room removed from registry");
        }
    }

    /// Start the session task; it unregisters itself once terminated
    fn spawn_session(&self, code: String) -> SessionHandle {
        let (session, handle) = Session::new(code.clone(), self.settings);

        let rooms = self.rooms.clone();
        let session_id = handle.id;
        tokio::spawn(async move {
            session.run().await;

            // Only remove our own entry; the code may have been reused
            if rooms.remove_if(&code, |_, h| h.id == session_id).is_some() {
                info!(room = %code, "Room removed from registry");
            }
        });

        handle
    }

    fn generate_code(&self) -> String {
        let mut rng = self.rng.lock();
        (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

/// Room codes are case-insensitive
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn validate_code(code: &str) -> Result<String, RoomError> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(RoomError::Validation("Room code is required"));
    }
    if code.len() != ROOM_CODE_LEN || !code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)) {
        return Err(RoomError::NotFound(code));
    }
    Ok(code)
}

fn validate_name(name: &str) -> Result<String, RoomError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomError::Validation("Display name is required"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn requester(name: &str) -> (Requester, mpsc::Receiver<ServerMsg>) {
        let (outbox, rx) = mpsc::channel(256);
        (
            Requester {
                id: Uuid::new_v4(),
                display_name: name.to_string(),
                outbox,
            },
            rx,
        )
    }

    fn short_grace() -> SessionSettings {
        SessionSettings {
            grace_period: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn create_room_returns_valid_code() {
        let registry = RoomRegistry::default();
        let (host, mut rx) = requester("alice");
        let handle = assert_ok!(registry.create_room(host).await);

        assert_eq!(handle.code.len(), ROOM_CODE_LEN);
        assert!(handle.code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        assert_eq!(registry.active_rooms(), 1);
        assert_eq!(handle.occupancy(), 1);
        assert!(format!("{handle:?}").contains(&handle.code));
        assert!(matches!(rx.recv().await, Some(ServerMsg::RoomCreated { room_code }) if room_code == handle.code));
    }

    #[tokio::test]
    async fn empty_display_name_is_rejected() {
        let registry = RoomRegistry::default();
        let (host, _rx) = requester("   ");
        let err = registry.create_room(host).await.unwrap_err();
        assert!(matches!(err, RoomError::Validation(_)));
        assert_eq!(registry.active_rooms(), 0);
    }

    #[tokio::test]
    async fn join_is_case_insensitive_and_fills_room() {
        let registry = RoomRegistry::default();
        let (host, _host_rx) = requester("alice");
        let handle = registry.create_room(host).await.unwrap();

        let (guest, mut guest_rx) = requester("bob");
        let joined = registry
            .join_room(&handle.code.to_lowercase(), guest)
            .await
            .unwrap();
        assert_eq!(joined.id, handle.id);
        assert_eq!(joined.occupancy(), 2);
        assert!(matches!(guest_rx.recv().await, Some(ServerMsg::RoomJoined { .. })));
        assert!(matches!(guest_rx.recv().await, Some(ServerMsg::SessionStart { .. })));

        let (third, _rx) = requester("carol");
        let err = registry.join_room(&handle.code, third).await.unwrap_err();
        assert_eq!(err, RoomError::RoomFull(handle.code.clone()));
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let registry = RoomRegistry::default();
        let (guest, _rx) = requester("bob");
        assert_eq!(
            registry.join_room("zz99", guest).await.unwrap_err(),
            RoomError::NotFound("ZZ99".into())
        );

        let (guest, _rx) = requester("bob");
        let err = assert_err!(registry.join_room("", guest).await);
        assert!(matches!(err, RoomError::Validation(_)));
    }

    #[tokio::test]
    async fn seeded_registries_never_reuse_live_codes() {
        let registry = RoomRegistry::with_rng(SessionSettings::default(), ChaCha8Rng::seed_from_u64(7));
        let mut codes = std::collections::HashSet::new();
        let mut receivers = Vec::new();
        for i in 0..50 {
            let (host, rx) = requester(&format!("p{i}"));
            receivers.push(rx);
            let handle = registry.create_room(host).await.unwrap();
            assert!(codes.insert(handle.code));
        }
        assert_eq!(registry.active_rooms(), 50);
    }

    #[tokio::test]
    async fn remove_room_is_idempotent() {
        let registry = RoomRegistry::default();
        let (host, _rx) = requester("alice");
        let handle = registry.create_room(host).await.unwrap();

        registry.remove_room(&handle.code);
        registry.remove_room(&handle.code);
        assert!(registry.get(&handle.code).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_room_is_collected_after_grace_period() {
        let registry = RoomRegistry::new(short_grace());
        let (host, _rx) = requester("alice");
        let host_id = host.id;
        let handle = registry.create_room(host).await.unwrap();
        let code = handle.code.clone();

        handle.leave(host_id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(registry.get(&code).is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(registry.get(&code).is_none());
        assert_eq!(registry.active_rooms(), 0);

        let (guest, _rx) = requester("bob");
        assert_eq!(
            registry.join_room(&code, guest).await.unwrap_err(),
            RoomError::NotFound(code.clone())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_recreates_collected_room_under_same_code() {
        let registry = RoomRegistry::new(short_grace());
        let (host, _rx) = requester("alice");
        let host_id = host.id;
        let original = registry.create_room(host).await.unwrap();
        let code = original.code.clone();

        handle_leave_and_wait(&registry, &original, host_id).await;
        assert!(registry.get(&code).is_none());

        let (again, mut rx) = requester("alice");
        let recreated = registry.resolve_or_recreate(&code, again).await.unwrap();
        assert_eq!(recreated.code, code);
        assert_ne!(recreated.id, original.id);
        assert_eq!(recreated.occupancy(), 1);
        assert!(matches!(rx.recv().await, Some(ServerMsg::RoomJoined { room_code }) if room_code == code));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_period_reuses_session() {
        let registry = RoomRegistry::new(short_grace());
        let (host, _rx) = requester("alice");
        let host_id = host.id;
        let original = registry.create_room(host).await.unwrap();

        original.leave(host_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let (again, _rx) = requester("alice");
        let resumed = registry.resolve_or_recreate(&original.code, again).await.unwrap();
        assert_eq!(resumed.id, original.id);

        // Cleanup was cancelled by the rejoin
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(registry.get(&original.code).is_some());
    }

    #[tokio::test]
    async fn reconnect_validates_code_shape() {
        let registry = RoomRegistry::default();
        let (guest, _rx) = requester("bob");
        assert!(matches!(
            registry.resolve_or_recreate("toolong", guest).await.unwrap_err(),
            RoomError::NotFound(_)
        ));
        assert_eq!(registry.active_rooms(), 0);
    }

    async fn handle_leave_and_wait(registry: &RoomRegistry, handle: &SessionHandle, id: Uuid) {
        handle.leave(id).await.unwrap();
        let code = handle.code.clone();
        tokio::time::timeout(Duration::from_secs(10), async {
            while registry.get(&code).is_some() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .expect("room should be collected");
    }
}
