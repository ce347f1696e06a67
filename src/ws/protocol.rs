//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::combat::DenyReason;
use crate::game::geometry::{Rotation, Vec3};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Open a new room and become its first participant
    #[serde(rename = "room:create", rename_all = "camelCase")]
    RoomCreate { display_name: String },

    /// Join an existing room by code
    #[serde(rename = "room:join", rename_all = "camelCase")]
    RoomJoin {
        room_code: String,
        display_name: String,
    },

    /// Client-reported transform
    #[serde(rename = "player:update")]
    PlayerUpdate { position: Vec3, rotation: Rotation },

    /// Fire along `direction` from `origin`
    #[serde(rename = "player:shoot", rename_all = "camelCase")]
    PlayerShoot {
        origin: Vec3,
        direction: Vec3,
        /// Client clock when the shot was fired, logged only
        #[serde(default)]
        client_timestamp: Option<f64>,
    },

    #[serde(rename = "player:reload")]
    PlayerReload,

    /// Ping for latency measurement
    #[serde(rename = "ping")]
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "room:created", rename_all = "camelCase")]
    RoomCreated { room_code: String },

    #[serde(rename = "room:joined", rename_all = "camelCase")]
    RoomJoined { room_code: String },

    #[serde(rename = "room:error")]
    RoomError { message: String },

    /// Another participant entered the room
    #[serde(rename = "player:joined", rename_all = "camelCase")]
    PlayerJoined { id: Uuid, display_name: String },

    #[serde(rename = "player:disconnected", rename_all = "camelCase")]
    PlayerDisconnected { id: Uuid, display_name: String },

    /// Room is full, the duel begins
    #[serde(rename = "session:start")]
    SessionStart {
        participants: Vec<ParticipantSnapshot>,
    },

    /// Authoritative state (sent every tick)
    #[serde(rename = "session:tick", rename_all = "camelCase")]
    SessionTick {
        /// Ticks since the session last went active, starting at 1
        tick: u64,
        participants: Vec<ParticipantSnapshot>,
        /// Server unix time in milliseconds
        server_timestamp: u64,
    },

    #[serde(rename = "shoot:denied")]
    ShootDenied { reason: DenyReason },

    #[serde(rename = "shoot:miss")]
    ShootMiss {},

    #[serde(rename = "hit:confirmed", rename_all = "camelCase")]
    HitConfirmed {
        target_id: Uuid,
        damage: i32,
        headshot: bool,
    },

    #[serde(rename = "kill", rename_all = "camelCase")]
    Kill {
        killer_id: Uuid,
        killer_name: String,
        victim_id: Uuid,
        victim_name: String,
        headshot: bool,
    },

    /// Sent to the victim only
    #[serde(rename = "player:died", rename_all = "camelCase")]
    PlayerDied {
        killer_name: String,
        respawn_seconds: u64,
    },

    /// Sent to the respawned participant only
    #[serde(rename = "player:respawned")]
    PlayerRespawned { id: Uuid, position: Vec3, health: i32 },

    #[serde(rename = "reload:started")]
    ReloadStarted { id: Uuid },

    #[serde(rename = "reload:finished")]
    ReloadFinished { id: Uuid, ammo: u32 },

    /// The opponent left; no more ticks until someone rejoins
    #[serde(rename = "session:interrupted")]
    SessionInterrupted { reason: String },

    /// Pong response
    #[serde(rename = "pong")]
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Public participant state in start and tick messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub id: Uuid,
    pub display_name: String,
    pub position: Vec3,
    pub rotation: Rotation,
    /// Health (0-100)
    pub health: i32,
    pub ammo: u32,
    pub alive: bool,
    pub reloading: bool,
    pub kills: u32,
    pub deaths: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_messages() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"room:join","roomCode":"ab12","displayName":"neo"}"#)
                .unwrap();
        match msg {
            ClientMsg::RoomJoin { room_code, display_name } => {
                assert_eq!(room_code, "ab12");
                assert_eq!(display_name, "neo");
            }
            other => panic!("unexpected {:?}", other),
        }

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"player:reload"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::PlayerReload));

        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"player:shoot","origin":{"x":0,"y":1.6,"z":0},"direction":{"x":0,"y":0,"z":1},"clientTimestamp":1712.5}"#,
        )
        .unwrap();
        match msg {
            ClientMsg::PlayerShoot { direction, client_timestamp, .. } => {
                assert_eq!(direction, Vec3::new(0.0, 0.0, 1.0));
                assert_eq!(client_timestamp, Some(1712.5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn server_messages_use_wire_names() {
        let json = serde_json::to_value(ServerMsg::ShootDenied {
            reason: DenyReason::OnCooldown,
        })
        .unwrap();
        assert_eq!(json["type"], "shoot:denied");
        assert_eq!(json["reason"], "on-cooldown");

        let json = serde_json::to_value(ServerMsg::PlayerDied {
            killer_name: "trinity".into(),
            respawn_seconds: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "player:died");
        assert_eq!(json["killerName"], "trinity");
        assert_eq!(json["respawnSeconds"], 3);

        let json = serde_json::to_value(ServerMsg::ShootMiss {}).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "shoot:miss" }));
    }
}
