//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::session::PlayerSender;
use crate::game::{Action, Requester, RoomError, RoomRegistry, SessionHandle};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Per-connection outbound buffer; a client this far behind starts losing ticks
const OUTBOX_CAPACITY: usize = 128;

/// Query parameters for WebSocket connection.
/// Both present means "put me back in this room" (page refresh / redirect).
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub room: Option<String>,
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, query: WsQuery, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbox, outbox_rx) = mpsc::channel::<ServerMsg>(OUTBOX_CAPACITY);

    // Spawn writer task: outbox -> WebSocket
    let writer_handle = tokio::spawn(write_loop(connection_id, ws_sink, outbox_rx));

    let mut connection = Connection {
        id: connection_id,
        outbox,
        registry: state.registry.clone(),
        session: None,
    };

    if let (Some(room), Some(name)) = (query.room, query.name) {
        connection.reconnect(&room, name).await;
    }

    read_loop(&mut connection, ws_stream).await;

    // Cleanup on disconnect
    connection.disconnect().await;
    writer_handle.abort();

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> session
async fn read_loop(connection: &mut Connection, mut ws_stream: SplitStream<WebSocket>) {
    let rate_limiter = ConnectionRateLimiter::new();
    let connection_id = connection.id;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %connection_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::RoomCreate { .. } | ClientMsg::RoomJoin { .. })
                        if !rate_limiter.check_room() =>
                    {
                        connection
                            .reply(ServerMsg::RoomError {
                                message: "Too many room requests".to_string(),
                            })
                            .await;
                    }
                    Ok(client_msg) => connection.handle(client_msg).await,
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(connection_id = %connection_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(connection_id = %connection_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Writer loop: outbox -> WebSocket
async fn write_loop(
    connection_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbox_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// One client connection and the session it sits in
struct Connection {
    id: Uuid,
    outbox: PlayerSender,
    registry: Arc<RoomRegistry>,
    session: Option<SessionHandle>,
}

impl Connection {
    async fn handle(&mut self, msg: ClientMsg) {
        match msg {
            ClientMsg::RoomCreate { display_name } => {
                if self.refuse_if_seated().await {
                    return;
                }
                let result = self.registry.create_room(self.requester(display_name)).await;
                self.seat(result).await;
            }
            ClientMsg::RoomJoin {
                room_code,
                display_name,
            } => {
                if self.refuse_if_seated().await {
                    return;
                }
                let result = self
                    .registry
                    .join_room(&room_code, self.requester(display_name))
                    .await;
                self.seat(result).await;
            }
            ClientMsg::PlayerUpdate { position, rotation } => {
                self.act(Action::Move { position, rotation }).await;
            }
            ClientMsg::PlayerShoot {
                origin,
                direction,
                client_timestamp,
            } => {
                trace!(connection_id = %self.id, ?client_timestamp, "Shot received");
                self.act(Action::Shoot { origin, direction }).await;
            }
            ClientMsg::PlayerReload => self.act(Action::Reload).await,
            ClientMsg::Ping { t } => self.reply(ServerMsg::Pong { t }).await,
        }
    }

    /// Handshake-driven re-entry into a known room
    async fn reconnect(&mut self, room_code: &str, display_name: String) {
        let result = self
            .registry
            .resolve_or_recreate(room_code, self.requester(display_name))
            .await;
        self.seat(result).await;
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.leave(self.id).await {
                debug!(connection_id = %self.id, error = %e, "Leave after session closed");
            }
        }
    }

    fn requester(&self, display_name: String) -> Requester {
        Requester {
            id: self.id,
            display_name,
            outbox: self.outbox.clone(),
        }
    }

    async fn refuse_if_seated(&self) -> bool {
        match &self.session {
            Some(session) => {
                self.reply(ServerMsg::RoomError {
                    message: RoomError::AlreadyInRoom(session.code.clone()).to_string(),
                })
                .await;
                true
            }
            None => false,
        }
    }

    async fn seat(&mut self, result: Result<SessionHandle, RoomError>) {
        match result {
            Ok(session) => {
                info!(connection_id = %self.id, room = %session.code, "Connection seated");
                self.session = Some(session);
            }
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "Room request refused");
                self.reply(ServerMsg::RoomError {
                    message: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn act(&mut self, action: Action) {
        let Some(session) = &self.session else {
            debug!(connection_id = %self.id, "Action outside a room, ignoring");
            return;
        };
        let result = session.act(self.id, action).await;
        if let Err(e) = result {
            warn!(connection_id = %self.id, error = %e, "Session unavailable");
            self.session = None;
        }
    }

    async fn reply(&self, msg: ServerMsg) {
        if self.outbox.send(msg).await.is_err() {
            debug!(connection_id = %self.id, "Outbox closed");
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
