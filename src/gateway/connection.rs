//! Gateway connection handling
//!
//! Per-connection lifecycle: `Connected -> Authenticating -> Authenticated ->
//! subscribed to N rooms -> Disconnected`. The first frame must be an
//! `authenticate` carrying a credential; verification is bounded by the
//! configured handshake timeout and any failure closes the connection. After
//! authentication the connection auto-joins its personal room and one room
//! per group membership, then serves join/leave requests until it drops.
//! A reconnect is a brand-new connection and always re-runs the handshake.

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::auth::VerifiedIdentity;
use crate::db::schemas::UserDoc;
use crate::gateway::events::{group_room, user_room, ClientMessage, ServerMessage};
use crate::gateway::registry::ConnId;
use crate::server::AppState;
use crate::types::AtriumError;

/// WebSocket type after upgrade
type GatewayWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;
type WsWrite = SplitSink<GatewayWebSocket, Message>;
type WsRead = SplitStream<GatewayWebSocket>;

/// Handle WebSocket upgrade for the gateway endpoint
pub async fn handle_gateway_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if state.registry.is_at_capacity() {
        warn!("Gateway: at capacity, rejecting connection");
        return Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(r#"{"error":"Server at capacity"}"#)))
            .unwrap();
    }

    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => handle_connection(state, ws).await,
                    Err(e) => warn!("Gateway: WebSocket upgrade failed: {}", e),
                }
            });

            response.map(|_| Full::new(Bytes::new()))
        }
        Err(e) => {
            warn!("Gateway: WebSocket upgrade error: {}", e);
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from(format!(
                    "WebSocket upgrade failed: {e}"
                ))))
                .unwrap()
        }
    }
}

/// Drive an established gateway connection
async fn handle_connection(state: Arc<AppState>, ws: GatewayWebSocket) {
    let (mut write, mut read) = ws.split();

    // Authenticating: bounded wait for a valid credential
    let handshake = tokio::time::timeout(
        state.args.auth_timeout(),
        await_authenticate(&state, &mut read),
    )
    .await;

    let (user, identity) = match handshake {
        Ok(Ok(authenticated)) => authenticated,
        Ok(Err(e)) => {
            debug!("Gateway: handshake rejected: {}", e);
            reject(&mut write, e.code(), &e.to_string()).await;
            return;
        }
        Err(_) => {
            debug!("Gateway: handshake timed out");
            reject(
                &mut write,
                "AUTHENTICATION_REQUIRED",
                "authentication handshake timed out",
            )
            .await;
            return;
        }
    };

    // Authenticated: register, then auto-join the personal room and one room
    // per current group membership
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn = state
        .registry
        .register(&identity.subject_id, &user.user_id, tx.clone());

    let mut rooms = vec![user_room(&user.user_id)];
    match state.membership.groups_for_user(&user.user_id).await {
        Ok(groups) => rooms.extend(groups.iter().map(|g| group_room(&g.group_id))),
        Err(e) => warn!(user = %user.user_id, error = %e, "Gateway: group lookup failed"),
    }
    for room in &rooms {
        state.registry.join_room(conn, room);
    }

    state.registry.send_to_conn(
        conn,
        &ServerMessage::Authenticated {
            user_id: user.user_id.clone(),
            rooms,
        },
    );
    info!(conn, user = %user.user_id, "Gateway: authenticated");

    // Writer task drains the outbound queue onto the socket
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write.send(frame).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    // Message loop
    while let Some(frame) = read.next().await {
        let message = match frame {
            Ok(m) => m,
            Err(e) => {
                debug!(conn, error = %e, "Gateway: read error");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if !handle_client_frame(&state, conn, &user.user_id, &tx, &text).await {
                    break;
                }
            }
            Message::Ping(data) => {
                let _ = tx.send(Message::Pong(data));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Disconnected: discard the registration; rooms die with it
    state.registry.deregister(conn);
    drop(tx);
    let _ = writer.await;
    info!(conn, user = %user.user_id, "Gateway: disconnected");
}

/// Wait for the authenticate frame and resolve the caller to a platform user.
///
/// Any other request before authentication closes the connection.
async fn await_authenticate(
    state: &AppState,
    read: &mut WsRead,
) -> Result<(UserDoc, VerifiedIdentity), AtriumError> {
    loop {
        let frame = match read.next().await {
            Some(Ok(frame)) => frame,
            _ => return Err(AtriumError::AuthenticationRequired),
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return Err(AtriumError::AuthenticationRequired),
        };

        let token = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Authenticate { token }) => token,
            _ => return Err(AtriumError::AuthenticationRequired),
        };

        let identity = state.verifier.verify(&token).await?;

        let user = state
            .store
            .find_user_by_subject(&identity.subject_id)
            .await?
            .ok_or_else(|| {
                AtriumError::InvalidCredential(format!(
                    "no account for subject {}",
                    identity.subject_id
                ))
            })?;

        return Ok((user, identity));
    }
}

/// Handle one post-authentication frame; returns `false` to close
async fn handle_client_frame(
    state: &AppState,
    conn: ConnId,
    user_id: &str,
    tx: &UnboundedSender<Message>,
    text: &str,
) -> bool {
    let parsed = match serde_json::from_str::<ClientMessage>(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            queue(tx, &ServerMessage::error("BAD_MESSAGE", e.to_string()));
            return true;
        }
    };

    match parsed {
        ClientMessage::Authenticate { .. } => {
            // One handshake per connection; a reconnect gets a fresh one
            queue(
                tx,
                &ServerMessage::error("AUTHENTICATION_REQUIRED", "already authenticated"),
            );
            false
        }
        ClientMessage::JoinRoom { group_id } => {
            match state.membership.is_member(user_id, &group_id).await {
                Ok(true) => {
                    let room = group_room(&group_id);
                    state.registry.join_room(conn, &room);
                    queue(tx, &ServerMessage::RoomJoined { room });
                }
                Ok(false) => {
                    // Rejected but not disconnected
                    let err = AtriumError::NotAuthorizedForRoom(group_room(&group_id));
                    queue(tx, &ServerMessage::error(err.code(), err.to_string()));
                }
                Err(e) => {
                    queue(tx, &ServerMessage::error(e.code(), e.to_string()));
                }
            }
            true
        }
        ClientMessage::LeaveRoom { group_id } => {
            let room = group_room(&group_id);
            state.registry.leave_room(conn, &room);
            queue(tx, &ServerMessage::RoomLeft { room });
            true
        }
    }
}

fn queue(tx: &UnboundedSender<Message>, message: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = tx.send(Message::Text(text));
    }
}

/// Emit an error frame and close; used before the connection is registered
async fn reject(write: &mut WsWrite, code: &'static str, message: &str) {
    let frame = ServerMessage::error(code, message);
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = write.send(Message::Text(text)).await;
    }
    let _ = write.close().await;
}
