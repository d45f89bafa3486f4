use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::ClientHandle;
use crate::hub::Hub;
use crate::protocol::{ClientMessage, ServerMessage};

/// Accepts a WebSocket upgrade for a connection already authenticated by an
/// admission ticket (§4.9 Trust Boundary: the Hub itself never authenticates,
/// it only validates the single-use ticket minted by the `Authenticator`).
///
/// `inbound` carries every parsed client message up to the orchestrator,
/// tagged with the user id the ticket resolved to.
pub async fn accept(
    ws: WebSocketUpgrade,
    hub: Arc<Hub>,
    ticket: String,
    inbound: mpsc::Sender<(i64, ClientMessage)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, ticket, inbound))
}

async fn handle_socket(
    socket: WebSocket,
    hub: Arc<Hub>,
    ticket: String,
    inbound: mpsc::Sender<(i64, ClientMessage)>,
) {
    let claims = match hub.tickets.consume(&ticket, Utc::now()).await {
        Some(claims) => claims,
        None => {
            let _ = socket
                .close()
                .await;
            return;
        }
    };

    let now_ms = Utc::now().timestamp_millis();
    let (handle, outbound_rx, control_rx) = hub
        .register_client(claims.user_id, claims.device_id.clone(), now_ms)
        .await;

    debug!(user_id = claims.user_id, device_id = %claims.device_id, "client connected");

    let write_deadline = Duration::from_secs(hub.write_deadline_secs());
    let (sender, receiver) = socket.split();
    let send_task = tokio::spawn(run_writer(sender, outbound_rx, control_rx, hub.clone(), handle.clone(), write_deadline));
    let recv_task = tokio::spawn(run_reader(receiver, handle.clone(), inbound));

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    hub.unregister_client(claims.user_id).await;
    debug!(user_id = claims.user_id, "client disconnected");
}

/// Forwards outbound business messages and reacts to forced-close signals.
/// A close signal always wins the race even if the outbound queue is
/// backed up, since it arrives on its own unbounded channel. Every socket
/// write is bounded by `write_deadline` (§5: "client-socket writes use a
/// short deadline") — a write that blows the deadline is treated exactly
/// like a full outbound queue: a shard error counter tick plus a requested
/// close, and the writer gives up on this connection.
async fn run_writer(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
    mut control_rx: mpsc::UnboundedReceiver<crate::client::CloseSignal>,
    hub: Arc<Hub>,
    handle: ClientHandle,
    write_deadline: Duration,
) {
    loop {
        tokio::select! {
            biased;
            signal = control_rx.recv() => {
                let (code, reason) = match signal {
                    Some(s) => (s.code, s.reason),
                    None => (1000, "hub_shutdown"),
                };
                let frame = axum::extract::ws::CloseFrame {
                    code,
                    reason: reason.into(),
                };
                if tokio::time::timeout(write_deadline, sender.send(Message::Close(Some(frame)))).await.is_err() {
                    warn!(user_id = handle.user_id, "close frame write exceeded write deadline");
                }
                return;
            }
            msg = outbound_rx.recv() => {
                match msg {
                    Some(msg) => {
                        let text = match serde_json::to_string(&msg) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(error = %e, "failed to encode outbound message");
                                continue;
                            }
                        };
                        match tokio::time::timeout(write_deadline, sender.send(Message::Text(text.into()))).await {
                            Ok(Ok(())) => {}
                            Ok(Err(_)) => return,
                            Err(_) => {
                                warn!(user_id = handle.user_id, "socket write exceeded write deadline");
                                hub.note_write_timeout(handle.user_id).await;
                                return;
                            }
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

/// Parses inbound frames and forwards them to the orchestrator. Unparseable
/// frames are logged and dropped rather than closing the connection --
/// a single malformed frame from a buggy client build shouldn't drop them.
async fn run_reader(
    mut receiver: futures::stream::SplitStream<WebSocket>,
    handle: ClientHandle,
    inbound: mpsc::Sender<(i64, ClientMessage)>,
) {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                handle.touch(Utc::now().timestamp_millis());
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ready { quiz_id }) => {
                        handle.set_current_quiz(quiz_id);
                        let _ = inbound.send((handle.user_id, ClientMessage::Ready { quiz_id })).await;
                    }
                    Ok(ClientMessage::Resync { quiz_id }) => {
                        handle.set_current_quiz(quiz_id);
                        let _ = inbound.send((handle.user_id, ClientMessage::Resync { quiz_id })).await;
                    }
                    Ok(parsed) => {
                        let _ = inbound.send((handle.user_id, parsed)).await;
                    }
                    Err(e) => {
                        warn!(user_id = handle.user_id, error = %e, "dropping unparseable client frame");
                    }
                }
            }
            Message::Ping(_) | Message::Pong(_) => {
                handle.touch(Utc::now().timestamp_millis());
            }
            Message::Close(_) => break,
            Message::Binary(_) => {}
        }
    }
}
