use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{info, warn};
use uuid::Uuid;

use tandem_types::api::Claims;
use tandem_types::events::{ClientCommand, ServerEvent};

use crate::{Gateway, Identity};

/// How long a fresh connection gets to authenticate before being dropped.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection for its whole lifetime.
///
/// The connection is anonymous until the client sends `authenticate`; after
/// that, everything the client does runs under the bound identity. Commands
/// are processed one at a time in arrival order, which is what gives
/// per-sender FIFO delivery.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match wait_for_authenticate(&mut receiver, gateway.jwt_secret()).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to authenticate, closing");
            return;
        }
    };

    info!("{} ({}) connected", identity.username, identity.user_id);

    let ready = ServerEvent::Ready {
        user_id: identity.user_id,
        username: identity.username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Refresh the profile row so history queries resolve this identity.
    // Failure is logged only — it must not block the session.
    {
        let store = gateway.store();
        let id = identity.clone();
        match tokio::task::spawn_blocking(move || {
            store.upsert_profile(id.user_id, &id.username, &id.role)
        })
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("failed to refresh profile for {}: {}", identity.user_id, e),
            Err(e) => warn!("profile refresh task failed: {}", e),
        }
    }

    let (conn_id, mut user_rx) = gateway
        .dispatcher
        .register_user_channel(identity.user_id)
        .await;

    // Send who is already online before announcing ourselves, so the new
    // client converges on presence without polling.
    for (user_id, username) in gateway.presence.snapshot().await {
        if user_id == identity.user_id {
            continue;
        }
        let event = ServerEvent::UserOnline { user_id, username };
        if send_event(&mut sender, &event).await.is_err() {
            teardown(&gateway, &identity, conn_id).await;
            return;
        }
    }

    if gateway
        .presence
        .set_online(identity.user_id, identity.username.clone())
        .await
    {
        gateway
            .dispatcher
            .broadcast(ServerEvent::UserOnline {
                user_id: identity.user_id,
                username: identity.username.clone(),
            })
            .await;
    }

    // Forward targeted events to this client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = user_rx.recv().await {
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    // Read commands from the client, one at a time
    let gateway_recv = gateway.clone();
    let identity_recv = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => handle_command(&gateway_recv, &identity_recv, cmd).await,
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            identity_recv.username, identity_recv.user_id, e, raw
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    teardown(&gateway, &identity, conn_id).await;
    info!("{} ({}) disconnected", identity.username, identity.user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|_| ())?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn wait_for_authenticate(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Identity> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg
                && let Ok(ClientCommand::Authenticate { token }) =
                    serde_json::from_str::<ClientCommand>(&text)
            {
                let token_data = decode::<Claims>(
                    &token,
                    &DecodingKey::from_secret(jwt_secret.as_bytes()),
                    &Validation::default(),
                )
                .ok()?;

                return Some(Identity {
                    user_id: token_data.claims.sub,
                    username: token_data.claims.username,
                    role: token_data.claims.role,
                });
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(gateway: &Gateway, identity: &Identity, cmd: ClientCommand) {
    match cmd {
        // Already bound during the handshake; a repeat is a no-op.
        ClientCommand::Authenticate { .. } => {}

        ClientCommand::JoinRoom { room_id } => {
            gateway.rooms.join(&room_id, identity.user_id).await;
        }

        ClientCommand::LeaveRoom { room_id } => {
            gateway.rooms.leave(&room_id, identity.user_id).await;
        }

        ClientCommand::SendMessage {
            room_id,
            body,
            message_type,
            file,
        } => {
            if let Err(e) = gateway
                .router
                .send(identity, &room_id, body, message_type, file)
                .await
            {
                warn!(
                    "send from {} to room {} failed: {}",
                    identity.username, room_id, e
                );
                // Failure notice goes to the sender only
                gateway
                    .dispatcher
                    .send_to_user(
                        identity.user_id,
                        ServerEvent::MessageError {
                            code: e.code(),
                            message: e.to_string(),
                        },
                    )
                    .await;
            }
        }

        ClientCommand::TypingStart { room_id } => {
            if !gateway.rooms.is_member(&room_id, identity.user_id).await {
                return;
            }
            gateway.typing.started(&room_id, identity.user_id).await;
            gateway
                .fan_out(
                    &room_id,
                    ServerEvent::UserTyping {
                        room_id: room_id.clone(),
                        user_id: identity.user_id,
                        username: identity.username.clone(),
                    },
                    Some(identity.user_id),
                )
                .await;
        }

        ClientCommand::TypingStop { room_id } => {
            if gateway.typing.stopped(&room_id, identity.user_id).await {
                gateway
                    .fan_out(
                        &room_id,
                        ServerEvent::UserStoppedTyping {
                            room_id: room_id.clone(),
                            user_id: identity.user_id,
                        },
                        Some(identity.user_id),
                    )
                    .await;
            }
        }

        ClientCommand::MarkRead { room_id } => {
            let store = gateway.store();
            let user_id = identity.user_id;
            let room = room_id.clone();
            match tokio::task::spawn_blocking(move || {
                store.upsert_read_receipt(&room, user_id, Utc::now())
            })
            .await
            {
                Ok(Ok(())) => {
                    gateway
                        .fan_out(
                            &room_id,
                            ServerEvent::MessagesRead {
                                room_id: room_id.clone(),
                                user_id: identity.user_id,
                            },
                            Some(identity.user_id),
                        )
                        .await;
                }
                Ok(Err(e)) => warn!("read receipt write failed for {}: {}", room_id, e),
                Err(e) => warn!("read receipt task failed: {}", e),
            }
        }

        ClientCommand::Ping => {
            gateway
                .dispatcher
                .send_to_user(identity.user_id, ServerEvent::Pong)
                .await;
        }
    }
}

/// Tear down session state for a closed connection. Guarded by conn_id: a
/// newer connection for the same user owns the session now and must not be
/// disturbed.
async fn teardown(gateway: &Gateway, identity: &Identity, conn_id: Uuid) {
    if !gateway
        .dispatcher
        .is_current(identity.user_id, conn_id)
        .await
    {
        return;
    }

    for room_id in gateway.typing.clear_user(identity.user_id).await {
        gateway
            .fan_out(
                &room_id,
                ServerEvent::UserStoppedTyping {
                    room_id: room_id.clone(),
                    user_id: identity.user_id,
                },
                Some(identity.user_id),
            )
            .await;
    }

    // Membership is session state; the client re-joins after reconnecting
    gateway.rooms.leave_all(identity.user_id).await;

    if gateway.presence.set_offline(identity.user_id).await {
        gateway
            .dispatcher
            .broadcast(ServerEvent::UserOffline {
                user_id: identity.user_id,
            })
            .await;
    }

    gateway
        .dispatcher
        .unregister_user_channel(identity.user_id, conn_id)
        .await;
}
