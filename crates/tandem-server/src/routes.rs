use axum::{
    Extension, Json,
    extract::{Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use tandem_types::api::Claims;
use tandem_types::models::{ChatMessage, FileDescriptor, MessageType};

use crate::ServerState;

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let secret =
        std::env::var("TANDEM_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Message history for a room, newest first. Real-time delivery happens over
/// the WebSocket; clients hit this after connect (and reconnect) to backfill
/// anything they missed.
pub async fn get_history(
    State(state): State<ServerState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    // Run the blocking DB query off the async runtime
    let db = state.db.clone();
    let limit = query.limit.min(200);

    let rows = tokio::task::spawn_blocking(move || db.get_messages(&room_id, limit))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<ChatMessage> = rows
        .into_iter()
        .map(|row| {
            let message_type = match row.message_type.as_str() {
                "text" => MessageType::Text,
                "file" => MessageType::File,
                "system" => MessageType::System,
                other => {
                    warn!("Unknown message type '{}' on message '{}'", other, row.id);
                    MessageType::Text
                }
            };

            let file = row.file_url.as_ref().map(|url| FileDescriptor {
                url: url.clone(),
                name: row.file_name.clone().unwrap_or_default(),
                size: row.file_size.unwrap_or(0),
            });

            ChatMessage {
                id: row.id.parse().unwrap_or_else(|e| {
                    warn!("Corrupt message id '{}': {}", row.id, e);
                    Uuid::default()
                }),
                room_id: row.room_id.clone(),
                sender_id: row.sender_id.parse().unwrap_or_else(|e| {
                    warn!("Corrupt sender_id '{}' on message '{}': {}", row.sender_id, row.id, e);
                    Uuid::default()
                }),
                sender_name: row.sender_name,
                sender_role: row.sender_role,
                message_type,
                body: row.body,
                file,
                created_at: row
                    .created_at
                    .parse::<chrono::DateTime<chrono::Utc>>()
                    .or_else(|_| {
                        // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
                        // Parse as naive UTC and convert.
                        chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S")
                            .map(|ndt| ndt.and_utc())
                    })
                    .unwrap_or_else(|e| {
                        warn!("Corrupt created_at '{}' on message '{}': {}", row.created_at, row.id, e);
                        chrono::DateTime::default()
                    }),
                edited: row.edited,
            }
        })
        .collect();

    Ok(Json(messages))
}
