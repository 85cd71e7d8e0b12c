use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::future;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::authenticate;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::notify::realtime::PartyEvent;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Real-time channel. Browsers cannot set headers on a WebSocket upgrade, so
/// the token may also come as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = match query.token {
        Some(token) => state.dispatch.authenticate(&token).await?,
        None => authenticate(&state, &headers).await?,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, actor)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, actor: Actor) {
    let (mut sender, mut receiver) = socket.split();
    let room = actor.id.to_string();
    let party_id = actor.id;

    let mut events = BroadcastStream::new(state.realtime.subscribe())
        .filter_map(move |result| future::ready(room_event(result, &room, party_id)));

    info!(party_id = %actor.id, role = %actor.role, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize ride event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(party_id = %actor.id, "websocket client disconnected");
}

/// Keeps only events for `room`. A lagging subscriber loses the overwritten
/// events; the gap is logged and the stream carries on.
fn room_event(
    result: Result<PartyEvent, BroadcastStreamRecvError>,
    room: &str,
    party_id: Uuid,
) -> Option<PartyEvent> {
    match result {
        Ok(event) if event.room == room => Some(event),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(%party_id, skipped, "websocket subscriber lagged; events dropped");
            None
        }
    }
}
