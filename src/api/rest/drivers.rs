use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{authenticate, json_body};
use crate::engine::command::PresenceBody;
use crate::error::AppError;
use crate::models::driver::DriverRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/location", post(update_location))
        .route("/drivers/:id/verification", patch(update_verification))
        .route("/push-token", post(register_push_token))
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub verified: bool,
}

#[derive(Deserialize)]
pub struct PushTokenRequest {
    #[serde(alias = "pushToken")]
    pub push_token: String,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PresenceBody>, JsonRejection>,
) -> Result<Json<DriverRecord>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let update = json_body(payload)?.into_update()?;
    Ok(Json(
        state.dispatch.update_driver_location(&actor, update).await?,
    ))
}

async fn update_verification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<VerificationRequest>, JsonRejection>,
) -> Result<Json<DriverRecord>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let payload = json_body(payload)?;
    Ok(Json(
        state
            .dispatch
            .set_driver_verified(&actor, id, payload.verified)
            .await?,
    ))
}

async fn register_push_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<PushTokenRequest>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let payload = json_body(payload)?;
    state
        .dispatch
        .register_push_token(&actor, &payload.push_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
