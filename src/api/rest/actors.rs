use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::json_body;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::state::AppState;

/// Development identity issuance, standing in for the external
/// authentication service. Admin credentials are provisioned at start-up,
/// never issued here.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/actors", post(create_actor))
}

#[derive(Deserialize)]
pub struct CreateActorRequest {
    pub role: Role,
    #[serde(default, alias = "pushToken")]
    pub push_token: Option<String>,
}

#[derive(Serialize)]
pub struct CreateActorResponse {
    pub actor: Actor,
    pub token: String,
}

async fn create_actor(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateActorRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateActorResponse>), AppError> {
    let payload = json_body(payload)?;
    if payload.role == Role::Admin {
        return Err(AppError::Unauthorized(
            "admin accounts cannot be self-issued".to_string(),
        ));
    }

    let actor = Actor::new(Uuid::new_v4(), payload.role);
    state.dispatch.enroll(&actor, payload.push_token).await?;
    let token = state.directory.issue(actor);

    Ok((StatusCode::CREATED, Json(CreateActorResponse { actor, token })))
}
