use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::{authenticate, json_body};
use crate::engine::command::{CancelBody, RatingBody, RideRequestBody, StatusChangeBody};
use crate::engine::coordinator::RideHistoryPage;
use crate::engine::matching::MatchOutcome;
use crate::error::AppError;
use crate::models::ride::Ride;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(request_ride))
        .route("/rides/active", get(active_rides))
        .route("/rides/history/:user_id", get(ride_history))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride))
        .route("/rides/:id/status", patch(update_ride_status))
        .route("/rides/:id/cancel", post(cancel_ride))
        .route("/rides/:id/rating", post(rate_ride))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

async fn request_ride(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<RideRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<MatchOutcome>), AppError> {
    let actor = authenticate(&state, &headers).await?;
    let request = json_body(payload)?.into_request()?;

    let outcome = state.dispatch.request_ride(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn active_rides(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Ride>>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    Ok(Json(state.dispatch.active_rides(&actor).await?))
}

async fn ride_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<RideHistoryPage>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let page = state
        .dispatch
        .ride_history(&actor, user_id, query.page, query.limit)
        .await?;
    Ok(Json(page))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    Ok(Json(state.dispatch.get_ride(&actor, id).await?))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    Ok(Json(state.dispatch.accept_ride(&actor, id).await?))
}

async fn update_ride_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusChangeBody>, JsonRejection>,
) -> Result<Json<Ride>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let change = json_body(payload)?.into_change()?;
    Ok(Json(
        state.dispatch.update_ride_status(&actor, id, change).await?,
    ))
}

async fn cancel_ride(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Ride>, AppError> {
    let actor = authenticate(&state, &headers).await?;

    // The body is optional here, so it is decoded by hand instead of `Json`.
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        CancelBody::default()
    } else {
        serde_json::from_slice::<CancelBody>(&body)
            .map_err(|err| AppError::Validation(format!("invalid JSON body: {err}")))?
    };
    let reason = body.into_reason()?;

    Ok(Json(state.dispatch.cancel_ride(&actor, id, reason).await?))
}

async fn rate_ride(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<RatingBody>, JsonRejection>,
) -> Result<Json<Ride>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let rating = json_body(payload)?.into_command()?;
    Ok(Json(state.dispatch.rate_ride(&actor, id, rating).await?))
}
