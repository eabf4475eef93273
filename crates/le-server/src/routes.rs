use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, middleware};
use le_core::{
    AnalyticsRecord, AttentionSample, Fold, LectureId, StartLecture, ViewEvent, WatchDelta,
};
use serde::Serialize;

use crate::auth::{Caller, require_auth};
use crate::response::AppError;
use crate::state::AppState;

/// Mount point of the analytics ingress.
pub const API_PREFIX: &str = "/api/analytics";

pub fn router(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/attention", post(attention))
        .route("/watch", post(watch))
        .route("/view", post(view))
        .route("/start", post(start))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let read = Router::new().route("/lecture/:lecture_id", get(lecture));

    Router::new()
        .route("/health", get(health))
        .nest(API_PREFIX, ingest.merge(read))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn attention(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<AttentionSample>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(sample) = payload?;
    let fold = state.limits().attention(&sample)?;
    apply(&state, &caller, sample.lecture_id, fold).await
}

async fn watch(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<WatchDelta>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(delta) = payload?;
    let fold = state.limits().watch(&delta)?;
    apply(&state, &caller, delta.lecture_id, fold).await
}

async fn view(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ViewEvent>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(view) = payload?;
    apply(&state, &caller, view.lecture_id, Fold::View).await
}

/// Folds one event. The caller is logged but never part of the aggregation key.
async fn apply(
    state: &AppState,
    caller: &Caller,
    lecture_id: LectureId,
    fold: Fold,
) -> Result<StatusCode, AppError> {
    tracing::debug!(caller = %caller.name, lecture_id = %lecture_id, ?fold, "folding event");
    state.fold(lecture_id, fold).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<StartLecture>, JsonRejection>,
) -> Result<Json<AnalyticsRecord>, AppError> {
    let Json(start) = payload?;
    tracing::debug!(caller = %caller.name, lecture_id = %start.lecture_id, "lecture started");
    let record = state.ensure(start.lecture_id).await?;
    Ok(Json(record))
}

async fn lecture(
    State(state): State<AppState>,
    Path(lecture_id): Path<String>,
) -> Result<Json<AnalyticsRecord>, AppError> {
    let lecture_id = LectureId::new(lecture_id)?;
    let record = state.read(lecture_id).await?;
    Ok(Json(record))
}
