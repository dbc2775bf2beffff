use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::handlers::error_response;
use crate::models::{
    ErrorResponse, ExplanationRequest, ExplanationResponse, LearningStateResponse, ModuleListResponse, MoveRequest,
    ProgressResponse, ReflectionRequest, RoomPointerResponse, RoomRecord, StartModuleRequest,
};
use crate::routes::auth_middleware::AuthUser;
use crate::services::LearningError;
use crate::websocket::msg_learning_handler::notify_checkpoint;
use crate::AppState;

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorResponse>)>;

fn learning_error(e: LearningError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        LearningError::NotFound(_) => StatusCode::NOT_FOUND,
        LearningError::RejectedPrecondition(_) => StatusCode::CONFLICT,
        LearningError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        LearningError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Learning request failed: {}", e);
    } else {
        warn!("Learning request refused: {}", e);
    }
    error_response(status, e.to_string())
}

/// Empty or absent bodies are allowed on the move routes.
fn move_request(body: Option<Json<MoveRequest>>) -> MoveRequest {
    body.map(|Json(req)| req).unwrap_or_default()
}

fn announce(state: &AppState, room: &RoomRecord) {
    if let Some(module_id) = room.module_id.as_deref() {
        notify_checkpoint(&state.registry, &room.room_id, module_id, room.current_checkpoint_index);
    }
}

pub async fn list_modules(State(state): State<Arc<AppState>>) -> ApiResult<ModuleListResponse> {
    let modules = state.learning.list_modules().await.map_err(learning_error)?;
    Ok((StatusCode::OK, Json(ModuleListResponse { modules })))
}

pub async fn start_module(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<StartModuleRequest>,
) -> ApiResult<LearningStateResponse> {
    let response = state
        .learning
        .start_module(&req.room_id, &req.module_id, &user.user_id)
        .await
        .map_err(learning_error)?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn room_state(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
) -> ApiResult<LearningStateResponse> {
    let response = state.learning.state(&room_id, &user.user_id).await.map_err(learning_error)?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn next_checkpoint(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    body: Option<Json<MoveRequest>>,
) -> ApiResult<RoomPointerResponse> {
    let req = move_request(body);
    let room = state
        .learning
        .next(&room_id, &user.user_id, req.from_index)
        .await
        .map_err(learning_error)?;
    announce(&state, &room);
    Ok((StatusCode::OK, Json(RoomPointerResponse { room })))
}

pub async fn previous_checkpoint(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(room_id): Path<String>,
    body: Option<Json<MoveRequest>>,
) -> ApiResult<RoomPointerResponse> {
    let req = move_request(body);
    let room = state
        .learning
        .previous(&room_id, &user.user_id, req.from_index)
        .await
        .map_err(learning_error)?;
    announce(&state, &room);
    Ok((StatusCode::OK, Json(RoomPointerResponse { room })))
}

pub async fn complete_checkpoint(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((room_id, checkpoint_id)): Path<(String, String)>,
) -> ApiResult<ProgressResponse> {
    let progress = state
        .learning
        .complete(&room_id, &checkpoint_id, &user.user_id)
        .await
        .map_err(learning_error)?;
    Ok((StatusCode::OK, Json(ProgressResponse { progress })))
}

pub async fn explain_checkpoint(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((room_id, checkpoint_id)): Path<(String, String)>,
    Json(req): Json<ExplanationRequest>,
) -> ApiResult<ExplanationResponse> {
    let response = state
        .learning
        .submit_explanation(&room_id, &checkpoint_id, &user.user_id, &req.explanation)
        .await
        .map_err(learning_error)?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn reflect_checkpoint(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((room_id, checkpoint_id)): Path<(String, String)>,
    Json(req): Json<ReflectionRequest>,
) -> ApiResult<ProgressResponse> {
    let progress = state
        .learning
        .reflect(&room_id, &checkpoint_id, &user.user_id, &req.reflection)
        .await
        .map_err(learning_error)?;
    Ok((StatusCode::OK, Json(ProgressResponse { progress })))
}
