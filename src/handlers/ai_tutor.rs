use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::warn;

use crate::handlers::error_response;
use crate::models::{ErrorResponse, TutorRequest, TutorResponse};
use crate::AppState;

/// Ask the tutor about the room's code. Tutor failures still answer 200
/// with a fallback text.
pub async fn ai_tutor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TutorRequest>,
) -> Result<(StatusCode, Json<TutorResponse>), (StatusCode, Json<ErrorResponse>)> {
    if req.user_query.trim().is_empty() || req.language.trim().is_empty() || req.code.trim().is_empty() {
        warn!("Tutor request without query, language or code");
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: userQuery, language, or code.".to_string(),
        ));
    }

    let ai_response_text = state.tutor.ask(&req).await;
    Ok((StatusCode::OK, Json(TutorResponse { ai_response_text })))
}
