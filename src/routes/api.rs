use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{
    ai_tutor, complete_checkpoint, diagnostics, explain_checkpoint, health_check, list_modules, next_checkpoint,
    previous_checkpoint, ready_check, reflect_checkpoint, room_state, start_module,
};
use crate::routes::auth_middleware::auth_middleware;
use crate::AppState;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    let learning = Router::new()
        .route("/modules", get(list_modules))
        .route("/room/create", post(start_module))
        .route("/room/:room_id/state", get(room_state))
        .route("/room/:room_id/next", post(next_checkpoint))
        .route("/room/:room_id/previous", post(previous_checkpoint))
        .route("/room/:room_id/checkpoints/:checkpoint_id/complete", post(complete_checkpoint))
        .route("/room/:room_id/checkpoints/:checkpoint_id/explain", post(explain_checkpoint))
        .route("/room/:room_id/checkpoints/:checkpoint_id/reflect", post(reflect_checkpoint));

    let protected = Router::new()
        .route("/v1/diagnostics", get(diagnostics))
        .nest("/learning", learning)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)); // Applies to all routes added above

    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/ai-tutor", post(ai_tutor))
        .merge(protected)
        .with_state(state)
}
