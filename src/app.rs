use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::docs::ApiDoc;
use crate::models::LearningModule;
use crate::routes::create_api_routes;
use crate::services::{CheckpointService, LearningError, TutorService};
use crate::websocket::handler::websocket_handler;
use crate::ws::registry::RoomRegistry;

/// Everything the request handlers share
pub struct AppState {
    pub config: Config,
    pub registry: Arc<RoomRegistry>,
    pub learning: Arc<CheckpointService>,
    pub tutor: Arc<TutorService>,
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins = config.cors_origin_list();
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}

/// The complete HTTP and WebSocket surface
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state.clone())
        // Mount API routes
        .nest("/api", create_api_routes(state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("could not read modules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("modules file is not a JSON list of modules: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Learning(#[from] LearningError),
}

/// Publish the modules listed in a JSON file. Returns how many were stored.
pub async fn seed_modules(learning: &CheckpointService, path: &str) -> Result<usize, SeedError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let modules: Vec<LearningModule> = serde_json::from_str(&raw)?;
    let count = modules.len();
    for module in modules {
        info!("Seeding module {} ({} checkpoints)", module.module_id, module.checkpoints.len());
        learning.publish_module(module).await?;
    }
    Ok(count)
}
