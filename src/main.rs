mod app;
mod clients;
mod config;
mod db;
mod docs;
mod handlers;
mod models;
mod routes;
mod services;
mod utils;
mod websocket;
mod ws;

use std::panic;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use app::AppState;
use clients::{GeminiClient, Tutor, UnconfiguredTutor};
use config::Config;
use db::{DbCoderoom, MemStore, RecordStore};
use services::{CheckpointService, TutorService};
use ws::fanout::{LocalResultBus, PgResultBus, ResultBus};
use ws::registry::RoomRegistry;

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "coderoom_coordinator=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.is_development() {
        info!("Running in development mode ({})", config.service_name);
    }

    // Record store and result channel, both on the database when there is one
    let (store, results): (Arc<dyn RecordStore>, Arc<dyn ResultBus>) = match &config.db_url {
        Some(db_url) => {
            let store = match DbCoderoom::connect(db_url).await {
                Ok(store) => store,
                Err(e) => {
                    error!("Failed to initialize database: {}", e);
                    std::process::exit(1);
                }
            };
            let results = match PgResultBus::connect(db_url).await {
                Ok(results) => results,
                Err(e) => {
                    error!("Failed to listen for execution results: {}", e);
                    std::process::exit(1);
                }
            };
            (Arc::new(store), Arc::new(results))
        }
        None => {
            warn!("No database URL configured - using in-memory records and local result channels");
            (Arc::new(MemStore::new()), Arc::new(LocalResultBus::new()))
        }
    };

    // Tutoring collaborator
    let tutor: Arc<dyn Tutor> = match &config.gemini_api_key {
        Some(key) => match GeminiClient::new(key.clone(), config.gemini_model.clone(), Duration::from_secs(config.tutor_timeout_secs)) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("Failed to build tutor client: {}", e);
                Arc::new(UnconfiguredTutor)
            }
        },
        None => {
            warn!("No GEMINI_API_KEY configured - the AI tutor will answer with a fallback message");
            Arc::new(UnconfiguredTutor)
        }
    };
    let tutor = Arc::new(TutorService::new(tutor));
    let learning = Arc::new(CheckpointService::new(store, tutor.clone()));

    if let Some(path) = &config.modules_file {
        match app::seed_modules(&learning, path).await {
            Ok(count) => info!("Seeded {} learning module(s) from {}", count, path),
            Err(e) => error!("Failed to seed learning modules from {}: {}", path, e),
        }
    }

    let address = config.server_address();
    let state = Arc::new(AppState {
        config,
        registry: Arc::new(RoomRegistry::new(results)),
        learning,
        tutor,
    });
    let app_routes = app::build_router(state);

    // Start the HTTP/API server
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", address, e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    if let Err(e) = axum::serve(listener, app_routes).await {
        error!("Server error: {}", e);
    }
}
