use std::panic;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use codepair::config::Config;
use codepair::db::PgRoomStore;
use codepair::docs::ApiDoc;
use codepair::routes::create_api_routes;
use codepair::ws::{spawn_cursor_sweep, websocket_handler};
use codepair::AppState;

#[tokio::main(flavor = "current_thread")]
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
            "codepair=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // The durable room store is not optional: admission decisions depend on
    // the room records it holds.
    let Some(db_url) = config.db_url.clone() else {
        error!("No database URL configured - cannot serve rooms without the durable store");
        std::process::exit(1);
    };

    if config.auth_jwt_secret.is_none() {
        warn!("No auth JWT secret configured - every connection will be refused");
    }

    let store = match PgRoomStore::new(&db_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = AppState::new(config.clone(), store);

    // Periodic cursor staleness sweep
    let _sweep = spawn_cursor_sweep(
        Arc::clone(&app_state.coordinator),
        Duration::from_secs(config.cursor_sweep_interval_secs),
        Duration::from_secs(config.cursor_stale_timeout_secs),
    );

    // CORS policy from configuration
    let cors = match &config.cors_origins {
        Some(origins) => {
            let list: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(list)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    // Create API routes
    let api_routes = create_api_routes(app_state.clone());

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", api_routes)
        // Mount the realtime socket endpoint
        .route("/ws", get(websocket_handler).with_state(app_state.clone()))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
