use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::handlers::{diagnostics, health_check, ready_check};
use crate::routes::auth_middleware::auth_middleware;
use crate::AppState;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/v1/health", get(health_check))
        .route("/v1/ready", get(ready_check))
        .merge(guarded)
        .with_state(app_state)
}
