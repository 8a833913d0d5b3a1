use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::error;

use crate::services::auth_service::{get_auth_token, get_roles, validate_jwt};
use crate::AppState;

/// Verified caller identity attached to guarded requests
#[derive(Clone, Debug)]
pub struct CallerIdentity {
    pub user_id: String,
    pub roles: Vec<String>,
}

pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(req.headers()) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let secret = match &app_state.config.auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Extract the UID
    let user_id = if let Some(sub) = token_data.claims.get("sub").and_then(|v| v.as_str()) {
        sub.to_string()
    } else {
        error!("JWT token does not contain 'sub' claim");
        return Err(StatusCode::UNAUTHORIZED);
    };

    // 4. Extract the roles and attach the caller identity for downstream
    // handlers
    let roles = get_roles(&token_data);
    req.extensions_mut().insert(CallerIdentity { user_id, roles });

    // Token is valid, proceed to next middleware/handler
    Ok(next.run(req).await)
}
