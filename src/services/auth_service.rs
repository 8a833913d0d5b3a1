use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::info;

// Get the auth token from request headers
pub fn get_auth_token(headers: &HeaderMap) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = headers
            .get(header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
            if cookie.name() == "auth_token" {
                return Ok(cookie.value().to_string());
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Get the verified user id from a JWT token
pub fn get_user_id(token: &str, secret: &str) -> Result<String, String> {
    match validate_jwt(token, secret) {
        // When a valid token is found, get the UID from the sub claim
        Ok(token_data) => {
            if let Some(uid) = token_data.claims.get("sub").and_then(|v| v.as_str()) {
                info!("JWT token validated successfully for user: {}", uid);
                Ok(uid.to_string())
            } else {
                Err("Can't extract a UID from the JWT token".to_string())
            }
        }
        Err(e) => Err(format!("JWT validation failed: {}", e)),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

// Get the roles carried by a JWT token's claims
pub fn get_roles(token_data: &TokenData<serde_json::Value>) -> Vec<String> {
    match token_data.claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles_array) => roles_array
            .iter()
            .filter_map(|r| r.as_str().map(|s| s.to_string()))
            .collect::<Vec<String>>(),
        None => Vec::new(),
    }
}
