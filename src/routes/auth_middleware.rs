use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::services::auth_service::{get_auth_token, user_id_from_claims, validate_jwt};
use crate::AppState;

/// Caller identity established by `auth_middleware`
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(e) => {
            debug!("Rejecting request without token: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 2. Validate Token
    let secret = match &state.config.auth_jwt_secret {
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

    // 3. Extract the user id
    let user_id = user_id_from_claims(&token_data.claims).ok_or_else(|| {
        error!("JWT token contains neither 'userId' nor 'sub' claim");
        StatusCode::UNAUTHORIZED
    })?;

    debug!("Token validated for user {}", user_id);
    req.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(req).await)
}
