//! HTTP middleware for authentication, rate limiting, etc.

use crate::auth::{claims_to_session, dev_session, extract_bearer_token, validate_token};
use crate::state::UserSession;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use governor::{state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Header carrying the request id back to the client
pub const REQUEST_ID_HEADER: &str = "x-dropbox-request-id";

/// Rate limiter type
pub type KeyedRateLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

/// Create a rate limiter
pub fn create_rate_limiter(requests_per_second: u32) -> Arc<KeyedRateLimiter> {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_second(rps)))
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // Skip auth if disabled
    if !state.config.auth_enabled {
        request.extensions_mut().insert(dev_session());
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("invalid_access_token", "Authentication required"))?;
    let token = extract_bearer_token(header).ok_or_else(|| {
        ApiError::unauthorized("invalid_access_token", "Invalid Authorization header format")
    })?;
    let secret = state
        .config
        .jwt_secret
        .as_ref()
        .ok_or_else(|| ApiError::Internal("JWT secret not configured".into()))?;

    let session = claims_to_session(validate_token(token, secret)?);
    if session.is_expired() {
        return Err(ApiError::unauthorized("expired_access_token", "Token has expired"));
    }

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // Session is present once the auth layer ran
    let user_id = request
        .extensions()
        .get::<UserSession>()
        .map(|s| s.user_id.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    if limiter.check_key(&user_id).is_err() {
        return Err(ApiError::RateLimited { retry_after: 1 });
    }

    Ok(next.run(request).await)
}

/// Request ID middleware - adds the request id header
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request ID extension
#[derive(Clone)]
pub struct RequestId(pub String);

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request.extensions().get::<RequestId>().map(|r| r.0.clone());
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = request_id.as_deref().unwrap_or("-"),
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "Request completed"
    );

    response
}
