//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let rate_limiter = middleware::create_rate_limiter(state.config.rate_limit_rps);

    let router = Router::new()
        // Listing
        .route("/2/files/list_folder", post(handlers::list_folder))
        .route("/2/files/list_folder/continue", post(handlers::list_folder_continue))
        .route("/2/files/list_folder/get_latest_cursor", post(handlers::get_latest_cursor))
        .route("/2/files/list_folder/longpoll", post(handlers::list_folder_longpoll))

        // Single entries
        .route("/2/files/get_metadata", post(handlers::get_metadata))
        .route("/2/files/create_folder_v2", post(handlers::create_folder))
        .route("/2/files/delete_v2", post(handlers::delete))
        .route("/2/files/move_v2", post(handlers::move_entry))
        .route("/2/files/copy_v2", post(handlers::copy_entry))

        // Batches
        .route("/2/files/delete_batch", post(handlers::delete_batch))
        .route("/2/files/delete_batch/check", post(handlers::delete_batch_check))
        .route("/2/files/move_batch_v2", post(handlers::move_batch))
        .route("/2/files/move_batch/check_v2", post(handlers::move_batch_check))
        .route("/2/files/copy_batch_v2", post(handlers::copy_batch))
        .route("/2/files/copy_batch/check_v2", post(handlers::copy_batch_check))

        // Content
        .route("/2/files/upload", post(handlers::upload))
        .route("/2/files/download", post(handlers::download))
        .route("/2/files/upload_session/start", post(handlers::upload_session_start))
        .route("/2/files/upload_session/append_v2", post(handlers::upload_session_append))
        .route("/2/files/upload_session/finish", post(handlers::upload_session_finish))

        // Rate limiting needs the session, so auth wraps it
        .layer(axum_middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::auth_middleware,
        ))

        // Unauthenticated
        .route("/", get(handlers::health_check))

        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware));

    let router = if state.config.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        // Streamed uploads bypass DefaultBodyLimit
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .with_state(state)
}
