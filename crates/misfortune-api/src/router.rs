//! Axum router construction for the API server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS restricted to the known frontends and request tracing
//! enabled.

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the API server.
///
/// See [`handlers`] for the REST surface and [`ws`] for the wheel
/// client endpoint.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("https://bembel.party"),
            HeaderValue::from_static("https://wheel.bembel.party"),
            HeaderValue::from_static("http://localhost:8080"),
        ]))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/probe/live", get(handlers::liveness))
        // WebSocket
        .route("/ws", get(ws::connect_ws))
        // Bot API
        .route(
            "/user/{user_id}/wheel",
            get(handlers::list_wheels).post(handlers::create_wheel),
        )
        .route(
            "/user/{user_id}/wheel/{wheel_id}",
            get(handlers::get_wheel_state).delete(handlers::delete_wheel),
        )
        .route(
            "/user/{user_id}/wheel/{wheel_id}/name",
            patch(handlers::update_wheel_name),
        )
        .route(
            "/user/{user_id}/wheel/{wheel_id}/registration",
            post(handlers::confirm_registration),
        )
        .route(
            "/user/{user_id}/wheel/{wheel_id}/drink",
            post(handlers::add_drink),
        )
        .route(
            "/user/{user_id}/wheel/{wheel_id}/drink/{drink_id}",
            delete(handlers::delete_drink),
        )
        // Wheel client API
        .route("/wheel/{wheel_id}/is_locked", post(handlers::spin))
        .route("/wheel/is_locked", delete(handlers::unlock))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
