pub mod health;
pub mod registration;
pub mod signup;
pub mod stats;
pub mod webhook;

use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::state::AppState;

/// Build the full Axum router.
///
/// `/health` is always public. `/webhook` authenticates via the vendor
/// signature (checked inside the handler itself), and `/signup` is a public
/// redirect meant to be opened directly in a browser, so neither carries the
/// `X-API-Key` middleware. Everything else requires it.
pub fn router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/webhook", post(webhook::webhook))
        .route("/signup", get(signup::signup));

    let protected = Router::new()
        .route("/stats/load", get(stats::stats_load))
        .route("/check_phone", post(registration::check_phone))
        .route("/check_email", post(registration::check_email))
        .route("/create_account", post(registration::create_account))
        .route("/send_email_otp", post(registration::send_email_otp))
        .route("/verify_email", post(registration::verify_email))
        .route("/get_user_info", post(registration::get_user_info))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
}
