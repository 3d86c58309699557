//! HTTP API: public account routes, the authentication gate and the
//! rate-limited router around them.

pub mod accounts;
pub mod auth;
mod error;
pub mod rate_limit;
pub mod schema;
mod server;
mod state;

use axum::middleware::from_fn_with_state;
use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use server::HttpServer;
pub use state::AppState;

/// Build the application router.
///
/// `/signin` and `/signup` are public. Every other request, including
/// `/signout`, the supplied `resources` routes and the 404 catch-all, passes
/// the authentication gate first. The rate limiter runs in front of all of it.
pub fn router(state: AppState, resources: Router<AppState>) -> Router {
    let protected = Router::new()
        .route("/signout", post(accounts::signout))
        .merge(resources)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state.clone());

    Router::new()
        .route("/signin", post(accounts::signin))
        .route("/signup", post(accounts::signup))
        .fallback_service(protected)
        .layer(from_fn_with_state(
            state.clone(),
            rate_limit::enforce_rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
