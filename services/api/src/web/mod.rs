pub mod admin;
pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
use state::AppState;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Builds the API router. Everything except login and logout sits behind `require_auth`.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/session", get(rest::session_handler))
        .route("/session/page", put(rest::change_page_handler))
        .route("/workflows/{kind}", get(rest::workflow_handler))
        .route("/workflows/{kind}/convert", post(rest::convert_handler))
        .route("/workflows/{kind}/proofread", post(rest::proofread_handler))
        .route("/workflows/{kind}/revise", post(rest::revise_handler))
        .route("/workflows/{kind}/clear", post(rest::clear_handler))
        .route(
            "/workflows/{kind}/download/{artifact}",
            get(rest::download_handler),
        )
        .route(
            "/admin/users",
            get(admin::list_users_handler).post(admin::add_user_handler),
        )
        .route("/admin/users/{username}", delete(admin::delete_user_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}
