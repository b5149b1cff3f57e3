pub mod access_windows;
pub mod health;
pub mod students;
pub mod telegram;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::middleware::{auth, rate_limit};
use crate::AppState;

/// All HTTP routes with their per-group middleware; global layers are added by the caller.
pub fn app_router(state: AppState, public_rps: u32) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let telegram_api = Router::new()
        .route("/api/telegram/webhook", post(telegram::handle_webhook))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::new(public_rps),
            rate_limit::rps_middleware,
        ));

    let curator_api = Router::new()
        .route(
            "/api/curator/access-windows",
            get(access_windows::list_windows).post(access_windows::create_window),
        )
        .route("/api/curator/access-windows/:id", delete(access_windows::delete_window))
        .layer(axum::middleware::from_fn(auth::require_curator));

    let admin_api = Router::new()
        .route("/api/admin/students/:id/debt", get(students::get_student_debt))
        .layer(axum::middleware::from_fn(auth::require_admin_or_curator));

    base_routes
        .merge(telegram_api)
        .merge(curator_api)
        .merge(admin_api)
        .with_state(state)
}
