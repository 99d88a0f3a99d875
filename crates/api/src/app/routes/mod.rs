use axum::{routing::get, Router};

pub mod admin;
pub mod bookings;
pub mod buses;
pub mod common;
pub mod schedules;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/bookings", bookings::router())
        .nest("/schedules", schedules::router())
        .nest("/buses", buses::router())
        .nest("/routes", buses::routes_router())
        .nest("/admin", admin::router())
}
