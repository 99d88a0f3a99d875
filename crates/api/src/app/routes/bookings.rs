use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use busline_auth::Permission;
use busline_booking::BookingRequest;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_bookings).get(list_bookings))
        .route("/lookup", get(lookup_bookings))
        .route("/cancel", post(cancel_bookings))
}

pub async fn create_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<BookingRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let request = match CmdAuth::new(body, Permission::BOOKINGS_CREATE).check(&principal) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.bookings.create_bookings(principal.user_id(), request).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn list_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = CmdAuth::new((), Permission::BOOKINGS_READ).check(&principal) {
        return resp;
    }

    match services.queries.trips_for_passenger(principal.user_id()).await {
        Ok(trips) => (StatusCode::OK, Json(trips)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn lookup_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::LookupQuery>, QueryRejection>,
) -> axum::response::Response {
    if let Err(resp) = CmdAuth::new((), Permission::BOOKINGS_READ).check(&principal) {
        return resp;
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let references = match dto::parse_references(&query.references) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    // Administrators may look up any group; everyone else only their own.
    let owner = (!principal.is_admin()).then(|| principal.user_id());
    match services.queries.lookup(owner, &references).await {
        Ok(trips) => (StatusCode::OK, Json(serde_json::json!({ "trips": trips }))).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn cancel_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CancelBookingsRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let body = match CmdAuth::new(body, Permission::BOOKINGS_CANCEL).check(&principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if body.references.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "at least one booking reference is required",
        );
    }

    let report = services
        .lifecycle
        .cancel_group(principal.actor(), &body.references)
        .await;
    (StatusCode::OK, Json(report)).into_response()
}
