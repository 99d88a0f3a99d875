use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use busline_auth::Permission;
use busline_core::ScheduleId;

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_schedule))
        .route("/:id/seats", get(seat_map))
        .route("/:id/trips", get(schedule_trips))
}

fn parse_schedule_id(id: &str) -> Result<ScheduleId, axum::response::Response> {
    id.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid schedule id"))
}

pub async fn create_schedule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateScheduleRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let body = match CmdAuth::new(body, Permission::BUSES_REGISTER).check(&principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    match services
        .fleet
        .add_schedule(
            body.bus_id,
            body.route_id,
            body.departure_time,
            body.arrival_time,
            body.base_price,
        )
        .await
    {
        Ok(schedule) => (StatusCode::CREATED, Json(dto::schedule_to_json(&schedule))).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn seat_map(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    query: Result<Query<dto::SeatMapQuery>, QueryRejection>,
) -> axum::response::Response {
    if let Err(resp) = CmdAuth::new((), Permission::SEATS_READ).check(&principal) {
        return resp;
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let schedule_id = match parse_schedule_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.queries.seat_map(schedule_id, query.travel_date).await {
        Ok(map) => (StatusCode::OK, Json(map)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn schedule_trips(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = CmdAuth::new((), Permission::TRIPS_READ).check(&principal) {
        return resp;
    }
    let schedule_id = match parse_schedule_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.queries.trips_for_schedule(schedule_id).await {
        Ok(trips) => (StatusCode::OK, Json(trips)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}
