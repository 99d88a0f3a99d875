use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use busline_auth::Permission;
use busline_booking::{RegisterBus, SeatLayout};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", post(register_bus))
}

pub fn routes_router() -> Router {
    Router::new().route("/", post(create_route))
}

pub async fn register_bus(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::RegisterBusRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let body = match CmdAuth::new(body, Permission::BUSES_REGISTER).check(&principal) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let layout: SeatLayout = match body.layout.parse() {
        Ok(l) => l,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "ValidationError", format!("{e}")),
    };

    let request = RegisterBus {
        operator_id: principal.user_id(),
        bus_number: body.bus_number,
        name: body.name,
        layout,
        total_seats: body.total_seats,
    };
    match services.fleet.register_bus(request).await {
        Ok(registered) => {
            (StatusCode::CREATED, Json(dto::registered_bus_to_json(&registered))).into_response()
        }
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn create_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateRouteRequest>, JsonRejection>,
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
        .add_route(&body.name, &body.origin, &body.destination)
        .await
    {
        Ok(route) => (StatusCode::CREATED, Json(dto::route_to_json(&route))).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}
