use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use busline_auth::Permission;
use busline_core::BookingId;

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/refunds", get(pending_refunds))
        .route("/bookings/:id/refund", post(refund_booking))
}

pub async fn pending_refunds(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = CmdAuth::new((), Permission::REFUNDS_READ).check(&principal) {
        return resp;
    }

    match services.queries.pending_refunds().await {
        Ok(pending) => (StatusCode::OK, Json(pending)).into_response(),
        Err(e) => errors::booking_error_to_response(e),
    }
}

pub async fn refund_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let booking_id: BookingId = match CmdAuth::new(id, Permission::REFUNDS_PROCESS).check(&principal) {
        Ok(id) => match id.parse() {
            Ok(v) => v,
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid booking id"),
        },
        Err(resp) => return resp,
    };

    match services.lifecycle.refund(principal.actor(), booking_id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "booking_id": outcome.booking.id,
                "reference": outcome.booking.reference,
                "status": outcome.booking.status,
                "payment_status": outcome.booking.payment_status,
                "reconciled": outcome.reconciled,
            })),
        )
            .into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}
