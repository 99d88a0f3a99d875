use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use busline_auth::AuthzError;
use busline_booking::LifecycleError;
use busline_infra::{BookingError, LifecycleServiceError};

pub fn booking_error_to_response(err: BookingError) -> axum::response::Response {
    let status = match &err {
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingError::Conflict { .. } | BookingError::AlreadyExists(_) => StatusCode::CONFLICT,
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::ReferenceGenerationExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BookingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "booking operation failed");
    }

    let mut body = json!({
        "error": err.kind(),
        "message": err.to_string(),
    });
    if let BookingError::Conflict { seat_ids } = &err {
        body["seat_ids"] = json!(seat_ids);
    }
    (status, axum::Json(body)).into_response()
}

pub fn lifecycle_error_to_response(err: LifecycleServiceError) -> axum::response::Response {
    let deadline = err.deadline();
    let (status, code) = match &err {
        LifecycleServiceError::Lifecycle(e) => match e {
            LifecycleError::CancellationWindowExpired { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CancellationWindowExpired")
            }
            LifecycleError::NotCancellable { .. } => (StatusCode::CONFLICT, "NotCancellable"),
            LifecycleError::NotFoundOrNotCancellable => {
                (StatusCode::NOT_FOUND, "NotFoundOrNotCancellable")
            }
            LifecycleError::Forbidden { .. } => (StatusCode::FORBIDDEN, "Forbidden"),
        },
        LifecycleServiceError::Persistence(msg) => {
            tracing::error!(error = %msg, "lifecycle operation failed");
            (StatusCode::SERVICE_UNAVAILABLE, "PersistenceError")
        }
    };

    let mut body = json!({
        "error": code,
        "message": err.to_string(),
    });
    if let Some(deadline) = deadline {
        body["deadline"] = json!(deadline);
    }
    (status, axum::Json(body)).into_response()
}

/// Malformed JSON bodies (unknown gender, bad dates, missing fields).
pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "ValidationError", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "ValidationError", rejection.body_text())
}

pub fn forbidden(err: AuthzError) -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
