use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use busline_booking::{BookingReference, RegisteredBus, Route, Schedule};
use busline_core::{BusId, RouteId};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CancelBookingsRequest {
    pub references: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    /// Comma-separated booking references.
    pub references: String,
}

#[derive(Debug, Deserialize)]
pub struct SeatMapQuery {
    pub travel_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBusRequest {
    pub bus_number: String,
    pub name: String,
    /// `"2x2"` or `"2x3"`.
    pub layout: String,
    pub total_seats: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub name: String,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub bus_id: BusId,
    pub route_id: RouteId,
    pub departure_time: NaiveTime,
    pub arrival_time: Option<NaiveTime>,
    pub base_price: u64,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_references(raw: &str) -> Result<Vec<BookingReference>, axum::response::Response> {
    let mut references = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<BookingReference>() {
            Ok(r) if !references.contains(&r) => references.push(r),
            Ok(_) => {}
            Err(e) => {
                return Err(errors::json_error(
                    axum::http::StatusCode::BAD_REQUEST,
                    "ValidationError",
                    e.to_string(),
                ));
            }
        }
    }
    if references.is_empty() {
        return Err(errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "ValidationError",
            "at least one booking reference is required",
        ));
    }
    Ok(references)
}

// -------------------------
// Response mapping
// -------------------------

pub fn registered_bus_to_json(registered: &RegisteredBus) -> serde_json::Value {
    let bus = &registered.bus;
    serde_json::json!({
        "id": bus.id,
        "operator_id": bus.operator_id,
        "bus_number": bus.bus_number,
        "name": bus.name,
        "layout": bus.layout.to_string(),
        "total_seats": bus.total_seats,
        "seats": registered.seats.iter().map(|s| serde_json::json!({
            "id": s.id,
            "label": s.label.to_string(),
            "seat_type": s.seat_type,
        })).collect::<Vec<_>>(),
    })
}

pub fn route_to_json(route: &Route) -> serde_json::Value {
    serde_json::json!(route)
}

pub fn schedule_to_json(schedule: &Schedule) -> serde_json::Value {
    serde_json::json!(schedule)
}
