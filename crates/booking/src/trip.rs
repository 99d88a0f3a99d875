//! Read-side reconstruction of multi-seat trips.
//!
//! Rows written by one checkout share a `batch_id`; a trip is exactly the set
//! of rows with the same batch. Trips are then bucketed by the lifecycle's
//! time classification and their own status.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use busline_core::{BatchId, BookingId, BusId, DomainError, DomainResult, ScheduleId, SeatId};

use crate::booking::{Booking, BookingStatus, Gender, PaymentStatus};
use crate::codec::{SeatNumber, SeatLayoutCodec};
use crate::fleet::{Bus, Route, Schedule, Seat};
use crate::layout::SeatType;
use crate::lifecycle::{BookingPolicy, TripTiming};
use crate::reference::BookingReference;

/// Trip metadata shared by every member row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDetails {
    pub schedule_id: ScheduleId,
    pub travel_date: NaiveDate,
    pub route_name: String,
    pub origin: String,
    pub destination: String,
    pub bus_id: BusId,
    pub bus_name: String,
    pub bus_number: String,
    pub departure_time: NaiveTime,
    pub arrival_time: Option<NaiveTime>,
    pub departure_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripPassenger {
    pub booking_id: BookingId,
    pub reference: BookingReference,
    pub name: String,
    pub gender: Gender,
    pub seat_id: SeatId,
    pub seat_label: Option<String>,
    pub seat_number: SeatNumber,
    pub seat_type: Option<SeatType>,
    pub amount: u64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Upcoming,
    Past,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub batch_id: BatchId,
    pub status: TripStatus,
    pub details: TripDetails,
    /// Ordered by seat number.
    pub passengers: Vec<TripPassenger>,
    pub total_amount: u64,
    pub references: Vec<BookingReference>,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripBuckets {
    /// Soonest first.
    pub upcoming: Vec<Trip>,
    /// Most recent first.
    pub past: Vec<Trip>,
    /// Most recently booked first.
    pub cancelled: Vec<Trip>,
}

impl TripBuckets {
    pub fn len(&self) -> usize {
        self.upcoming.len() + self.past.len() + self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_trips(self) -> Vec<Trip> {
        let mut all = self.upcoming;
        all.extend(self.past);
        all.extend(self.cancelled);
        all
    }
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    schedule: Schedule,
    route: Route,
    bus: Bus,
}

#[derive(Debug, Clone)]
struct SeatEntry {
    label: String,
    number: SeatNumber,
    seat_type: SeatType,
}

/// Fleet lookups needed to render trips, loaded up front by the caller.
#[derive(Debug, Clone, Default)]
pub struct TripCatalog {
    schedules: HashMap<ScheduleId, ScheduleEntry>,
    seats: HashMap<SeatId, SeatEntry>,
}

impl TripCatalog {
    /// Register a schedule together with its route, bus and the bus's seats.
    pub fn insert(&mut self, schedule: Schedule, route: Route, bus: Bus, seats: &[Seat]) {
        let codec = SeatLayoutCodec::new(bus.layout, seats.iter().map(|s| s.label));
        for seat in seats {
            let label = seat.label.to_string();
            self.seats.insert(
                seat.id,
                SeatEntry {
                    number: codec.to_sequential_number(&label),
                    label,
                    seat_type: seat.seat_type,
                },
            );
        }
        self.schedules.insert(
            schedule.id,
            ScheduleEntry {
                schedule,
                route,
                bus,
            },
        );
    }

    pub fn contains_schedule(&self, schedule_id: ScheduleId) -> bool {
        self.schedules.contains_key(&schedule_id)
    }

    fn details(
        &self,
        schedule_id: ScheduleId,
        travel_date: NaiveDate,
        policy: &BookingPolicy,
    ) -> DomainResult<TripDetails> {
        let entry = self
            .schedules
            .get(&schedule_id)
            .ok_or_else(|| DomainError::not_found(format!("schedule {schedule_id}")))?;
        Ok(TripDetails {
            schedule_id,
            travel_date,
            route_name: entry.route.name.clone(),
            origin: entry.route.origin.clone(),
            destination: entry.route.destination.clone(),
            bus_id: entry.bus.id,
            bus_name: entry.bus.name.clone(),
            bus_number: entry.bus.bus_number.clone(),
            departure_time: entry.schedule.departure_time,
            arrival_time: entry.schedule.arrival_time,
            departure_at: policy.departure_at(travel_date, entry.schedule.departure_time),
        })
    }

    fn passenger(&self, booking: &Booking) -> TripPassenger {
        let seat = self.seats.get(&booking.seat_id);
        TripPassenger {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            name: booking.passenger_name.to_string(),
            gender: booking.gender,
            seat_id: booking.seat_id,
            seat_label: seat.map(|s| s.label.clone()),
            seat_number: seat
                .map(|s| s.number.clone())
                .unwrap_or_else(|| SeatNumber::Raw(booking.seat_id.to_string())),
            seat_type: seat.map(|s| s.seat_type),
            amount: booking.amount,
            status: booking.status,
            payment_status: booking.payment_status,
        }
    }
}

/// Group flat booking rows into trips and partition them.
///
/// Every row's schedule must be present in `catalog`.
pub fn group_trips(
    bookings: impl IntoIterator<Item = Booking>,
    catalog: &TripCatalog,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> DomainResult<TripBuckets> {
    let mut batches: BTreeMap<BatchId, Vec<Booking>> = BTreeMap::new();
    for booking in bookings {
        batches.entry(booking.batch_id).or_default().push(booking);
    }

    let mut buckets = TripBuckets::default();
    for (batch_id, rows) in batches {
        let trip = build_trip(batch_id, rows, catalog, policy, now)?;
        match trip.status {
            TripStatus::Upcoming => buckets.upcoming.push(trip),
            TripStatus::Past => buckets.past.push(trip),
            TripStatus::Cancelled => buckets.cancelled.push(trip),
        }
    }

    buckets
        .upcoming
        .sort_by(|a, b| a.details.departure_at.cmp(&b.details.departure_at));
    buckets
        .past
        .sort_by(|a, b| b.details.departure_at.cmp(&a.details.departure_at));
    buckets.cancelled.sort_by(|a, b| b.booked_at.cmp(&a.booked_at));
    Ok(buckets)
}

fn build_trip(
    batch_id: BatchId,
    rows: Vec<Booking>,
    catalog: &TripCatalog,
    policy: &BookingPolicy,
    now: DateTime<Utc>,
) -> DomainResult<Trip> {
    let first = rows
        .first()
        .ok_or_else(|| DomainError::invariant(format!("trip {batch_id} has no bookings")))?;
    let details = catalog.details(first.schedule_id, first.travel_date, policy)?;
    let booked_at = rows.iter().map(|b| b.created_at).min().unwrap_or(first.created_at);

    let any_confirmed = rows.iter().any(|b| b.status == BookingStatus::Confirmed);
    let status = if !any_confirmed {
        TripStatus::Cancelled
    } else {
        match policy.timing(details.travel_date, details.departure_time, now) {
            TripTiming::Upcoming => TripStatus::Upcoming,
            TripTiming::Completed => TripStatus::Past,
        }
    };

    let mut passengers: Vec<TripPassenger> = rows.iter().map(|b| catalog.passenger(b)).collect();
    passengers.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));

    Ok(Trip {
        batch_id,
        status,
        total_amount: passengers.iter().map(|p| p.amount).sum(),
        references: passengers.iter().map(|p| p.reference.clone()).collect(),
        passengers,
        details,
        booked_at,
    })
}
