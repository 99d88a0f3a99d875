//! Read side: trip listings, seat map, pending refunds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::instrument;

use busline_booking::{
    Booking, BookingPolicy, BookingReference, BookingStatus, Gender, SeatLayout, SeatLayoutCodec,
    SeatNumber, SeatType, Trip, TripBuckets, TripCatalog, group_trips,
};
use busline_core::{BookingId, Clock, ScheduleId, SeatId, UserId};

use crate::error::BookingError;
use crate::retry::RetryPolicy;
use crate::store::{BookingStore, CatalogStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatMapEntry {
    pub seat_id: SeatId,
    pub label: String,
    pub number: SeatNumber,
    pub seat_type: SeatType,
    pub occupied: bool,
    /// Occupant's gender, when occupied.
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatMap {
    pub schedule_id: ScheduleId,
    pub travel_date: NaiveDate,
    pub layout: SeatLayout,
    pub base_price: u64,
    /// Ordered by seat number.
    pub seats: Vec<SeatMapEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRefund {
    pub booking_id: BookingId,
    pub reference: BookingReference,
    pub passenger_id: UserId,
    pub passenger_name: String,
    pub schedule_id: ScheduleId,
    pub travel_date: NaiveDate,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingRefunds {
    /// Newest first.
    pub bookings: Vec<PendingRefund>,
    pub total_amount: u64,
}

pub struct BookingQueries {
    bookings: Arc<dyn BookingStore>,
    catalog: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    retry: RetryPolicy,
}

impl BookingQueries {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        catalog: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            catalog,
            clock,
            policy: BookingPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BookingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A passenger's trips, partitioned into upcoming / past / cancelled.
    #[instrument(skip(self), err)]
    pub async fn trips_for_passenger(&self, passenger_id: UserId) -> Result<TripBuckets, BookingError> {
        let rows = self
            .retry
            .bounded("list_for_passenger", self.bookings.list_for_passenger(passenger_id))
            .await?;
        self.group(rows).await
    }

    /// Every trip booked on one schedule.
    #[instrument(skip(self), err)]
    pub async fn trips_for_schedule(&self, schedule_id: ScheduleId) -> Result<TripBuckets, BookingError> {
        self.retry
            .bounded("schedule", self.catalog.schedule(schedule_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {schedule_id}")))?;
        let rows = self
            .retry
            .bounded("list_for_schedule", self.bookings.list_for_schedule(schedule_id))
            .await?;
        self.group(rows).await
    }

    /// Trips containing the given references.
    ///
    /// `owner` restricts the lookup to one passenger's bookings; `None` sees all.
    #[instrument(skip(self, references), fields(count = references.len()), err)]
    pub async fn lookup(
        &self,
        owner: Option<UserId>,
        references: &[BookingReference],
    ) -> Result<Vec<Trip>, BookingError> {
        let rows: Vec<Booking> = self
            .retry
            .bounded("find_by_references", self.bookings.find_by_references(references))
            .await?
            .into_iter()
            .filter(|b| owner.is_none_or(|id| b.passenger_id == id))
            .collect();
        if rows.is_empty() {
            return Err(BookingError::NotFound("bookings".to_string()));
        }
        Ok(self.group(rows).await?.into_trips())
    }

    /// Seats of a schedule's bus with occupancy on `travel_date`.
    #[instrument(skip(self), err)]
    pub async fn seat_map(
        &self,
        schedule_id: ScheduleId,
        travel_date: NaiveDate,
    ) -> Result<SeatMap, BookingError> {
        let schedule = self
            .retry
            .bounded("schedule", self.catalog.schedule(schedule_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {schedule_id}")))?;
        let bus = self
            .retry
            .bounded("bus", self.catalog.bus(schedule.bus_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("bus {}", schedule.bus_id)))?;
        let seats = self
            .retry
            .bounded("seats_for_bus", self.catalog.seats_for_bus(bus.id))
            .await?;

        let seat_ids: Vec<SeatId> = seats.iter().map(|s| s.id).collect();
        let occupants: HashMap<SeatId, Gender> = self
            .retry
            .bounded("blocking_bookings", self.bookings.blocking_bookings(travel_date, &seat_ids))
            .await?
            .into_iter()
            .map(|b| (b.seat_id, b.gender))
            .collect();

        let codec = SeatLayoutCodec::new(bus.layout, seats.iter().map(|s| s.label));
        let mut entries: Vec<SeatMapEntry> = seats
            .into_iter()
            .map(|seat| {
                let label = seat.label.to_string();
                let gender = occupants.get(&seat.id).copied();
                SeatMapEntry {
                    seat_id: seat.id,
                    number: codec.to_sequential_number(&label),
                    label,
                    seat_type: seat.seat_type,
                    occupied: gender.is_some(),
                    gender,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.number.cmp(&b.number));

        Ok(SeatMap {
            schedule_id,
            travel_date,
            layout: bus.layout,
            base_price: schedule.base_price,
            seats: entries,
        })
    }

    /// Cancelled bookings awaiting an administrator's refund.
    #[instrument(skip(self), err)]
    pub async fn pending_refunds(&self) -> Result<PendingRefunds, BookingError> {
        let rows = self
            .retry
            .bounded("list_by_status", self.bookings.list_by_status(BookingStatus::Cancelled))
            .await?;

        let bookings: Vec<PendingRefund> = rows
            .into_iter()
            .map(|b| PendingRefund {
                booking_id: b.id,
                reference: b.reference,
                passenger_id: b.passenger_id,
                passenger_name: b.passenger_name.to_string(),
                schedule_id: b.schedule_id,
                travel_date: b.travel_date,
                amount: b.amount,
            })
            .collect();
        Ok(PendingRefunds {
            total_amount: bookings.iter().map(|b| b.amount).sum(),
            bookings,
        })
    }

    async fn group(&self, rows: Vec<Booking>) -> Result<TripBuckets, BookingError> {
        let catalog = self.trip_catalog(&rows).await?;
        Ok(group_trips(rows, &catalog, &self.policy, self.clock.now())?)
    }

    /// Load the fleet records every row refers to.
    async fn trip_catalog(&self, rows: &[Booking]) -> Result<TripCatalog, BookingError> {
        let mut catalog = TripCatalog::default();
        let schedule_ids: HashSet<ScheduleId> = rows.iter().map(|b| b.schedule_id).collect();

        for schedule_id in schedule_ids {
            let schedule = self
                .retry
                .bounded("schedule", self.catalog.schedule(schedule_id))
                .await?
                .ok_or_else(|| BookingError::NotFound(format!("schedule {schedule_id}")))?;
            let route = self
                .retry
                .bounded("route", self.catalog.route(schedule.route_id))
                .await?
                .ok_or_else(|| BookingError::NotFound(format!("route {}", schedule.route_id)))?;
            let bus = self
                .retry
                .bounded("bus", self.catalog.bus(schedule.bus_id))
                .await?
                .ok_or_else(|| BookingError::NotFound(format!("bus {}", schedule.bus_id)))?;
            let seats = self
                .retry
                .bounded("seats_for_bus", self.catalog.seats_for_bus(bus.id))
                .await?;
            catalog.insert(schedule, route, bus, &seats);
        }
        Ok(catalog)
    }
}
