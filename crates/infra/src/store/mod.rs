//! Storage boundary for bookings and the fleet catalog.
//!
//! Both traits are backend-agnostic. The in-memory backend serves tests and
//! local runs; the Postgres backend is behind the `postgres` feature.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use busline_booking::{
    Booking, BookingReference, BookingStatus, Bus, PaymentStatus, RegisteredBus, Route, Schedule,
    Seat,
};
use busline_core::{BookingId, BusId, RouteId, ScheduleId, SeatId, UserId};

use crate::error::StoreError;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::{InMemoryBookingStore, InMemoryCatalogStore};
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert every row of one checkout, or none of them.
    ///
    /// Fails with `SeatConflict` when any (seat, travel date) already has a
    /// blocking booking, and with `DuplicateReference` when a reference is
    /// taken.
    async fn commit_group(&self, bookings: &[Booking]) -> Result<(), StoreError>;

    /// Blocking bookings on `travel_date` for any of `seat_ids`.
    async fn blocking_bookings(
        &self,
        travel_date: NaiveDate,
        seat_ids: &[SeatId],
    ) -> Result<Vec<Booking>, StoreError>;

    /// Every stored reference starting with `prefix`.
    async fn references_with_prefix(&self, prefix: &str)
    -> Result<HashSet<BookingReference>, StoreError>;

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    async fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Booking>, StoreError>;

    async fn find_by_references(
        &self,
        references: &[BookingReference],
    ) -> Result<Vec<Booking>, StoreError>;

    /// Compare-and-set the status of one booking.
    ///
    /// Returns `NotFound` if the booking does not exist or is no longer in
    /// `expected`.
    async fn update_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), StoreError>;

    /// Delete cancelled rows for (seat, date) created before `before`.
    ///
    /// Legacy-data cleanup: the blocking uniqueness rule already keeps a
    /// second cancelled row for the same (seat, date) from being written, so
    /// this only finds rows that predate that rule or were imported around
    /// it. Never touches confirmed or refunded rows. Returns the number removed.
    async fn reconcile_seat(
        &self,
        seat_id: SeatId,
        travel_date: NaiveDate,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn list_for_passenger(&self, passenger_id: UserId) -> Result<Vec<Booking>, StoreError>;

    async fn list_for_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, StoreError>;

    /// Newest first.
    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>, StoreError>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Persist a bus and its full seat set. Bus numbers are unique.
    async fn insert_bus(&self, registered: &RegisteredBus) -> Result<(), StoreError>;

    async fn insert_route(&self, route: &Route) -> Result<(), StoreError>;

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;

    async fn bus(&self, id: BusId) -> Result<Option<Bus>, StoreError>;

    /// Seats of a bus in generation order.
    async fn seats_for_bus(&self, bus_id: BusId) -> Result<Vec<Seat>, StoreError>;

    async fn route(&self, id: RouteId) -> Result<Option<Route>, StoreError>;

    async fn schedule(&self, id: ScheduleId) -> Result<Option<Schedule>, StoreError>;
}
