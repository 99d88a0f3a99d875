use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use busline_booking::{
    Booking, BookingReference, BookingStatus, Bus, PaymentStatus, RegisteredBus, Route, Schedule,
    Seat,
};
use busline_core::{BookingId, BusId, RouteId, ScheduleId, SeatId, UserId};

use super::{BookingStore, CatalogStore};
use crate::error::StoreError;

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory booking store.
///
/// Check-and-insert happens under a single write lock, which gives the same
/// guarantee as the partial unique index of the Postgres schema.
#[derive(Debug, Default)]
pub struct InMemoryBookingStore {
    rows: RwLock<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, mut keep: F) -> Result<Vec<Booking>, StoreError>
    where
        F: FnMut(&Booking) -> bool,
    {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut out: Vec<Booking> = rows.values().filter(|b| keep(b)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.reference.cmp(&b.reference)));
        Ok(out)
    }

    /// Insert a row without any uniqueness checks.
    #[cfg(test)]
    pub(crate) fn insert_unchecked(&self, booking: Booking) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert(booking.id, booking);
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn commit_group(&self, bookings: &[Booking]) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        let held: HashSet<(SeatId, NaiveDate)> = rows
            .values()
            .filter(|b| b.is_blocking())
            .map(|b| (b.seat_id, b.travel_date))
            .collect();
        let taken_refs: HashSet<&BookingReference> = rows.values().map(|b| &b.reference).collect();

        let mut conflicts = Vec::new();
        let mut in_group = HashSet::new();
        let mut refs_in_group = HashSet::new();
        for b in bookings {
            let key = (b.seat_id, b.travel_date);
            if held.contains(&key) || !in_group.insert(key) {
                conflicts.push(b.seat_id);
            }
            if taken_refs.contains(&b.reference) || !refs_in_group.insert(&b.reference) {
                return Err(StoreError::DuplicateReference(b.reference.to_string()));
            }
        }
        if !conflicts.is_empty() {
            return Err(StoreError::SeatConflict { seat_ids: conflicts });
        }

        for b in bookings {
            rows.insert(b.id, b.clone());
        }
        Ok(())
    }

    async fn blocking_bookings(
        &self,
        travel_date: NaiveDate,
        seat_ids: &[SeatId],
    ) -> Result<Vec<Booking>, StoreError> {
        self.collect(|b| b.travel_date == travel_date && b.is_blocking() && seat_ids.contains(&b.seat_id))
    }

    async fn references_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<HashSet<BookingReference>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .values()
            .filter(|b| b.reference.as_str().starts_with(prefix))
            .map(|b| b.reference.clone())
            .collect())
    }

    async fn find(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Booking>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.values().find(|b| &b.reference == reference).cloned())
    }

    async fn find_by_references(
        &self,
        references: &[BookingReference],
    ) -> Result<Vec<Booking>, StoreError> {
        self.collect(|b| references.contains(&b.reference))
    }

    async fn update_status(
        &self,
        id: BookingId,
        expected: BookingStatus,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        match rows.get_mut(&id) {
            Some(b) if b.status == expected => {
                b.status = status;
                b.payment_status = payment_status;
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("{expected} booking {id}"))),
        }
    }

    async fn reconcile_seat(
        &self,
        seat_id: SeatId,
        travel_date: NaiveDate,
        before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let before_len = rows.len();
        rows.retain(|_, b| {
            !(b.seat_id == seat_id
                && b.travel_date == travel_date
                && b.status == BookingStatus::Cancelled
                && b.created_at < before)
        });
        Ok((before_len - rows.len()) as u64)
    }

    async fn list_for_passenger(&self, passenger_id: UserId) -> Result<Vec<Booking>, StoreError> {
        self.collect(|b| b.passenger_id == passenger_id)
    }

    async fn list_for_schedule(&self, schedule_id: ScheduleId) -> Result<Vec<Booking>, StoreError> {
        self.collect(|b| b.schedule_id == schedule_id)
    }

    async fn list_by_status(&self, status: BookingStatus) -> Result<Vec<Booking>, StoreError> {
        let mut out = self.collect(|b| b.status == status)?;
        out.reverse();
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct Catalog {
    buses: HashMap<BusId, Bus>,
    seats: HashMap<BusId, Vec<Seat>>,
    routes: HashMap<RouteId, Route>,
    schedules: HashMap<ScheduleId, Schedule>,
}

/// In-memory fleet catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<Catalog>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert_bus(&self, registered: &RegisteredBus) -> Result<(), StoreError> {
        let mut catalog = self.inner.write().map_err(|_| poisoned())?;
        let number = &registered.bus.bus_number;
        if catalog.buses.values().any(|b| b.bus_number.eq_ignore_ascii_case(number)) {
            return Err(StoreError::Duplicate(format!("bus number {number}")));
        }
        catalog.buses.insert(registered.bus.id, registered.bus.clone());
        catalog.seats.insert(registered.bus.id, registered.seats.clone());
        Ok(())
    }

    async fn insert_route(&self, route: &Route) -> Result<(), StoreError> {
        let mut catalog = self.inner.write().map_err(|_| poisoned())?;
        catalog.routes.insert(route.id, route.clone());
        Ok(())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let mut catalog = self.inner.write().map_err(|_| poisoned())?;
        if !catalog.buses.contains_key(&schedule.bus_id) {
            return Err(StoreError::NotFound(format!("bus {}", schedule.bus_id)));
        }
        if !catalog.routes.contains_key(&schedule.route_id) {
            return Err(StoreError::NotFound(format!("route {}", schedule.route_id)));
        }
        catalog.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn bus(&self, id: BusId) -> Result<Option<Bus>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog.buses.get(&id).cloned())
    }

    async fn seats_for_bus(&self, bus_id: BusId) -> Result<Vec<Seat>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog.seats.get(&bus_id).cloned().unwrap_or_default())
    }

    async fn route(&self, id: RouteId) -> Result<Option<Route>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog.routes.get(&id).cloned())
    }

    async fn schedule(&self, id: ScheduleId) -> Result<Option<Schedule>, StoreError> {
        let catalog = self.inner.read().map_err(|_| poisoned())?;
        Ok(catalog.schedules.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_booking::{Gender, PassengerName};
    use busline_core::BatchId;
    use chrono::{Duration, TimeZone};

    fn booking(seat_id: SeatId, reference: &str, status: BookingStatus) -> Booking {
        Booking {
            id: BookingId::new(),
            reference: reference.parse().unwrap(),
            batch_id: BatchId::new(),
            schedule_id: ScheduleId::new(),
            seat_id,
            passenger_id: UserId::new(),
            passenger_name: PassengerName::parse("Ines Mota").unwrap(),
            gender: Gender::Female,
            travel_date: NaiveDate::from_ymd_opt(2030, 8, 1).unwrap(),
            amount: 900,
            status,
            payment_status: PaymentStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2030, 7, 1, 10, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn group_commit_is_all_or_nothing() {
        let store = InMemoryBookingStore::new();
        let taken = SeatId::new();
        store
            .commit_group(&[booking(taken, "BK3007010001", BookingStatus::Confirmed)])
            .await
            .unwrap();

        let free = SeatId::new();
        let err = store
            .commit_group(&[
                booking(free, "BK3007010002", BookingStatus::Confirmed),
                booking(taken, "BK3007010003", BookingStatus::Confirmed),
            ])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::SeatConflict { seat_ids: vec![taken] });

        let date = NaiveDate::from_ymd_opt(2030, 8, 1).unwrap();
        assert!(store.blocking_bookings(date, &[free]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_rows_block_refunded_rows_do_not() {
        let store = InMemoryBookingStore::new();
        let seat = SeatId::new();
        let first = booking(seat, "BK3007010001", BookingStatus::Confirmed);
        store.commit_group(std::slice::from_ref(&first)).await.unwrap();

        store
            .update_status(first.id, BookingStatus::Confirmed, BookingStatus::Cancelled, PaymentStatus::Pending)
            .await
            .unwrap();
        assert!(matches!(
            store.commit_group(&[booking(seat, "BK3007010002", BookingStatus::Confirmed)]).await,
            Err(StoreError::SeatConflict { .. })
        ));

        store
            .update_status(first.id, BookingStatus::Cancelled, BookingStatus::Refunded, PaymentStatus::Refunded)
            .await
            .unwrap();
        store
            .commit_group(&[booking(seat, "BK3007010002", BookingStatus::Confirmed)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_references_are_rejected() {
        let store = InMemoryBookingStore::new();
        store
            .commit_group(&[booking(SeatId::new(), "BK3007010001", BookingStatus::Confirmed)])
            .await
            .unwrap();
        assert_eq!(
            store
                .commit_group(&[booking(SeatId::new(), "BK3007010001", BookingStatus::Confirmed)])
                .await,
            Err(StoreError::DuplicateReference("BK3007010001".into()))
        );
    }

    #[tokio::test]
    async fn status_updates_are_compare_and_set() {
        let store = InMemoryBookingStore::new();
        let b = booking(SeatId::new(), "BK3007010001", BookingStatus::Confirmed);
        store.commit_group(std::slice::from_ref(&b)).await.unwrap();
        assert!(matches!(
            store
                .update_status(b.id, BookingStatus::Cancelled, BookingStatus::Refunded, PaymentStatus::Refunded)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_removes_only_older_cancelled_rows() {
        let store = InMemoryBookingStore::new();
        let seat = SeatId::new();
        let date = NaiveDate::from_ymd_opt(2030, 8, 1).unwrap();
        let cutoff = Utc.with_ymd_and_hms(2030, 7, 2, 0, 0, 0).unwrap();

        let stale = booking(seat, "BK3007010001", BookingStatus::Cancelled);
        let confirmed = booking(seat, "BK3007010002", BookingStatus::Confirmed);
        let mut newer = booking(seat, "BK3007010003", BookingStatus::Cancelled);
        newer.created_at = cutoff + Duration::hours(1);
        for b in [stale.clone(), confirmed.clone(), newer.clone()] {
            store.insert_unchecked(b);
        }

        assert_eq!(store.reconcile_seat(seat, date, cutoff).await.unwrap(), 1);
        assert_eq!(store.reconcile_seat(seat, date, cutoff).await.unwrap(), 0);
        assert!(store.find(stale.id).await.unwrap().is_none());
        assert!(store.find(confirmed.id).await.unwrap().is_some());
        assert!(store.find(newer.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bus_numbers_are_unique() {
        let catalog = InMemoryCatalogStore::new();
        let register = |number: &str| {
            busline_booking::RegisterBus {
                operator_id: UserId::new(),
                bus_number: number.into(),
                name: "Blue".into(),
                layout: "2x2".parse().unwrap(),
                total_seats: 12,
            }
            .into_registered(BusId::new())
            .unwrap()
        };
        catalog.insert_bus(&register("AB-1")).await.unwrap();
        assert!(matches!(
            catalog.insert_bus(&register("ab-1")).await,
            Err(StoreError::Duplicate(_))
        ));
    }
}
