//! Shared fixture for the service tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

use busline_booking::{
    Booking, BookingRequest, BookingStatus, Gender, PassengerName, PassengerSeat, PaymentStatus,
    RegisterBus, Schedule, Seat,
};
use busline_core::{BatchId, BookingId, FixedClock, UserId};

use crate::fleet::FleetService;
use crate::lifecycle::BookingLifecycleService;
use crate::queries::BookingQueries;
use crate::retry::RetryPolicy;
use crate::store::{InMemoryBookingStore, InMemoryCatalogStore};
use crate::transaction::BookingTransactionManager;

pub(crate) struct Harness {
    pub bookings: Arc<InMemoryBookingStore>,
    pub catalog: Arc<InMemoryCatalogStore>,
    pub clock: Arc<FixedClock>,
    pub schedule: Schedule,
    pub seats: Vec<Seat>,
    pub passenger: UserId,
    next_suffix: AtomicU32,
}

impl Harness {
    pub const PRICE: u64 = 1_500;

    /// 2x2 bus with 40 seats, departing 14:00 UTC; "now" is 2030-06-01 08:00 UTC.
    pub async fn new() -> Self {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap()));

        let fleet = FleetService::new(catalog.clone());
        let registered = fleet
            .register_bus(RegisterBus {
                operator_id: UserId::new(),
                bus_number: "LX-1001".into(),
                name: "Tagus Shuttle".into(),
                layout: "2x2".parse().unwrap(),
                total_seats: 40,
            })
            .await
            .unwrap();
        let route = fleet.add_route("Coastal", "Lisbon", "Faro").await.unwrap();
        let schedule = fleet
            .add_schedule(
                registered.bus.id,
                route.id,
                NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(17, 30, 0),
                Self::PRICE,
            )
            .await
            .unwrap();

        Self {
            bookings,
            catalog,
            clock,
            schedule,
            seats: registered.seats,
            passenger: UserId::new(),
            next_suffix: AtomicU32::new(1),
        }
    }

    pub fn travel_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 10).unwrap()
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, std::time::Duration::ZERO)
    }

    pub fn manager(&self) -> BookingTransactionManager {
        BookingTransactionManager::new(self.bookings.clone(), self.catalog.clone(), self.clock.clone())
            .with_retry(Self::retry())
    }

    pub fn lifecycle(&self) -> BookingLifecycleService {
        BookingLifecycleService::new(self.bookings.clone(), self.catalog.clone(), self.clock.clone())
            .with_retry(Self::retry())
    }

    pub fn queries(&self) -> BookingQueries {
        BookingQueries::new(self.bookings.clone(), self.catalog.clone(), self.clock.clone())
    }

    pub fn request(&self, seats: &[usize]) -> BookingRequest {
        BookingRequest {
            schedule_id: self.schedule.id,
            travel_date: Self::travel_date(),
            passengers: seats
                .iter()
                .map(|&i| PassengerSeat {
                    seat_id: self.seats[i].id,
                    name: format!("Passenger {}", self.seats[i].label.letter()),
                    gender: Gender::Female,
                })
                .collect(),
        }
    }

    /// A stored-row fixture for seeding the store directly.
    pub fn booking_row(&self, seat: usize, status: BookingStatus) -> Booking {
        let suffix = self.next_suffix.fetch_add(1, Ordering::Relaxed);
        Booking {
            id: BookingId::new(),
            reference: format!("RX{suffix:08}").parse().unwrap(),
            batch_id: BatchId::new(),
            schedule_id: self.schedule.id,
            seat_id: self.seats[seat].id,
            passenger_id: self.passenger,
            passenger_name: PassengerName::parse("Seeded Row").unwrap(),
            gender: Gender::Male,
            travel_date: Self::travel_date(),
            amount: Self::PRICE,
            status,
            payment_status: PaymentStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2030, 5, 20, 9, 0, 0).unwrap(),
        }
    }
}
