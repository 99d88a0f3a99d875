//! Atomic creation of a booking group.
//!
//! ```text
//! request
//!   -> validate (names, genders, duplicate seats, travel date vs today)
//!   -> resolve schedule + check every seat belongs to its bus
//!   -> loop (bounded):
//!        re-check seat availability
//!        mint references
//!        commit all rows in one unit of work
//! ```
//!
//! The storage layer's uniqueness rule is what actually prevents double
//! booking; the retry only smooths over benign contention.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, instrument, warn};

use busline_booking::{Booking, BookingPolicy, BookingReference, BookingRequest, ReferenceGenerator};
use busline_core::{BatchId, Clock, SeatId, UserId};

use crate::error::{BookingError, StoreError};
use crate::retry::RetryPolicy;
use crate::store::{BookingStore, CatalogStore};

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedBookings {
    pub batch_id: BatchId,
    /// One per passenger, in request order.
    pub references: Vec<BookingReference>,
    pub total_amount: u64,
    #[serde(skip)]
    pub bookings: Vec<Booking>,
}

pub struct BookingTransactionManager {
    bookings: Arc<dyn BookingStore>,
    catalog: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    references: ReferenceGenerator,
    retry: RetryPolicy,
}

impl BookingTransactionManager {
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
            references: ReferenceGenerator::default(),
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

    pub fn with_reference_generator(mut self, references: ReferenceGenerator) -> Self {
        self.references = references;
        self
    }

    /// Create one confirmed booking per passenger, all or nothing.
    #[instrument(
        skip(self, request),
        fields(
            passenger_id = %passenger_id,
            schedule_id = %request.schedule_id,
            travel_date = %request.travel_date,
            passengers = request.passengers.len()
        ),
        err
    )]
    pub async fn create_bookings(
        &self,
        passenger_id: UserId,
        request: BookingRequest,
    ) -> Result<CreatedBookings, BookingError> {
        let now = self.clock.now();
        let today = self.policy.today(now);
        let validated = request.validate(today)?;

        let schedule = self
            .retry
            .bounded("schedule", self.catalog.schedule(validated.schedule_id))
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", validated.schedule_id)))?;
        let bus_seats: HashSet<SeatId> = self
            .retry
            .bounded("seats_for_bus", self.catalog.seats_for_bus(schedule.bus_id))
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let seat_ids = validated.seat_ids();
        if let Some(foreign) = seat_ids.iter().find(|id| !bus_seats.contains(id)) {
            return Err(BookingError::Validation(format!(
                "seat {foreign} does not belong to the bus of schedule {}",
                schedule.id
            )));
        }

        let batch_id = BatchId::new();
        let mut contested: Vec<SeatId> = Vec::new();
        let mut reference_collisions = 0u32;

        for attempt in 1..=self.retry.attempts {
            // Only the last attempt's outcome is reported.
            contested.clear();
            let blocked = self
                .retry
                .bounded(
                    "blocking_bookings",
                    self.bookings.blocking_bookings(validated.travel_date, &seat_ids),
                )
                .await?;

            if !blocked.is_empty() {
                let held: HashSet<SeatId> = blocked.iter().map(|b| b.seat_id).collect();
                contested = seat_ids.iter().copied().filter(|id| held.contains(id)).collect();
                warn!(attempt, seats = ?contested, "requested seats are held");
                if attempt < self.retry.attempts {
                    self.retry.pause().await;
                }
                continue;
            }

            let references = self.mint_references(today, seat_ids.len()).await?;
            let rows = validated.clone().into_bookings(
                passenger_id,
                batch_id,
                schedule.base_price,
                references,
                now,
            )?;

            match self
                .retry
                .bounded("commit_group", self.bookings.commit_group(&rows))
                .await
            {
                Ok(()) => {
                    let references: Vec<BookingReference> =
                        rows.iter().map(|b| b.reference.clone()).collect();
                    info!(%batch_id, references = ?references, "booking group committed");
                    return Ok(CreatedBookings {
                        batch_id,
                        total_amount: rows.iter().map(|b| b.amount).sum(),
                        references,
                        bookings: rows,
                    });
                }
                Err(StoreError::SeatConflict { seat_ids: lost }) => {
                    warn!(attempt, seats = ?lost, "lost seat race at commit");
                    contested = lost;
                    if attempt < self.retry.attempts {
                        self.retry.pause().await;
                    }
                }
                Err(StoreError::DuplicateReference(reference)) => {
                    reference_collisions += 1;
                    warn!(attempt, %reference, "reference collided at commit");
                }
                Err(other) => return Err(other.into()),
            }
        }

        if !contested.is_empty() {
            return Err(BookingError::Conflict { seat_ids: contested });
        }
        warn!(reference_collisions, "no attempt could commit a unique reference set");
        Err(BookingError::ReferenceGenerationExhausted {
            attempts: self.references.max_attempts(),
        })
    }

    /// Mint `count` references unique against the store and each other.
    async fn mint_references(
        &self,
        today: NaiveDate,
        count: usize,
    ) -> Result<Vec<BookingReference>, BookingError> {
        let prefix = self.references.day_prefix(today);
        let mut taken = self
            .retry
            .bounded("references_with_prefix", self.bookings.references_with_prefix(&prefix))
            .await?;

        let mut rng = StdRng::from_entropy();
        let mut minted = Vec::with_capacity(count);
        for _ in 0..count {
            let reference = self
                .references
                .generate(today, &mut rng, |c| Ok::<_, Infallible>(taken.contains(c)))?;
            taken.insert(reference.clone());
            minted.push(reference);
        }
        Ok(minted)
    }
}
