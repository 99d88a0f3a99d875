//! Cancellation and refund against stored bookings.
//!
//! Cancellation is evaluated per reference: one failing reference never
//! blocks the others. Refund is a single compare-and-set followed by an
//! idempotent reconciliation of the freed seat.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use busline_booking::{
    Actor, Booking, BookingPolicy, BookingReference, BookingStatus, LifecycleError,
};
use busline_core::{BookingId, Clock};

use crate::error::{LifecycleServiceError, StoreError};
use crate::retry::RetryPolicy;
use crate::store::{BookingStore, CatalogStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationFailureKind {
    InvalidReference,
    NotFound,
    Forbidden,
    WindowExpired,
    NotCancellable,
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationFailure {
    pub reference: String,
    pub kind: CancellationFailureKind,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CancellationReport {
    pub cancelled_count: usize,
    pub failures: Vec<CancellationFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub booking: Booking,
    /// Stale cancelled rows removed for the freed seat.
    pub reconciled: u64,
}

pub struct BookingLifecycleService {
    bookings: Arc<dyn BookingStore>,
    catalog: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    retry: RetryPolicy,
}

impl BookingLifecycleService {
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

    /// Cancel each reference independently.
    #[instrument(skip(self, references), fields(actor = %actor.user_id(), count = references.len()))]
    pub async fn cancel_group(&self, actor: Actor, references: &[String]) -> CancellationReport {
        let mut report = CancellationReport::default();

        for raw in references {
            let raw = raw.trim();
            let reference: BookingReference = match raw.parse() {
                Ok(r) => r,
                Err(e) => {
                    report.failures.push(CancellationFailure {
                        reference: raw.to_string(),
                        kind: CancellationFailureKind::InvalidReference,
                        reason: e.to_string(),
                        deadline: None,
                    });
                    continue;
                }
            };

            match self.cancel_one(actor, &reference).await {
                Ok(()) => report.cancelled_count += 1,
                Err(failure) => {
                    warn!(%reference, kind = ?failure.kind, "cancellation rejected");
                    report.failures.push(failure);
                }
            }
        }

        report
    }

    async fn cancel_one(
        &self,
        actor: Actor,
        reference: &BookingReference,
    ) -> Result<(), CancellationFailure> {
        let fail = |kind, reason: String, deadline| CancellationFailure {
            reference: reference.to_string(),
            kind,
            reason,
            deadline,
        };
        let persistence = |e: StoreError| fail(CancellationFailureKind::Persistence, e.to_string(), None);

        let booking = self
            .retry
            .bounded("find_by_reference", self.bookings.find_by_reference(reference))
            .await
            .map_err(persistence)?;
        // Other passengers' bookings are reported as missing.
        let mut booking = match booking {
            Some(b) if actor.is_administrator() || b.passenger_id == actor.user_id() => b,
            _ => {
                return Err(fail(
                    CancellationFailureKind::NotFound,
                    format!("booking {reference} not found"),
                    None,
                ));
            }
        };

        let schedule = self
            .retry
            .bounded("schedule", self.catalog.schedule(booking.schedule_id))
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                fail(
                    CancellationFailureKind::NotFound,
                    format!("schedule {} not found", booking.schedule_id),
                    None,
                )
            })?;

        let now = self.clock.now();
        if let Err(e) = self.policy.cancel(&mut booking, schedule.departure_time, actor, now) {
            let (kind, deadline) = match &e {
                LifecycleError::CancellationWindowExpired { deadline, .. } => {
                    (CancellationFailureKind::WindowExpired, Some(*deadline))
                }
                LifecycleError::NotCancellable { .. } => (CancellationFailureKind::NotCancellable, None),
                LifecycleError::Forbidden { .. } => (CancellationFailureKind::Forbidden, None),
                LifecycleError::NotFoundOrNotCancellable => (CancellationFailureKind::NotFound, None),
            };
            return Err(fail(kind, e.to_string(), deadline));
        }

        self.retry
            .bounded(
                "update_status",
                self.bookings.update_status(
                    booking.id,
                    BookingStatus::Confirmed,
                    booking.status,
                    booking.payment_status,
                ),
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => fail(
                    CancellationFailureKind::NotCancellable,
                    format!("booking {reference} changed concurrently"),
                    None,
                ),
                other => persistence(other),
            })?;

        info!(%reference, booking_id = %booking.id, "booking cancelled");
        Ok(())
    }

    /// cancelled -> refunded, then reconcile the freed seat.
    #[instrument(skip(self), fields(actor = %actor.user_id()), err)]
    pub async fn refund(
        &self,
        actor: Actor,
        booking_id: BookingId,
    ) -> Result<RefundOutcome, LifecycleServiceError> {
        let mut booking = self
            .retry
            .bounded("find", self.bookings.find(booking_id))
            .await?
            .ok_or(LifecycleError::NotFoundOrNotCancellable)?;

        self.policy.refund(&mut booking, actor)?;

        match self
            .retry
            .bounded(
                "update_status",
                self.bookings.update_status(
                    booking.id,
                    BookingStatus::Cancelled,
                    booking.status,
                    booking.payment_status,
                ),
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(LifecycleError::NotFoundOrNotCancellable.into()),
            Err(other) => return Err(other.into()),
        }
        info!(booking_id = %booking.id, reference = %booking.reference, "booking refunded");

        // The refund is committed; a failed cleanup is retried by the next refund of this seat.
        let reconciled = match self
            .retry
            .bounded(
                "reconcile_seat",
                self.bookings
                    .reconcile_seat(booking.seat_id, booking.travel_date, booking.created_at),
            )
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, seat_id = %booking.seat_id, "seat reconciliation failed");
                0
            }
        };
        debug!(reconciled, seat_id = %booking.seat_id, travel_date = %booking.travel_date, "seat reconciled");

        Ok(RefundOutcome { booking, reconciled })
    }
}
