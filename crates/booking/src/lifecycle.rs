//! Booking lifecycle: confirmed -> cancelled -> refunded.
//!
//! Cancellation is time-windowed against the trip's departure; refunding is an
//! administrator action and is the only transition that releases the seat.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use busline_core::{DomainError, DomainResult, UserId};

use crate::booking::{Booking, BookingStatus, PaymentStatus};
use crate::reference::BookingReference;

pub const DEFAULT_CANCELLATION_WINDOW_MINUTES: i64 = 120;

/// Upper bound on the cancellation window.
pub const MAX_CANCELLATION_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("booking {reference} can no longer be cancelled; the deadline was {deadline}")]
    CancellationWindowExpired {
        reference: BookingReference,
        deadline: DateTime<Utc>,
    },

    #[error("booking {reference} is {status} and cannot be cancelled")]
    NotCancellable {
        reference: BookingReference,
        status: BookingStatus,
    },

    #[error("booking not found or not awaiting refund")]
    NotFoundOrNotCancellable,

    #[error("actor may not modify booking {reference}")]
    Forbidden { reference: BookingReference },
}

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Passenger(UserId),
    Administrator(UserId),
}

impl Actor {
    pub fn user_id(&self) -> UserId {
        match self {
            Actor::Passenger(id) | Actor::Administrator(id) => *id,
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Actor::Administrator(_))
    }
}

/// Read-time classification of a trip instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripTiming {
    Upcoming,
    Completed,
}

/// Time rules of the booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    cancellation_window: Duration,
    timezone: FixedOffset,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            cancellation_window: Duration::minutes(DEFAULT_CANCELLATION_WINDOW_MINUTES),
            timezone: Utc.fix(),
        }
    }
}

impl BookingPolicy {
    pub fn new(cancellation_window: Duration, timezone: FixedOffset) -> DomainResult<Self> {
        if cancellation_window < Duration::zero() {
            return Err(DomainError::validation("cancellation window must not be negative"));
        }
        if cancellation_window > Duration::days(MAX_CANCELLATION_WINDOW_DAYS) {
            return Err(DomainError::validation(format!(
                "cancellation window must not exceed {MAX_CANCELLATION_WINDOW_DAYS} days"
            )));
        }
        Ok(Self {
            cancellation_window,
            timezone,
        })
    }

    /// Policy for a service area `offset_minutes` east of UTC.
    pub fn from_minutes(window_minutes: i64, offset_minutes: i32) -> DomainResult<Self> {
        let timezone = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| DomainError::validation(format!("invalid UTC offset {offset_minutes} minutes")))?;
        let window = Duration::try_minutes(window_minutes).ok_or_else(|| {
            DomainError::validation(format!("cancellation window of {window_minutes} minutes is out of range"))
        })?;
        Self::new(window, timezone)
    }

    pub fn cancellation_window(&self) -> Duration {
        self.cancellation_window
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// The calendar date at `now` in the service timezone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Departure instant of the trip running on `travel_date`.
    pub fn departure_at(&self, travel_date: NaiveDate, departure_time: NaiveTime) -> DateTime<Utc> {
        let local = travel_date.and_time(departure_time);
        let offset = Duration::seconds(i64::from(self.timezone.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(local - offset, Utc)
    }

    /// Last instant (exclusive) at which a booking may still be cancelled.
    pub fn cancellation_deadline(
        &self,
        travel_date: NaiveDate,
        departure_time: NaiveTime,
    ) -> DateTime<Utc> {
        self.departure_at(travel_date, departure_time) - self.cancellation_window
    }

    pub fn timing(
        &self,
        travel_date: NaiveDate,
        departure_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> TripTiming {
        if self.departure_at(travel_date, departure_time) > now {
            TripTiming::Upcoming
        } else {
            TripTiming::Completed
        }
    }

    /// confirmed -> cancelled.
    ///
    /// Passengers may only cancel their own bookings; administrators may
    /// cancel any booking. Both are bound by the window.
    pub fn cancel(
        &self,
        booking: &mut Booking,
        departure_time: NaiveTime,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if !actor.is_administrator() && booking.passenger_id != actor.user_id() {
            return Err(LifecycleError::Forbidden {
                reference: booking.reference.clone(),
            });
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(LifecycleError::NotCancellable {
                reference: booking.reference.clone(),
                status: booking.status,
            });
        }

        let deadline = self.cancellation_deadline(booking.travel_date, departure_time);
        if now >= deadline {
            return Err(LifecycleError::CancellationWindowExpired {
                reference: booking.reference.clone(),
                deadline,
            });
        }

        booking.status = BookingStatus::Cancelled;
        Ok(())
    }

    /// cancelled -> refunded. Administrator only.
    pub fn refund(&self, booking: &mut Booking, actor: Actor) -> Result<(), LifecycleError> {
        if !actor.is_administrator() {
            return Err(LifecycleError::Forbidden {
                reference: booking.reference.clone(),
            });
        }
        if booking.status != BookingStatus::Cancelled {
            return Err(LifecycleError::NotFoundOrNotCancellable);
        }

        booking.status = BookingStatus::Refunded;
        booking.payment_status = PaymentStatus::Refunded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::Gender;
    use busline_core::{BatchId, BookingId, ScheduleId, SeatId};
    use chrono::TimeZone;

    fn departure() -> NaiveTime {
        NaiveTime::from_hms_opt(14, 0, 0).unwrap()
    }

    fn travel_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 10).unwrap()
    }

    fn booking(owner: UserId) -> Booking {
        Booking {
            id: BookingId::new(),
            reference: "BK3006100001".parse().unwrap(),
            batch_id: BatchId::new(),
            schedule_id: ScheduleId::new(),
            seat_id: SeatId::new(),
            passenger_id: owner,
            passenger_name: crate::booking::PassengerName::parse("Ana Lima").unwrap(),
            gender: Gender::Female,
            travel_date: travel_date(),
            amount: 1_000,
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2030, 6, 1, 9, 0, 0).unwrap(),
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 10, h, m, 0).unwrap()
    }

    #[test]
    fn cancel_one_hour_before_departure_is_rejected() {
        let policy = BookingPolicy::default();
        let owner = UserId::new();
        let mut b = booking(owner);

        let err = policy
            .cancel(&mut b, departure(), Actor::Passenger(owner), at(13, 0))
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::CancellationWindowExpired {
                reference: b.reference.clone(),
                deadline: at(12, 0),
            }
        );
        assert_eq!(b.status, BookingStatus::Confirmed);
    }

    #[test]
    fn cancel_just_inside_the_window_succeeds_and_still_blocks() {
        let policy = BookingPolicy::default();
        let owner = UserId::new();
        let mut b = booking(owner);

        policy
            .cancel(&mut b, departure(), Actor::Passenger(owner), at(11, 59))
            .unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert!(b.is_blocking());
    }

    #[test]
    fn exactly_at_the_deadline_is_too_late() {
        let policy = BookingPolicy::default();
        let owner = UserId::new();
        let mut b = booking(owner);
        assert!(policy
            .cancel(&mut b, departure(), Actor::Passenger(owner), at(12, 0))
            .is_err());
    }

    #[test]
    fn strangers_cannot_cancel_but_admins_can() {
        let policy = BookingPolicy::default();
        let mut b = booking(UserId::new());

        assert!(matches!(
            policy.cancel(&mut b, departure(), Actor::Passenger(UserId::new()), at(8, 0)),
            Err(LifecycleError::Forbidden { .. })
        ));
        policy
            .cancel(&mut b, departure(), Actor::Administrator(UserId::new()), at(8, 0))
            .unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
    }

    #[test]
    fn admins_are_bound_by_the_window() {
        let policy = BookingPolicy::default();
        let mut b = booking(UserId::new());
        assert!(matches!(
            policy.cancel(&mut b, departure(), Actor::Administrator(UserId::new()), at(13, 30)),
            Err(LifecycleError::CancellationWindowExpired { .. })
        ));
    }

    #[test]
    fn cancelling_twice_is_not_allowed() {
        let policy = BookingPolicy::default();
        let owner = UserId::new();
        let mut b = booking(owner);
        policy.cancel(&mut b, departure(), Actor::Passenger(owner), at(8, 0)).unwrap();
        assert!(matches!(
            policy.cancel(&mut b, departure(), Actor::Passenger(owner), at(8, 0)),
            Err(LifecycleError::NotCancellable {
                status: BookingStatus::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn refund_releases_and_is_not_repeatable() {
        let policy = BookingPolicy::default();
        let owner = UserId::new();
        let admin = Actor::Administrator(UserId::new());
        let mut b = booking(owner);

        assert_eq!(
            policy.refund(&mut b, admin),
            Err(LifecycleError::NotFoundOrNotCancellable)
        );

        policy.cancel(&mut b, departure(), Actor::Passenger(owner), at(8, 0)).unwrap();
        assert!(matches!(
            policy.refund(&mut b, Actor::Passenger(owner)),
            Err(LifecycleError::Forbidden { .. })
        ));

        policy.refund(&mut b, admin).unwrap();
        assert_eq!(b.status, BookingStatus::Refunded);
        assert_eq!(b.payment_status, PaymentStatus::Refunded);
        assert!(!b.is_blocking());

        assert_eq!(
            policy.refund(&mut b, admin),
            Err(LifecycleError::NotFoundOrNotCancellable)
        );
    }

    #[test]
    fn departure_is_local_to_the_service_area() {
        // UTC+05:30
        let policy = BookingPolicy::from_minutes(120, 330).unwrap();
        assert_eq!(
            policy.departure_at(travel_date(), departure()),
            Utc.with_ymd_and_hms(2030, 6, 10, 8, 30, 0).unwrap()
        );
        assert_eq!(
            policy.today(Utc.with_ymd_and_hms(2030, 6, 9, 20, 0, 0).unwrap()),
            travel_date()
        );
    }

    #[test]
    fn timing_flips_at_departure() {
        let policy = BookingPolicy::default();
        assert_eq!(policy.timing(travel_date(), departure(), at(13, 59)), TripTiming::Upcoming);
        assert_eq!(policy.timing(travel_date(), departure(), at(14, 0)), TripTiming::Completed);
    }

    #[test]
    fn negative_windows_are_rejected() {
        assert!(BookingPolicy::from_minutes(-1, 0).is_err());
        assert!(BookingPolicy::from_minutes(0, 24 * 60).is_err());
    }

    #[test]
    fn out_of_range_windows_are_errors_not_panics() {
        for minutes in [i64::MAX, i64::MIN, 366 * 24 * 60 + 1] {
            match BookingPolicy::from_minutes(minutes, 0) {
                Err(DomainError::Validation(_)) => {}
                other => panic!("{minutes}: expected validation error, got {other:?}"),
            }
        }
        let widest = BookingPolicy::from_minutes(366 * 24 * 60, 0).unwrap();
        assert_eq!(widest.cancellation_window(), Duration::days(366));
    }
}
