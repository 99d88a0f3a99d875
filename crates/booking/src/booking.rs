//! Booking records and booking-request validation.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use busline_core::{
    BatchId, BookingId, DomainError, DomainResult, Entity, ScheduleId, SeatId, UserId, ValueObject,
};

use crate::reference::BookingReference;

pub const MAX_NAME_LEN: usize = 100;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z\s.'-]*$").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl core::str::FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(DomainError::validation(format!(
                "gender must be male or female, got '{other}'"
            ))),
        }
    }
}

/// confirmed -> cancelled -> refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub const BLOCKING: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::Cancelled];

    /// Whether a booking in this status keeps its seat occupied.
    ///
    /// A cancelled booking holds the seat until it is refunded.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, BookingStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Refunded => "refunded",
        }
    }
}

impl core::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for BookingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "refunded" => Ok(BookingStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown booking status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl core::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown payment status '{other}'"))),
        }
    }
}

/// A passenger name: letters, spaces, periods, hyphens and apostrophes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PassengerName(String);

impl ValueObject for PassengerName {}

impl PassengerName {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(DomainError::validation("passenger name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "passenger name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        let pattern = NAME_PATTERN
            .as_ref()
            .ok_or_else(|| DomainError::invariant("passenger name pattern failed to compile"))?;
        if !pattern.is_match(name) {
            return Err(DomainError::validation(format!(
                "passenger name '{name}' may only contain letters, spaces, periods, hyphens and apostrophes"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PassengerName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PassengerName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PassengerName> for String {
    fn from(value: PassengerName) -> Self {
        value.0
    }
}

/// One persisted seat reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub reference: BookingReference,
    /// Shared by every row written in the same checkout.
    pub batch_id: BatchId,
    pub schedule_id: ScheduleId,
    pub seat_id: SeatId,
    pub passenger_id: UserId,
    pub passenger_name: PassengerName,
    pub gender: Gender,
    pub travel_date: NaiveDate,
    pub amount: u64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Entity for Booking {
    type Id = BookingId;

    fn id(&self) -> BookingId {
        self.id
    }
}

impl Booking {
    pub fn is_blocking(&self) -> bool {
        self.status.is_blocking()
    }
}

/// Raw passenger entry of a booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerSeat {
    pub seat_id: SeatId,
    pub name: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub schedule_id: ScheduleId,
    pub travel_date: NaiveDate,
    pub passengers: Vec<PassengerSeat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPassenger {
    pub seat_id: SeatId,
    pub name: PassengerName,
    pub gender: Gender,
}

/// A request that passed every check not requiring storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub schedule_id: ScheduleId,
    pub travel_date: NaiveDate,
    pub passengers: Vec<ValidatedPassenger>,
}

impl ValidatedRequest {
    pub fn seat_ids(&self) -> Vec<SeatId> {
        self.passengers.iter().map(|p| p.seat_id).collect()
    }

    /// Build the confirmed rows for this request, one per passenger, in request order.
    pub fn into_bookings(
        self,
        passenger_id: UserId,
        batch_id: BatchId,
        amount: u64,
        references: Vec<BookingReference>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Vec<Booking>> {
        if references.len() != self.passengers.len() {
            return Err(DomainError::invariant(format!(
                "{} references minted for {} passengers",
                references.len(),
                self.passengers.len()
            )));
        }

        Ok(self
            .passengers
            .into_iter()
            .zip(references)
            .map(|(p, reference)| Booking {
                id: BookingId::new(),
                reference,
                batch_id,
                schedule_id: self.schedule_id,
                seat_id: p.seat_id,
                passenger_id,
                passenger_name: p.name,
                gender: p.gender,
                travel_date: self.travel_date,
                amount,
                status: BookingStatus::Confirmed,
                payment_status: PaymentStatus::Pending,
                created_at,
            })
            .collect())
    }
}

impl BookingRequest {
    /// `today` is the current date in the service timezone.
    pub fn validate(&self, today: NaiveDate) -> DomainResult<ValidatedRequest> {
        if self.travel_date < today {
            return Err(DomainError::validation(format!(
                "travel date {} is in the past",
                self.travel_date
            )));
        }
        if self.passengers.is_empty() {
            return Err(DomainError::validation("at least one passenger is required"));
        }

        let mut seen = HashSet::with_capacity(self.passengers.len());
        let mut passengers = Vec::with_capacity(self.passengers.len());
        for p in &self.passengers {
            if !seen.insert(p.seat_id) {
                return Err(DomainError::validation(format!(
                    "seat {} is selected more than once",
                    p.seat_id
                )));
            }
            passengers.push(ValidatedPassenger {
                seat_id: p.seat_id,
                name: PassengerName::parse(&p.name)?,
                gender: p.gender,
            });
        }

        Ok(ValidatedRequest {
            schedule_id: self.schedule_id,
            travel_date: self.travel_date,
            passengers,
        })
    }
}
