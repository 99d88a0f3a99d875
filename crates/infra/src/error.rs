//! Infrastructure error model.

use chrono::{DateTime, Utc};
use thiserror::Error;

use busline_booking::{LifecycleError, ReferenceError};
use busline_core::{DomainError, SeatId};

/// Storage-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// One or more seats already carry a blocking booking for the date.
    #[error("seats already taken: {seat_ids:?}")]
    SeatConflict { seat_ids: Vec<SeatId> },

    /// A booking reference collided at commit time.
    #[error("booking reference already exists: {0}")]
    DuplicateReference(String),

    /// A unique fleet attribute (e.g. bus number) is already in use.
    #[error("already exists: {0}")]
    Duplicate(String),

    /// The row to update is missing or no longer in the expected state.
    #[error("{0} not found")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage operation timed out: {0}")]
    Timeout(String),
}

/// Failure of a booking-side operation, as reported to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("seats no longer available: {seat_ids:?}")]
    Conflict { seat_ids: Vec<SeatId> },

    #[error("could not generate a unique booking reference after {attempts} attempts")]
    ReferenceGenerationExhausted { attempts: u32 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Storage failed; nothing from the operation was committed.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl BookingError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "ValidationError",
            BookingError::Conflict { .. } => "ConflictError",
            BookingError::ReferenceGenerationExhausted { .. } => "ReferenceGenerationExhausted",
            BookingError::NotFound(_) => "NotFound",
            BookingError::AlreadyExists(_) => "AlreadyExists",
            BookingError::Persistence(_) => "PersistenceError",
        }
    }
}

impl From<DomainError> for BookingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => BookingError::Validation(msg),
            DomainError::NotFound(what) => BookingError::NotFound(what),
            DomainError::Conflict(msg) => BookingError::AlreadyExists(msg),
            DomainError::InvariantViolation(msg) => BookingError::Persistence(msg),
            DomainError::Unauthorized => BookingError::Validation("unauthorized".to_string()),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::SeatConflict { seat_ids } => BookingError::Conflict { seat_ids },
            StoreError::Duplicate(what) => BookingError::AlreadyExists(what),
            StoreError::NotFound(what) => BookingError::NotFound(what),
            other => BookingError::Persistence(other.to_string()),
        }
    }
}

impl From<ReferenceError> for BookingError {
    fn from(value: ReferenceError) -> Self {
        match value {
            ReferenceError::Exhausted { attempts } => {
                BookingError::ReferenceGenerationExhausted { attempts }
            }
            ReferenceError::Lookup(msg) => BookingError::Persistence(msg),
        }
    }
}

/// Failure of a single lifecycle transition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for LifecycleServiceError {
    fn from(value: StoreError) -> Self {
        LifecycleServiceError::Persistence(value.to_string())
    }
}

impl LifecycleServiceError {
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            LifecycleServiceError::Lifecycle(LifecycleError::CancellationWindowExpired {
                deadline,
                ..
            }) => Some(*deadline),
            _ => None,
        }
    }
}
