//! `busline-booking`: pure booking domain.
//!
//! - Seat layout rules and label <-> sequential number translation
//! - Booking reference minting
//! - Booking records and request validation
//! - Lifecycle transitions and the cancellation window
//! - Trip reconstruction for listings
//!
//! No IO happens here; storage and orchestration live in `busline-infra`.

pub mod booking;
pub mod codec;
pub mod fleet;
pub mod layout;
pub mod lifecycle;
pub mod reference;
pub mod trip;

pub use booking::{
    Booking, BookingRequest, BookingStatus, Gender, PassengerName, PassengerSeat, PaymentStatus,
    ValidatedPassenger, ValidatedRequest,
};
pub use codec::{SeatLabel, SeatLayoutCodec, SeatNumber};
pub use fleet::{Bus, RegisterBus, RegisteredBus, Route, Schedule, Seat};
pub use layout::{SeatLayout, SeatType};
pub use lifecycle::{Actor, BookingPolicy, LifecycleError, TripTiming};
pub use reference::{BookingReference, ReferenceError, ReferenceGenerator};
pub use trip::{Trip, TripBuckets, TripCatalog, TripDetails, TripPassenger, TripStatus, group_trips};
