//! Infrastructure layer: storage backends and the booking services that
//! orchestrate them.

pub mod error;
pub mod fleet;
pub mod lifecycle;
pub mod queries;
pub mod retry;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use error::{BookingError, LifecycleServiceError, StoreError};
pub use fleet::FleetService;
pub use lifecycle::{
    BookingLifecycleService, CancellationFailure, CancellationFailureKind, CancellationReport,
    RefundOutcome,
};
pub use queries::{BookingQueries, PendingRefund, PendingRefunds, SeatMap, SeatMapEntry};
pub use retry::RetryPolicy;
pub use store::{BookingStore, CatalogStore, InMemoryBookingStore, InMemoryCatalogStore};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use transaction::{BookingTransactionManager, CreatedBookings};
