//! Entity trait: identity that survives state changes.

/// Records with a stable identifier (buses, seats, schedules, bookings).
pub trait Entity {
    /// Strongly-typed identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;
}
