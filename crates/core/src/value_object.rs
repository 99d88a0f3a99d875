//! Value object trait: equality by value, not identity.

/// Marker for immutable values compared attribute-by-attribute.
///
/// Seat labels, layouts, and booking references are value objects: two
/// `"B3"` labels are the same label regardless of where they were parsed.
/// Entities (see [`crate::Entity`]) are instead compared by their id.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
