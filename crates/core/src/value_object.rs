//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. They represent
/// concepts where identity doesn't matter — `Money`, a customer's contact
/// details, a reporting window. To "modify" one, create a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
