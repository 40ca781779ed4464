//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity: two values with the same attributes are the
/// same value. They are immutable; to "modify" one, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Envelope { code: i64, message: String }
///
/// impl ValueObject for Envelope {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
