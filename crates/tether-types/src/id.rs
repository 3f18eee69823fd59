//! Identifier type for registry entries.
//!
//! Identifiers are plain integers scoped to one engine process. They are
//! assigned lazily, the first time a concrete value is registered, and stay
//! stable for the lifetime of that process.

use serde::{Deserialize, Serialize};

/// Identifier for a live object in the engine-side registry.
///
/// An `ObjectId` names exactly one concrete value inside the engine.
/// Identity, not value equality, is the addressing key: two distinct
/// concrete objects never share an id, and the same concrete object always
/// yields the same id no matter how many times it is registered.
///
/// # Allocation
///
/// Ids are allocated by the registry, monotonically from `1`. `0` is never
/// assigned, which leaves it available as an "unset" marker in debugging
/// output. Ids are never reused — registry entries live as long as the
/// engine process.
///
/// # Wire format
///
/// Serializes as a bare JSON integer. Every wrapped value's JSON carries
/// its id in the reserved [`REMOTE_ID_FIELD`](crate::REMOTE_ID_FIELD)
/// field, which is how the marshaller recognizes a remote reference on the
/// way back in.
///
/// # Example
///
/// ```
/// use tether_types::ObjectId;
///
/// let id = ObjectId(7);
/// assert_eq!(id.value(), 7);
/// assert_eq!(id.to_string(), "obj:7");
/// assert_eq!(serde_json::to_string(&id).unwrap(), "7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Returns the raw integer value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Converts an engine-side integer into an id.
    ///
    /// The dispatcher receives ids as signed Lua integers; anything
    /// negative cannot name a registry entry.
    ///
    /// # Example
    ///
    /// ```
    /// use tether_types::ObjectId;
    ///
    /// assert_eq!(ObjectId::from_raw(3), Some(ObjectId(3)));
    /// assert_eq!(ObjectId::from_raw(-1), None);
    /// ```
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().map(Self)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_bare_integer() {
        let id = ObjectId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: ObjectId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn from_raw_rejects_negative() {
        assert_eq!(ObjectId::from_raw(0), Some(ObjectId(0)));
        assert_eq!(ObjectId::from_raw(i64::MAX), Some(ObjectId(i64::MAX as u64)));
        assert_eq!(ObjectId::from_raw(-7), None);
    }
}
