//! The engine-side object registry.
//!
//! Maps stable integer identifiers to live Lua values and to the wrapper
//! descriptors built for them. The registry is the only shared mutable
//! state in the engine half; it is owned by whoever installs the
//! dispatcher and threaded explicitly through every operation, and it is
//! accessed from exactly one thread because evaluations never overlap.
//!
//! Entries are never evicted. Every registered value is rooted in the Lua
//! registry through its `RegistryKey`, which both keeps it alive for the
//! process lifetime and makes pointer identity a sound deduplication key:
//! a rooted value cannot be collected, so its address is never reused.

use crate::error::EngineError;
use mlua::{Lua, RegistryKey, Value};
use std::collections::HashMap;
use tether_types::{Descriptor, ObjectId, ProxyError};

/// One registered value: the rooted Lua handle plus the descriptor built
/// for it (attached once description completes).
struct RegistryEntry {
    key: RegistryKey,
    wrapper: Option<Descriptor>,
}

/// Registry of live engine values addressable from the control side.
///
/// # Identity
///
/// Registration is idempotent per concrete identity: registering the same
/// table (function, userdata, …) twice returns the same id, and two
/// distinct values never share one. Identity is reference identity — the
/// engine's notion, not structural equality.
///
/// # Growth
///
/// The registry grows monotonically and never shrinks. This is an
/// accepted trade-off: the engine process is bounded by the host
/// session, and dropping entries would invalidate identifiers the
/// control side may still hold.
pub struct ObjectRegistry {
    entries: HashMap<ObjectId, RegistryEntry>,
    by_identity: HashMap<usize, ObjectId>,
    next_id: u64,
    reflection_failures: u64,
}

impl ObjectRegistry {
    /// Creates an empty registry. The first assigned id is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_identity: HashMap::new(),
            next_id: 1,
            reflection_failures: 0,
        }
    }

    /// Registers a value, recursing over sequences.
    ///
    /// A sequence table registers each element individually — never the
    /// sequence itself, because sequences are not addressable objects in
    /// the protocol. Scalars register nothing. The returned ids are in
    /// element order; a single non-sequence reference value yields
    /// exactly one.
    pub fn register(&mut self, lua: &Lua, value: &Value) -> Result<Vec<ObjectId>, EngineError> {
        if let Value::Table(table) = value {
            let len = table.raw_len();
            if len > 0 {
                let mut ids = Vec::new();
                for i in 1..=len {
                    let element: Value = table.raw_get(i)?;
                    ids.extend(self.register(lua, &element)?);
                }
                return Ok(ids);
            }
        }
        if identity_key(value).is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![self.ensure_id(lua, value)?])
    }

    /// Returns the id for a reference value, assigning one on first sight.
    ///
    /// # Errors
    ///
    /// Scalars have no identity and cannot be registered; asking for an id
    /// for one is a reflection failure.
    pub fn ensure_id(&mut self, lua: &Lua, value: &Value) -> Result<ObjectId, EngineError> {
        let identity = identity_key(value).ok_or_else(|| {
            ProxyError::ReflectionFailure(format!(
                "{} values have no identity and are passed by value",
                value.type_name()
            ))
        })?;

        if let Some(&id) = self.by_identity.get(&identity) {
            return Ok(id);
        }

        let id = ObjectId(self.next_id);
        self.next_id += 1;
        let key = lua.create_registry_value(value.clone())?;
        self.entries.insert(id, RegistryEntry { key, wrapper: None });
        self.by_identity.insert(identity, id);
        Ok(id)
    }

    /// Records the descriptor built for an already-registered value.
    ///
    /// Re-describing a value replaces its wrapper; the id is untouched.
    pub fn attach_wrapper(&mut self, id: ObjectId, wrapper: Descriptor) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.wrapper = Some(wrapper);
        }
    }

    /// Resolves an id back to the live value it names.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownReference`] when the id was never assigned.
    pub fn lookup(&self, lua: &Lua, id: ObjectId) -> Result<Value, EngineError> {
        let entry = self
            .entries
            .get(&id)
            .ok_or(ProxyError::UnknownReference(id))?;
        Ok(lua.registry_value(&entry.key)?)
    }

    /// Returns the descriptor recorded for an id.
    ///
    /// # Errors
    ///
    /// [`ProxyError::UnknownReference`] when the id was never assigned or
    /// its description never completed.
    pub fn lookup_wrapper(&self, id: ObjectId) -> Result<&Descriptor, EngineError> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.wrapper.as_ref())
            .ok_or_else(|| ProxyError::UnknownReference(id).into())
    }

    /// Whether the id names an entry.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumps the swallowed-introspection-failure counter.
    pub fn note_reflection_failure(&mut self) {
        self.reflection_failures += 1;
    }

    /// How many times descriptor building degraded to the enumerator
    /// fallback for an unexpected reason.
    #[must_use]
    pub fn reflection_failures(&self) -> u64 {
        self.reflection_failures
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference identity for values that have one.
///
/// Scalars (nil, booleans, numbers) and strings are passed by value on
/// the wire and return `None`.
fn identity_key(value: &Value) -> Option<usize> {
    match value {
        Value::Table(_)
        | Value::Function(_)
        | Value::UserData(_)
        | Value::LightUserData(_)
        | Value::Thread(_) => Some(value.to_pointer() as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_same_id() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let table = Value::Table(lua.create_table().unwrap());

        let first = registry.ensure_id(&lua, &table).unwrap();
        let second = registry.ensure_id(&lua, &table).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_values_distinct_ids() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let a = Value::Table(lua.create_table().unwrap());
        let b = Value::Table(lua.create_table().unwrap());

        let id_a = registry.ensure_id(&lua, &a).unwrap();
        let id_b = registry.ensure_id(&lua, &b).unwrap();
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let a = Value::Table(lua.create_table().unwrap());
        let b = Value::Table(lua.create_table().unwrap());

        assert_eq!(registry.ensure_id(&lua, &a).unwrap(), ObjectId(1));
        assert_eq!(registry.ensure_id(&lua, &b).unwrap(), ObjectId(2));
    }

    #[test]
    fn sequences_register_elements_not_themselves() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let seq = lua.create_table().unwrap();
        for i in 1..=3 {
            seq.raw_set(i, lua.create_table().unwrap()).unwrap();
        }
        let seq = Value::Table(seq);

        let ids = registry.register(&lua, &seq).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(registry.len(), 3);
        // The sequence table itself got no entry.
        assert!(identity_key(&seq).is_some());
        assert_eq!(
            registry
                .by_identity
                .get(&identity_key(&seq).unwrap())
                .copied(),
            None
        );
    }

    #[test]
    fn scalars_are_never_registered() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();

        for scalar in [
            Value::Nil,
            Value::Boolean(true),
            Value::Integer(42),
            Value::Number(0.5),
            Value::String(lua.create_string("s").unwrap()),
        ] {
            assert!(registry.register(&lua, &scalar).unwrap().is_empty());
            assert!(registry.ensure_id(&lua, &scalar).is_err());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_lookup_is_a_named_failure() {
        let lua = Lua::new();
        let registry = ObjectRegistry::new();

        let err = registry.lookup(&lua, ObjectId(999)).unwrap_err();
        match err {
            EngineError::Proxy(ProxyError::UnknownReference(id)) => assert_eq!(id, ObjectId(999)),
            other => panic!("expected UnknownReference, got {other:?}"),
        }
    }

    #[test]
    fn lookup_resolves_the_same_concrete_value() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let table = lua.create_table().unwrap();
        table.set("marker", 7).unwrap();
        let value = Value::Table(table);

        let id = registry.ensure_id(&lua, &value).unwrap();
        let resolved = registry.lookup(&lua, id).unwrap();
        match resolved {
            Value::Table(t) => assert_eq!(t.get::<i64>("marker").unwrap(), 7),
            other => panic!("expected table, got {other:?}"),
        }
    }
}
