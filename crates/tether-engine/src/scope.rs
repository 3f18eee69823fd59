//! Global-scope enumeration.
//!
//! Describes every top-level global so the control side can bootstrap: a
//! map of name → descriptor (or scalar) for variables, functions, and
//! classes.
//!
//! Plain iteration cannot see everything. Values provided through the
//! globals metatable's `__index` — the engine environment exposes host
//! info that way — never appear in `pairs(_G)`, so a fixed extras list
//! of well-known names is force-included after the walk.
//!
//! The result is memoized for the lifetime of the engine process: the
//! global scope's shape does not change at runtime, and re-describing
//! the standard library on every bootstrap would re-register nothing
//! new by identity anyway.

use crate::describe::describe;
use crate::error::EngineError;
use crate::registry::ObjectRegistry;
use mlua::{Lua, Value};
use tracing::debug;

/// Names resolved through the globals metatable that plain iteration
/// misses. Matches the host info installed by the default engine
/// environment.
pub const DEFAULT_SCOPE_EXTRAS: &[&str] = &["engine", "version", "platform"];

/// Describes the global scope as a JSON object of name → description.
///
/// Best effort: globals that cannot be described are omitted silently
/// (the describe fallback makes this rare). The dispatcher's own `rpc_*`
/// entry points and the scope table itself are excluded — they are
/// plumbing, not host surface.
pub fn map_global_scope(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    extras: &[String],
    cache: &mut Option<String>,
) -> Result<String, EngineError> {
    if let Some(encoded) = cache {
        return Ok(encoded.clone());
    }

    let globals = lua.globals();
    let mut wrappers = serde_json::Map::new();

    for pair in globals.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        let Value::String(key) = key else {
            continue;
        };
        let name = match key.to_str() {
            Ok(name) => name.to_string(),
            Err(_) => continue,
        };
        if name == "_G" || name.starts_with("rpc_") {
            continue;
        }
        if matches!(value, Value::Nil) {
            continue;
        }
        let described = describe(lua, registry, &value, &name)?;
        wrappers.insert(name, described.to_json()?);
    }

    // Names the iteration cannot see (metatable-provided values).
    for name in extras {
        if wrappers.contains_key(name) {
            continue;
        }
        let value: Value = globals.get(name.as_str())?;
        if matches!(value, Value::Nil) {
            continue;
        }
        let described = describe(lua, registry, &value, name)?;
        wrappers.insert(name.clone(), described.to_json()?);
    }

    debug!(globals = wrappers.len(), "global scope mapped");
    let encoded = serde_json::to_string(&serde_json::Value::Object(wrappers))?;
    *cache = Some(encoded.clone());
    Ok(encoded)
}
