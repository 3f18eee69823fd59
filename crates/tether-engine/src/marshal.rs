//! Conversions between wire JSON and live Lua values.
//!
//! Inbound: call arguments arrive as JSON. Anything carrying the reserved
//! remote-id field is replaced by the registry's concrete value for that
//! id — this is how a descriptor handed out by one call becomes a live
//! argument to a later one. Everything else converts structurally.
//!
//! Outbound: scalars convert to JSON directly; non-scalars go through the
//! descriptor builder instead (see [`crate::describe`]).

use crate::error::EngineError;
use crate::registry::ObjectRegistry;
use mlua::{Lua, Value};
use tether_types::{ObjectId, ProxyError, REMOTE_ID_FIELD};

/// Converts a list of inbound JSON parameters to concrete Lua values.
///
/// Sequences recurse; remote references resolve through the registry;
/// scalars pass through unchanged.
///
/// # Errors
///
/// [`ProxyError::UnknownReference`] when a remote reference names an id
/// that was never assigned.
pub fn prepare_arguments(
    lua: &Lua,
    registry: &ObjectRegistry,
    params: &[serde_json::Value],
) -> Result<Vec<Value>, EngineError> {
    params
        .iter()
        .map(|param| prepare_value(lua, registry, param))
        .collect()
}

/// Converts one inbound JSON parameter to a concrete Lua value.
pub fn prepare_value(
    lua: &Lua,
    registry: &ObjectRegistry,
    param: &serde_json::Value,
) -> Result<Value, EngineError> {
    match param {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else {
                Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(lua.create_string(s)?)),
        serde_json::Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, prepare_value(lua, registry, item)?)?;
            }
            Ok(Value::Table(table))
        }
        serde_json::Value::Object(map) => {
            if let Some(raw_id) = map.get(REMOTE_ID_FIELD) {
                let id = raw_id.as_u64().map(ObjectId).ok_or_else(|| {
                    ProxyError::EvaluationFailure(format!("malformed remote reference: {raw_id}"))
                })?;
                return registry.lookup(lua, id);
            }
            let table = lua.create_table()?;
            for (key, item) in map {
                table.raw_set(key.as_str(), prepare_value(lua, registry, item)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}

/// Converts a Lua scalar to JSON, or `None` for non-scalars.
///
/// Non-finite numbers have no JSON representation and decay to null.
pub(crate) fn scalar_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Nil => Some(serde_json::Value::Null),
        Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
        Value::Integer(i) => Some(serde_json::Value::from(*i)),
        Value::Number(n) => Some(
            serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        ),
        Value::String(s) => Some(serde_json::Value::String(
            s.to_str()
                .map_or_else(|_| "<invalid utf8>".to_string(), |s| s.to_string()),
        )),
        _ => None,
    }
}

/// Converts a Lua value to JSON structurally.
///
/// Tables with a positive raw length convert as arrays, the rest as
/// string-keyed objects. Used for raw `eval` results, where no wrapping
/// is wanted.
///
/// # Errors
///
/// Functions, userdata and other opaque values are not convertible.
pub fn lua_to_json(value: &Value) -> Result<serde_json::Value, EngineError> {
    if let Some(scalar) = scalar_to_json(value) {
        return Ok(scalar);
    }
    match value {
        Value::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut arr = Vec::with_capacity(len);
                for i in 1..=len {
                    let element: Value = table.raw_get(i)?;
                    arr.push(lua_to_json(&element)?);
                }
                Ok(serde_json::Value::Array(arr))
            } else {
                let mut map = serde_json::Map::new();
                for pair in table.clone().pairs::<String, Value>() {
                    let (key, element) = pair?;
                    map.insert(key, lua_to_json(&element)?);
                }
                Ok(serde_json::Value::Object(map))
            }
        }
        other => Err(ProxyError::ReflectionFailure(format!(
            "{} is not representable as data",
            other.type_name()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_pass_through() {
        let lua = Lua::new();
        let registry = ObjectRegistry::new();

        assert!(matches!(
            prepare_value(&lua, &registry, &json!(null)).unwrap(),
            Value::Nil
        ));
        assert!(matches!(
            prepare_value(&lua, &registry, &json!(true)).unwrap(),
            Value::Boolean(true)
        ));
        assert!(matches!(
            prepare_value(&lua, &registry, &json!(3)).unwrap(),
            Value::Integer(3)
        ));
        match prepare_value(&lua, &registry, &json!("hi")).unwrap() {
            Value::String(s) => assert_eq!(s.to_str().unwrap(), "hi"),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn remote_reference_resolves_to_concrete_value() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let table = lua.create_table().unwrap();
        table.set("tag", "original").unwrap();
        let value = Value::Table(table);
        let id = registry.ensure_id(&lua, &value).unwrap();

        let param = json!({ REMOTE_ID_FIELD: id.value(), "instanceof": "Table" });
        let resolved = prepare_value(&lua, &registry, &param).unwrap();
        match resolved {
            Value::Table(t) => assert_eq!(t.get::<String>("tag").unwrap(), "original"),
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn unknown_reference_fails_by_name() {
        let lua = Lua::new();
        let registry = ObjectRegistry::new();
        let param = json!({ REMOTE_ID_FIELD: 404 });

        let err = prepare_value(&lua, &registry, &param).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Proxy(ProxyError::UnknownReference(ObjectId(404)))
        ));
    }

    #[test]
    fn nested_sequences_recurse() {
        let lua = Lua::new();
        let mut registry = ObjectRegistry::new();
        let inner = Value::Table(lua.create_table().unwrap());
        let id = registry.ensure_id(&lua, &inner).unwrap();

        let param = json!([1, [{ REMOTE_ID_FIELD: id.value() }], "x"]);
        let prepared = prepare_value(&lua, &registry, &param).unwrap();
        let Value::Table(outer) = prepared else {
            panic!("expected table");
        };
        assert_eq!(outer.raw_len(), 3);
        let nested: Value = outer.raw_get(2).unwrap();
        let Value::Table(nested) = nested else {
            panic!("expected nested table");
        };
        let resolved: Value = nested.raw_get(1).unwrap();
        assert_eq!(
            resolved.to_pointer() as usize,
            inner.to_pointer() as usize,
            "round-tripped reference must be the same concrete value"
        );
    }

    #[test]
    fn lua_to_json_handles_arrays_and_maps() {
        let lua = Lua::new();
        let value: Value = lua.load("return {1, 2, 3}").eval().unwrap();
        assert_eq!(lua_to_json(&value).unwrap(), json!([1, 2, 3]));

        let value: Value = lua.load(r#"return { name = "doc", open = true }"#).eval().unwrap();
        assert_eq!(
            lua_to_json(&value).unwrap(),
            json!({ "name": "doc", "open": true })
        );
    }

    #[test]
    fn lua_to_json_rejects_opaque_values() {
        let lua = Lua::new();
        let value: Value = lua.load("return print").eval().unwrap();
        assert!(lua_to_json(&value).is_err());
    }
}
