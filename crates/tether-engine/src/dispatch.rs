//! The engine command dispatcher.
//!
//! The fixed operation set the control side can drive. Each operation is
//! a function of the Lua state, the registry, and its arguments; each
//! returns encoded descriptor/scalar JSON or fails with a named
//! [`ProxyError`](tether_types::ProxyError).
//!
//! [`install`] publishes the operations into the Lua state as `rpc_*`
//! globals, so that the evaluation bridge's command text
//! (`rpc_get(1,"title")`) is parsed and executed by the engine itself.
//! Structured arguments travel as JSON in string position and are parsed
//! back out here.
//!
//! Engine-native access goes through compiled one-liner chunks (`o[k]`,
//! `o[k] = v`, `a == b`) rather than raw table APIs, so `__index`,
//! `__newindex` and `__eq` metamethods are honored for tables and
//! userdata alike.
//!
//! The entry points do not nest: a callable invoked through `call` must
//! not itself invoke an `rpc_*` global. Commands are submitted one at a
//! time and never recurse, so this does not arise in operation.

use crate::describe::{describe, Described};
use crate::engine::EngineConfig;
use crate::error::{format_lua_error, EngineError};
use crate::marshal;
use crate::registry::ObjectRegistry;
use crate::scope;
use mlua::{Function, Lua, MultiValue, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tether_types::{EqualityOperand, ObjectId, ProxyError};

/// Constructs a zero-argument instance of the named global type.
///
/// Three constructor conventions are recognized: a plain function, a
/// callable table (`__call`), and a class table with a `new` field
/// (invoked colon-style, with the class as implicit receiver).
/// Construction with arguments is not supported.
///
/// # Errors
///
/// [`ProxyError::UnknownType`] when the global is absent or none of the
/// conventions apply; [`ProxyError::InvocationError`] when the
/// constructor itself fails.
pub fn new_instance(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    type_name: &str,
) -> Result<String, EngineError> {
    let target: Value = lua.globals().get(type_name)?;
    let instance: Value = match target {
        Value::Function(ctor) => ctor
            .call(())
            .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)))?,
        Value::Table(class) => {
            let class_value = Value::Table(class.clone());
            if is_callable(lua, &class_value)? {
                let invoke: Function = lua.load("return function(c) return c() end").eval()?;
                invoke
                    .call(class_value)
                    .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)))?
            } else {
                match class.get::<Value>("new")? {
                    Value::Function(ctor) => ctor
                        .call(class_value)
                        .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)))?,
                    _ => return Err(ProxyError::UnknownType(type_name.to_string()).into()),
                }
            }
        }
        _ => return Err(ProxyError::UnknownType(type_name.to_string()).into()),
    };

    let described = describe(lua, registry, &instance, type_name)?;
    encode(&described)
}

/// Reads a named property and wraps the result.
///
/// A property that resolves to `nil` is a legitimate scalar null, not a
/// failure.
pub fn get_property(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    id: ObjectId,
    name: &str,
) -> Result<String, EngineError> {
    let object = registry.lookup(lua, id)?;
    let value = index_read(lua, object, Value::String(lua.create_string(name)?))?;
    let described = describe(lua, registry, &value, name)?;
    encode(&described)
}

/// Reads an indexed element and wraps the result.
///
/// # Errors
///
/// [`ProxyError::IndexOutOfRange`] when the element resolves to `nil` —
/// iterating callers use this as the end-of-sequence condition.
pub fn get_index(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    id: ObjectId,
    index: i64,
) -> Result<String, EngineError> {
    let object = registry.lookup(lua, id)?;
    let value = index_read(lua, object, Value::Integer(index))?;
    if matches!(value, Value::Nil) {
        return Err(ProxyError::IndexOutOfRange { id, index }.into());
    }
    let described = describe(lua, registry, &value, &index.to_string())?;
    encode(&described)
}

/// Assigns a property. The value arrives as JSON text; remote references
/// in it are resolved to their concrete values before assignment.
pub fn set_property(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    id: ObjectId,
    name: &str,
    value_json: &str,
) -> Result<(), EngineError> {
    let object = registry.lookup(lua, id)?;
    let value: serde_json::Value = serde_json::from_str(value_json)?;
    let concrete = marshal::prepare_value(lua, registry, &value)?;
    let setter: Function = lua.load("return function(o, k, v) o[k] = v end").eval()?;
    setter
        .call::<()>((object, name, concrete))
        .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)))?;
    Ok(())
}

/// Invokes a registered callable.
///
/// With a receiver, the callable is resolved by name on the receiver and
/// invoked colon-style (`receiver[name](receiver, …)`), so overrides on
/// the receiver win. Without one, the registered concrete callable is
/// invoked as a free function.
///
/// Returns `None` when the callable produced no result — distinct from
/// an explicit `nil`, which wraps to the scalar null.
pub fn call(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    id: ObjectId,
    params: &[serde_json::Value],
    receiver: Option<ObjectId>,
) -> Result<Option<String>, EngineError> {
    let callee = registry.lookup(lua, id)?;
    let callee_name = registry.lookup_wrapper(id)?.name().to_string();
    let args = marshal::prepare_arguments(lua, registry, params)?;

    let results: MultiValue = match receiver {
        Some(parent_id) => {
            let parent = registry.lookup(lua, parent_id)?;
            let invoke: Function = lua
                .load("return function(parent, name, ...) return parent[name](parent, ...) end")
                .eval()?;
            let mut full = Vec::with_capacity(args.len() + 2);
            full.push(parent);
            full.push(Value::String(lua.create_string(&callee_name)?));
            full.extend(args);
            invoke
                .call(MultiValue::from_iter(full))
                .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)))?
        }
        None => {
            let Value::Function(function) = callee else {
                return Err(ProxyError::InvocationError(format!(
                    "{id} ({callee_name}) is not callable"
                ))
                .into());
            };
            function
                .call(MultiValue::from_iter(args))
                .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)))?
        }
    };

    match results.into_iter().next() {
        None => Ok(None),
        Some(value) => {
            let described = describe(lua, registry, &value, &callee_name)?;
            Ok(Some(encode(&described)?))
        }
    }
}

/// Compares two operands with the engine's native equality.
///
/// Wrapped operands resolve through the registry first. Native `==`
/// means value equality for scalars, reference equality for plain
/// tables, and `__eq` metamethods where defined.
pub fn is_equal(
    lua: &Lua,
    registry: &ObjectRegistry,
    left: &EqualityOperand,
    right: &EqualityOperand,
) -> Result<bool, EngineError> {
    let lhs = resolve_operand(lua, registry, left)?;
    let rhs = resolve_operand(lua, registry, right)?;
    let compare: Function = lua.load("return function(a, b) return a == b end").eval()?;
    Ok(compare.call::<bool>((lhs, rhs))?)
}

/// Installs the dispatcher entry points as `rpc_*` globals.
///
/// Creates the registry and hands ownership back to the caller; the
/// closures share it through the returned handle, keeping its lifetime
/// visible instead of burying it in interpreter state.
pub fn install(
    lua: &Lua,
    config: &EngineConfig,
) -> Result<Rc<RefCell<ObjectRegistry>>, EngineError> {
    let registry = Rc::new(RefCell::new(ObjectRegistry::new()));
    let scope_cache: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let globals = lua.globals();

    let reg = Rc::clone(&registry);
    globals.set(
        "rpc_new",
        lua.create_function(move |lua, type_name: String| {
            new_instance(lua, &mut reg.borrow_mut(), &type_name).map_err(EngineError::into_lua)
        })?,
    )?;

    let reg = Rc::clone(&registry);
    globals.set(
        "rpc_get",
        lua.create_function(move |lua, (id, name): (i64, String)| {
            get_property(lua, &mut reg.borrow_mut(), to_id(id)?, &name)
                .map_err(EngineError::into_lua)
        })?,
    )?;

    let reg = Rc::clone(&registry);
    globals.set(
        "rpc_get_index",
        lua.create_function(move |lua, (id, index): (i64, i64)| {
            get_index(lua, &mut reg.borrow_mut(), to_id(id)?, index).map_err(EngineError::into_lua)
        })?,
    )?;

    let reg = Rc::clone(&registry);
    globals.set(
        "rpc_set",
        lua.create_function(move |lua, (id, name, value_json): (i64, String, String)| {
            set_property(lua, &mut reg.borrow_mut(), to_id(id)?, &name, &value_json)
                .map_err(EngineError::into_lua)
        })?,
    )?;

    let reg = Rc::clone(&registry);
    globals.set(
        "rpc_call",
        lua.create_function(
            move |lua, (id, params_json, parent): (i64, String, Option<i64>)| {
                let params: Vec<serde_json::Value> = serde_json::from_str(&params_json)
                    .map_err(|e| EngineError::from(e).into_lua())?;
                let receiver = parent.map(to_id).transpose()?;
                call(lua, &mut reg.borrow_mut(), to_id(id)?, &params, receiver)
                    .map_err(EngineError::into_lua)
            },
        )?,
    )?;

    let reg = Rc::clone(&registry);
    globals.set(
        "rpc_is_equal",
        lua.create_function(move |lua, operands_json: String| {
            let (left, right): (EqualityOperand, EqualityOperand) =
                serde_json::from_str(&operands_json)
                    .map_err(|e| EngineError::from(e).into_lua())?;
            let result = is_equal(lua, &reg.borrow(), &left, &right)
                .map_err(EngineError::into_lua)?;
            serde_json::to_string(&result).map_err(|e| EngineError::from(e).into_lua())
        })?,
    )?;

    let reg = Rc::clone(&registry);
    let extras: Vec<String> = config.scope_extras.clone();
    globals.set(
        "rpc_get_global_scope",
        lua.create_function(move |lua, ()| {
            scope::map_global_scope(lua, &mut reg.borrow_mut(), &extras, &mut scope_cache.borrow_mut())
                .map_err(EngineError::into_lua)
        })?,
    )?;

    Ok(registry)
}

/// Engine-native index read through `o[k]`, honoring `__index`.
fn index_read(lua: &Lua, object: Value, key: Value) -> Result<Value, EngineError> {
    let getter: Function = lua.load("return function(o, k) return o[k] end").eval()?;
    getter
        .call((object, key))
        .map_err(|e| ProxyError::InvocationError(format_lua_error(&e)).into())
}

/// Whether a value is callable, either directly or through `__call`.
fn is_callable(lua: &Lua, value: &Value) -> Result<bool, EngineError> {
    let probe: Function = lua
        .load(
            r#"
            return function(v)
                if type(v) == "function" then return true end
                local mt = getmetatable(v)
                return mt ~= nil and mt.__call ~= nil
            end
            "#,
        )
        .eval()?;
    Ok(probe.call::<bool>(value.clone())?)
}

fn resolve_operand(
    lua: &Lua,
    registry: &ObjectRegistry,
    operand: &EqualityOperand,
) -> Result<Value, EngineError> {
    if operand.is_wrapped {
        let id = operand.value.as_u64().map(ObjectId).ok_or_else(|| {
            ProxyError::EvaluationFailure(format!("malformed operand id: {}", operand.value))
        })?;
        registry.lookup(lua, id)
    } else {
        marshal::prepare_value(lua, registry, &operand.value)
    }
}

fn encode(described: &Described) -> Result<String, EngineError> {
    Ok(serde_json::to_string(&described.to_json()?)?)
}

fn to_id(raw: i64) -> Result<ObjectId, mlua::Error> {
    ObjectId::from_raw(raw).ok_or_else(|| {
        EngineError::from(ProxyError::EvaluationFailure(format!("invalid id: {raw}"))).into_lua()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_types::{Descriptor, REMOTE_ID_FIELD};

    /// A Doc class in the three-convention style the dispatcher supports.
    const DOC_CLASS: &str = r#"
        Doc = { __name = "Doc" }
        Doc.__index = Doc
        function Doc.new(class)
            return setmetatable({ title = "untitled", open = true }, Doc)
        end
        function Doc:close()
            self.open = false
        end
        function greet(name)
            return "hello " .. name
        end
    "#;

    fn setup() -> (Lua, ObjectRegistry) {
        let lua = Lua::new();
        lua.load(DOC_CLASS).exec().unwrap();
        (lua, ObjectRegistry::new())
    }

    fn decode(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn new_wraps_and_registers_the_instance() {
        let (lua, mut registry) = setup();
        let text = new_instance(&lua, &mut registry, "Doc").unwrap();
        let json = decode(&text);
        assert_eq!(json["instanceof"], "Doc");
        assert!(json[REMOTE_ID_FIELD].is_u64());
        let properties: Vec<String> =
            serde_json::from_value(json["properties"].clone()).unwrap();
        assert!(properties.contains(&"title".to_string()));
    }

    #[test]
    fn new_of_unknown_global_fails_by_name() {
        let (lua, mut registry) = setup();
        let err = new_instance(&lua, &mut registry, "Missing").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Proxy(ProxyError::UnknownType(name)) if name == "Missing"
        ));
    }

    #[test]
    fn new_of_non_constructible_global_fails_by_name() {
        let (lua, mut registry) = setup();
        lua.load("flag = true").exec().unwrap();
        let err = new_instance(&lua, &mut registry, "flag").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Proxy(ProxyError::UnknownType(_))
        ));
    }

    #[test]
    fn get_reads_scalars_by_value() {
        let (lua, mut registry) = setup();
        let doc = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let id = ObjectId(doc[REMOTE_ID_FIELD].as_u64().unwrap());

        let text = get_property(&lua, &mut registry, id, "title").unwrap();
        assert_eq!(decode(&text), json!("untitled"));
    }

    #[test]
    fn get_of_missing_property_is_scalar_null() {
        let (lua, mut registry) = setup();
        let doc = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let id = ObjectId(doc[REMOTE_ID_FIELD].as_u64().unwrap());

        let text = get_property(&lua, &mut registry, id, "nope").unwrap();
        assert_eq!(decode(&text), json!(null));
    }

    #[test]
    fn get_on_unknown_reference_fails_by_name() {
        let (lua, mut registry) = setup();
        let err = get_property(&lua, &mut registry, ObjectId(999), "x").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Proxy(ProxyError::UnknownReference(ObjectId(999)))
        ));
    }

    #[test]
    fn set_then_get_round_trips() {
        let (lua, mut registry) = setup();
        let doc = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let id = ObjectId(doc[REMOTE_ID_FIELD].as_u64().unwrap());

        set_property(&lua, &mut registry, id, "title", "\"a\"").unwrap();
        let text = get_property(&lua, &mut registry, id, "title").unwrap();
        assert_eq!(decode(&text), json!("a"));
    }

    #[test]
    fn set_accepts_remote_references() {
        let (lua, mut registry) = setup();
        let first = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let second = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let first_id = ObjectId(first[REMOTE_ID_FIELD].as_u64().unwrap());

        // Assign the second doc as a property of the first, by reference.
        set_property(
            &lua,
            &mut registry,
            first_id,
            "sibling",
            &second.to_string(),
        )
        .unwrap();

        // Reading it back yields the same registry id, not a copy.
        let text = get_property(&lua, &mut registry, first_id, "sibling").unwrap();
        let readback = decode(&text);
        assert_eq!(readback[REMOTE_ID_FIELD], second[REMOTE_ID_FIELD]);
    }

    #[test]
    fn get_index_walks_sequences_and_ends_by_name() {
        let (lua, mut registry) = setup();
        lua.load("queue = { 10, 20 }").exec().unwrap();
        let queue: Value = lua.globals().get("queue").unwrap();
        let id = registry.ensure_id(&lua, &queue).unwrap();

        let first = get_index(&lua, &mut registry, id, 1).unwrap();
        assert_eq!(decode(&first), json!(10));

        let err = get_index(&lua, &mut registry, id, 3).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Proxy(ProxyError::IndexOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn bound_call_affects_only_the_receiver() {
        let (lua, mut registry) = setup();
        let first = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let second = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let first_id = ObjectId(first[REMOTE_ID_FIELD].as_u64().unwrap());
        let second_id = ObjectId(second[REMOTE_ID_FIELD].as_u64().unwrap());
        let close_id = ObjectId(first["methods"]["close"][REMOTE_ID_FIELD].as_u64().unwrap());

        let result = call(&lua, &mut registry, close_id, &[], Some(first_id)).unwrap();
        assert!(result.is_none(), "close returns nothing");

        let first_open = decode(&get_property(&lua, &mut registry, first_id, "open").unwrap());
        let second_open = decode(&get_property(&lua, &mut registry, second_id, "open").unwrap());
        assert_eq!(first_open, json!(false));
        assert_eq!(second_open, json!(true));
    }

    #[test]
    fn free_call_passes_arguments_and_wraps_result() {
        let (lua, mut registry) = setup();
        let greet: Value = lua.globals().get("greet").unwrap();
        let described = describe(&lua, &mut registry, &greet, "greet").unwrap();
        let id = described.as_wrapped().unwrap().id();

        let result = call(&lua, &mut registry, id, &[json!("world")], None)
            .unwrap()
            .unwrap();
        assert_eq!(decode(&result), json!("hello world"));
    }

    #[test]
    fn failing_callee_surfaces_as_invocation_error() {
        let (lua, mut registry) = setup();
        lua.load(r#"function explode() error("kaboom") end"#).exec().unwrap();
        let f: Value = lua.globals().get("explode").unwrap();
        let described = describe(&lua, &mut registry, &f, "explode").unwrap();
        let id = described.as_wrapped().unwrap().id();

        let err = call(&lua, &mut registry, id, &[], None).unwrap_err();
        match err {
            EngineError::Proxy(ProxyError::InvocationError(msg)) => {
                assert!(msg.contains("kaboom"), "got: {msg}");
            }
            other => panic!("expected InvocationError, got {other:?}"),
        }
    }

    #[test]
    fn is_equal_uses_reference_identity_for_objects() {
        let (lua, mut registry) = setup();
        let first = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let second = decode(&new_instance(&lua, &mut registry, "Doc").unwrap());
        let first_id = ObjectId(first[REMOTE_ID_FIELD].as_u64().unwrap());
        let second_id = ObjectId(second[REMOTE_ID_FIELD].as_u64().unwrap());

        let same = is_equal(
            &lua,
            &registry,
            &EqualityOperand::wrapped(first_id),
            &EqualityOperand::wrapped(first_id),
        )
        .unwrap();
        assert!(same);

        let different = is_equal(
            &lua,
            &registry,
            &EqualityOperand::wrapped(first_id),
            &EqualityOperand::wrapped(second_id),
        )
        .unwrap();
        assert!(!different);
    }

    #[test]
    fn is_equal_uses_value_equality_for_scalars() {
        let (lua, registry) = setup();
        let equal = is_equal(
            &lua,
            &registry,
            &EqualityOperand::literal(json!("a")),
            &EqualityOperand::literal(json!("a")),
        )
        .unwrap();
        assert!(equal);

        let unequal = is_equal(
            &lua,
            &registry,
            &EqualityOperand::literal(json!(1)),
            &EqualityOperand::literal(json!(2)),
        )
        .unwrap();
        assert!(!unequal);
    }

    #[test]
    fn installed_entry_points_run_from_command_text() {
        let lua = Lua::new();
        lua.load(DOC_CLASS).exec().unwrap();
        let registry = install(&lua, &EngineConfig::default()).unwrap();

        let text: String = lua.load(r#"return rpc_new("Doc")"#).eval().unwrap();
        let doc = decode(&text);
        assert_eq!(doc["instanceof"], "Doc");
        assert!(registry.borrow().contains(ObjectId(
            doc[REMOTE_ID_FIELD].as_u64().unwrap()
        )));

        let id = doc[REMOTE_ID_FIELD].as_u64().unwrap();
        let title: String = lua
            .load(format!(r#"return rpc_get({id},"title")"#))
            .eval()
            .unwrap();
        assert_eq!(decode(&title), json!("untitled"));
    }

    #[test]
    fn call_result_round_trips_as_argument() {
        // The round-trip property: an object returned from one call, fed
        // back by descriptor, resolves to the same concrete value.
        let (lua, mut registry) = setup();
        lua.load(
            r#"
            function make()
                current = { stamp = 99 }
                return current
            end
            function check(candidate)
                return candidate == current
            end
            "#,
        )
        .exec()
        .unwrap();

        let make: Value = lua.globals().get("make").unwrap();
        let make_id = describe(&lua, &mut registry, &make, "make")
            .unwrap()
            .as_wrapped()
            .unwrap()
            .id();
        let check: Value = lua.globals().get("check").unwrap();
        let check_id = describe(&lua, &mut registry, &check, "check")
            .unwrap()
            .as_wrapped()
            .unwrap()
            .id();

        let made = decode(&call(&lua, &mut registry, make_id, &[], None).unwrap().unwrap());
        let result = call(&lua, &mut registry, check_id, &[made], None)
            .unwrap()
            .unwrap();
        assert_eq!(decode(&result), json!(true));
    }
}
