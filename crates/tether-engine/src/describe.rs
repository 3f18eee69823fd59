//! The descriptor builder.
//!
//! Turns live Lua values into serializable descriptors using the engine's
//! own reflection facilities:
//!
//! - table iteration for properties and methods
//! - the metatable's `__index` table for class-style methods
//! - the metatable's `__name` for the declared type name
//! - the `debug` library for callable parameter names and arity
//!
//! `describe` is total: it never refuses a value. Scalars pass through
//! unwrapped, sequences describe element-wise, and anything that resists
//! introspection degrades to the minimal enumerator descriptor. The
//! expected degradation (a value that can be indexed but not enumerated)
//! is logged at debug level; an unexpected introspection fault is logged
//! at warn level and counted on the registry, because silently collapsing
//! those two cases is how real reflection bugs stay hidden.

use crate::error::EngineError;
use crate::marshal;
use crate::registry::ObjectRegistry;
use mlua::{Function, Lua, Table, Value};
use std::collections::BTreeMap;
use tether_types::{
    ArgumentDescriptor, Descriptor, EnumeratorDescriptor, FunctionDescriptor, MethodDescriptor,
    ObjectDescriptor,
};
use tracing::{debug, warn};

/// Reflection helper compiled on demand: parameter names and vararg flag
/// of a callable, via `debug.getinfo` / `debug.getlocal`. Degrades to an
/// empty list when the `debug` library is unavailable.
const PARAM_REFLECT: &str = r#"
return function(f)
    if type(debug) ~= "table" or type(debug.getinfo) ~= "function" then
        return {}, false
    end
    local info = debug.getinfo(f, "u")
    local names = {}
    for i = 1, info.nparams do
        local n = debug.getlocal(f, i)
        names[#names + 1] = n or ("arg" .. i)
    end
    return names, info.isvararg
end
"#;

/// The result of describing a value.
///
/// Mirrors the three shapes that can cross the boundary: a scalar by
/// value, a wrapped reference, or a sequence of either.
#[derive(Debug, Clone, PartialEq)]
pub enum Described {
    /// A scalar, passed by value and never registered.
    Scalar(serde_json::Value),
    /// A registered value with its descriptor.
    Wrapped(Descriptor),
    /// Element-wise described sequence; the sequence itself has no id.
    Sequence(Vec<Described>),
}

impl Described {
    /// The wire JSON for this description.
    pub fn to_json(&self) -> Result<serde_json::Value, EngineError> {
        match self {
            Self::Scalar(v) => Ok(v.clone()),
            Self::Wrapped(d) => Ok(serde_json::to_value(d)?),
            Self::Sequence(items) => items
                .iter()
                .map(Described::to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
        }
    }

    /// The descriptor, when this wrapped a single reference value.
    #[must_use]
    pub fn as_wrapped(&self) -> Option<&Descriptor> {
        match self {
            Self::Wrapped(d) => Some(d),
            _ => None,
        }
    }
}

/// Describes a value, registering every reference value it touches.
///
/// `fallback_name` is recorded as the descriptor name; it is the property
/// name, global name, or type name of whatever context produced the
/// value.
pub fn describe(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    value: &Value,
    fallback_name: &str,
) -> Result<Described, EngineError> {
    if let Some(scalar) = marshal::scalar_to_json(value) {
        return Ok(Described::Scalar(scalar));
    }

    match value {
        Value::Function(f) => {
            let descriptor = describe_function(lua, registry, f, fallback_name)?;
            Ok(Described::Wrapped(descriptor))
        }
        Value::Table(table) if table.raw_len() > 0 => {
            let len = table.raw_len();
            let mut items = Vec::with_capacity(len);
            for i in 1..=len {
                let element: Value = table.raw_get(i)?;
                items.push(describe(lua, registry, &element, &format!("{fallback_name}[{i}]"))?);
            }
            Ok(Described::Sequence(items))
        }
        Value::Table(table) => match describe_table(lua, registry, table, fallback_name) {
            Ok(descriptor) => Ok(Described::Wrapped(descriptor)),
            Err(err) => {
                registry.note_reflection_failure();
                warn!(name = fallback_name, error = %err, "table introspection failed, degrading to enumerator");
                enumerator_fallback(lua, registry, value, fallback_name)
            }
        },
        other => describe_opaque(lua, registry, other, fallback_name),
    }
}

/// Builds a function descriptor, registering the callable.
fn describe_function(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    function: &Function,
    name: &str,
) -> Result<Descriptor, EngineError> {
    let id = registry.ensure_id(lua, &Value::Function(function.clone()))?;
    let mut descriptor = FunctionDescriptor::new(name, id);
    descriptor.arguments = reflect_parameters(lua, function).unwrap_or_else(|err| {
        debug!(name, error = %err, "parameter reflection unavailable");
        Vec::new()
    });
    let descriptor = Descriptor::Function(descriptor);
    registry.attach_wrapper(id, descriptor.clone());
    Ok(descriptor)
}

/// Full reflective introspection of a non-sequence table.
fn describe_table(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    table: &Table,
    name: &str,
) -> Result<Descriptor, EngineError> {
    let id = registry.ensure_id(lua, &Value::Table(table.clone()))?;

    let mut properties = Vec::new();
    let mut methods = BTreeMap::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, element) = pair?;
        let Some(key_name) = key_to_name(&key) else {
            continue;
        };
        match element {
            Value::Function(f) => {
                let method = describe_method(lua, registry, &f, &key_name)?;
                methods.insert(key_name, method);
            }
            _ => properties.push(key_name),
        }
    }

    let mut instance_of = "Table".to_string();
    let mut description = String::new();
    let mut help = String::new();
    if let Some(metatable) = value_metatable(lua, &Value::Table(table.clone()))? {
        if let Value::String(s) = metatable.raw_get::<Value>("__name")? {
            instance_of = s.to_str()?.to_string();
        }
        if let Value::String(s) = metatable.raw_get::<Value>("__doc")? {
            description = s.to_str()?.to_string();
        }
        if let Value::String(s) = metatable.raw_get::<Value>("__help")? {
            help = s.to_str()?.to_string();
        }
        // Class-style methods live on the metatable's __index table.
        if let Value::Table(index) = metatable.raw_get::<Value>("__index")? {
            for pair in index.pairs::<Value, Value>() {
                let (key, element) = pair?;
                let Some(key_name) = key_to_name(&key) else {
                    continue;
                };
                if let Value::Function(f) = element {
                    if !methods.contains_key(&key_name) {
                        let method = describe_method(lua, registry, &f, &key_name)?;
                        methods.insert(key_name, method);
                    }
                }
            }
        }
    }

    properties.sort();
    let descriptor = Descriptor::Object(ObjectDescriptor {
        name: name.to_string(),
        id,
        description,
        help,
        instance_of,
        properties,
        methods,
    });
    registry.attach_wrapper(id, descriptor.clone());
    Ok(descriptor)
}

/// Builds a method descriptor, registering the method's function value so
/// bound calls can address it.
fn describe_method(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    function: &Function,
    name: &str,
) -> Result<MethodDescriptor, EngineError> {
    let id = registry.ensure_id(lua, &Value::Function(function.clone()))?;
    let mut method = MethodDescriptor::new(name, id);
    method.arguments = reflect_parameters(lua, function).unwrap_or_default();
    registry.attach_wrapper(
        id,
        Descriptor::Function(FunctionDescriptor {
            arguments: method.arguments.clone(),
            ..FunctionDescriptor::new(name, id)
        }),
    );
    Ok(method)
}

/// Describes userdata and other opaque values.
///
/// A metatable whose `__index` is a table is reflectable enough for an
/// object descriptor. An `__index` function — indexable but not
/// enumerable — is the expected enumerator case. Anything that faults
/// during inspection degrades the same way, with the louder diagnostics.
fn describe_opaque(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    value: &Value,
    name: &str,
) -> Result<Described, EngineError> {
    let degraded = match reflect_opaque(lua, registry, value, name) {
        Ok(Some(descriptor)) => return Ok(Described::Wrapped(descriptor)),
        Ok(None) => {
            debug!(name, kind = value.type_name(), "value is enumerable but not reflectable");
            enumerator_fallback(lua, registry, value, name)
        }
        Err(err) => {
            registry.note_reflection_failure();
            warn!(name, kind = value.type_name(), error = %err, "introspection failed, degrading to enumerator");
            enumerator_fallback(lua, registry, value, name)
        }
    };
    // Values with no registrable identity still must not fail the call.
    degraded.or_else(|err| {
        warn!(name, kind = value.type_name(), error = %err, "value is not registrable, passing null");
        Ok(Described::Scalar(serde_json::Value::Null))
    })
}

/// Attempts metatable-driven introspection of an opaque value.
///
/// Returns `Ok(None)` for the expected not-reflectable case.
fn reflect_opaque(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    value: &Value,
    name: &str,
) -> Result<Option<Descriptor>, EngineError> {
    let Some(metatable) = value_metatable(lua, value)? else {
        return Ok(None);
    };
    let index: Value = metatable.raw_get("__index")?;
    let Value::Table(index) = index else {
        // Indexable through a function, or not indexable at all.
        return Ok(None);
    };

    let id = registry.ensure_id(lua, value)?;
    let mut instance_of = value.type_name().to_string();
    if let Value::String(s) = metatable.raw_get::<Value>("__name")? {
        instance_of = s.to_str()?.to_string();
    }

    let mut methods = BTreeMap::new();
    for pair in index.pairs::<Value, Value>() {
        let (key, element) = pair?;
        let Some(key_name) = key_to_name(&key) else {
            continue;
        };
        if let Value::Function(f) = element {
            let method = describe_method(lua, registry, &f, &key_name)?;
            methods.insert(key_name, method);
        }
    }

    let descriptor = Descriptor::Object(ObjectDescriptor {
        name: name.to_string(),
        id,
        description: String::new(),
        help: String::new(),
        instance_of,
        properties: Vec::new(),
        methods,
    });
    registry.attach_wrapper(id, descriptor.clone());
    Ok(Some(descriptor))
}

/// Registers a value under the minimal enumerator shape.
fn enumerator_fallback(
    lua: &Lua,
    registry: &mut ObjectRegistry,
    value: &Value,
    name: &str,
) -> Result<Described, EngineError> {
    let id = registry.ensure_id(lua, value)?;
    let descriptor = Descriptor::Enumerator(EnumeratorDescriptor::new(name, id));
    registry.attach_wrapper(id, descriptor.clone());
    Ok(Described::Wrapped(descriptor))
}

/// Reflects a callable's declared parameters.
fn reflect_parameters(lua: &Lua, function: &Function) -> Result<Vec<ArgumentDescriptor>, EngineError> {
    let helper: Function = lua.load(PARAM_REFLECT).eval()?;
    let (names, is_vararg): (Vec<String>, bool) = helper.call(function.clone())?;
    let mut arguments: Vec<ArgumentDescriptor> =
        names.into_iter().map(ArgumentDescriptor::named).collect();
    if is_vararg {
        arguments.push(ArgumentDescriptor::named("..."));
    }
    Ok(arguments)
}

/// The engine's `getmetatable`, honoring `__metatable` protection (a
/// protected metatable reads as opaque, which is the point).
fn value_metatable(lua: &Lua, value: &Value) -> Result<Option<Table>, EngineError> {
    let getter: Function = lua.load("return function(o) return getmetatable(o) end").eval()?;
    match getter.call::<Value>(value.clone())? {
        Value::Table(t) => Ok(Some(t)),
        _ => Ok(None),
    }
}

/// Table keys usable as descriptor names: strings as-is, integers
/// stringified, anything else skipped.
fn key_to_name(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => s.to_str().ok().map(|s| s.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}
