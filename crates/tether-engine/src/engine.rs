//! The engine runtime: one Lua state, one registry, one command at a time.

use crate::dispatch;
use crate::env;
use crate::error::{format_lua_error, proxy_failure, EngineError};
use crate::marshal;
use crate::registry::ObjectRegistry;
use crate::scope::DEFAULT_SCOPE_EXTRAS;
use mlua::{HookTriggers, Lua, MultiValue, Value};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tether_types::{EvalFailure, EvalOutcome};
use tracing::trace;

/// Engine-side configuration.
///
/// Deserializable with full defaults, so an empty config table is a
/// valid one.
///
/// # Example
///
/// ```
/// use tether_engine::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config.instruction_limit, Some(1_000_000));
/// assert!(!config.expose_os_io);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Globals force-included in the scope map even though iteration
    /// cannot see them (metatable-provided names).
    pub scope_extras: Vec<String>,
    /// Abort evaluation after this many Lua instructions. `None` removes
    /// the bound entirely.
    pub instruction_limit: Option<u32>,
    /// Keep the `os` and `io` libraries available to dispatched code.
    pub expose_os_io: bool,
    /// Host info exposed through the globals metatable.
    pub host_info: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut host_info = BTreeMap::new();
        host_info.insert("engine".to_string(), "tether".to_string());
        host_info.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        host_info.insert("platform".to_string(), std::env::consts::OS.to_string());
        Self {
            scope_extras: DEFAULT_SCOPE_EXTRAS.iter().map(|s| (*s).to_string()).collect(),
            instruction_limit: Some(1_000_000),
            expose_os_io: false,
            host_info,
        }
    }
}

/// The engine half of the bridge.
///
/// Owns the Lua state and the object registry, with the dispatcher's
/// `rpc_*` entry points installed. [`evaluate`](Self::evaluate) is the
/// engine side of the evaluation-bridge contract: one textual command
/// in, exactly one tagged outcome out, never two commands at once —
/// `ScriptEngine` is not `Send` and lives on whichever single thread
/// created it, which is what makes the lock-free registry sound.
///
/// # Example
///
/// ```ignore
/// use tether_engine::ScriptEngine;
///
/// let engine = ScriptEngine::new()?;
/// engine.lua().load(r#"function greet() return "hi" end"#).exec()?;
///
/// let scope = engine.evaluate("return rpc_get_global_scope()")?;
/// ```
pub struct ScriptEngine {
    lua: Lua,
    registry: Rc<RefCell<ObjectRegistry>>,
    config: EngineConfig,
}

impl ScriptEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let lua = env::build_lua(&config)?;
        let registry = dispatch::install(&lua, &config)?;
        Ok(Self {
            lua,
            registry,
            config,
        })
    }

    /// The underlying Lua state, for seeding host objects and classes.
    #[must_use]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// The shared object registry.
    #[must_use]
    pub fn registry(&self) -> &Rc<RefCell<ObjectRegistry>> {
        &self.registry
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates one command and reports its single outcome.
    ///
    /// A `nil` result means the command produced no payload (distinct
    /// from the dispatcher returning the JSON text `"null"`). Failures
    /// come back tagged: dispatcher failures keep their protocol error
    /// codes, anything else is an evaluation failure. A failed command
    /// leaves the engine and the registry intact — the next command
    /// proceeds normally.
    pub fn evaluate(&self, command: &str) -> EvalOutcome {
        trace!(command, "evaluating");

        if let Some(limit) = self.config.instruction_limit {
            self.lua.set_hook(
                HookTriggers::new().every_nth_instruction(limit),
                move |_lua, _debug| {
                    Err(mlua::Error::RuntimeError(format!(
                        "instruction limit exceeded ({limit})"
                    )))
                },
            );
        }

        let result: mlua::Result<MultiValue> = self.lua.load(command).set_name("=rpc").eval();

        if self.config.instruction_limit.is_some() {
            self.lua.remove_hook();
        }

        match result {
            Ok(values) => match values.into_iter().next() {
                None | Some(Value::Nil) => Ok(None),
                Some(Value::String(s)) => Ok(Some(
                    s.to_str()
                        .map_or_else(|_| "<invalid utf8>".to_string(), |s| s.to_string()),
                )),
                Some(other) => Ok(Some(value_text(&other))),
            },
            Err(err) => Err(match proxy_failure(&err) {
                Some(proxy) => EvalFailure::from(&proxy),
                None => EvalFailure::evaluation(format_lua_error(&err)),
            }),
        }
    }
}

/// Renders a non-string evaluation result as text: structural JSON where
/// possible, a type tag otherwise.
fn value_text(value: &Value) -> String {
    match marshal::lua_to_json(value) {
        Ok(json) => json.to_string(),
        Err(_) => format!("<{}>", value.type_name()),
    }
}
