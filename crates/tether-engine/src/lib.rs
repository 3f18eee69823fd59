//! Engine side of the tether remote-object proxy protocol.
//!
//! Hosts live Lua values and exposes the fixed command set a control
//! process drives them with. Values never leave the engine; the control
//! side only ever sees identifiers and descriptors.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ScriptEngine                            │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  Lua state                                             │  │
//! │  │    rpc_new / rpc_get / rpc_get_index / rpc_set /       │  │
//! │  │    rpc_call / rpc_is_equal / rpc_get_global_scope      │  │
//! │  └───────────────┬────────────────────────────────────────┘  │
//! │                  │ dispatch                                  │
//! │  ┌───────────────▼───────────┐  ┌─────────────────────────┐  │
//! │  │  ObjectRegistry           │  │  describe / marshal     │  │
//! │  │  id ↔ rooted value        │◄─┤  reflection + JSON      │  │
//! │  │  id → wrapper descriptor  │  │  conversions            │  │
//! │  └───────────────────────────┘  └─────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!          ▲ evaluate(command) — one at a time, tagged outcome
//! ```
//!
//! # Execution model
//!
//! Single-threaded by construction: the Lua state is `!Send`, the
//! registry is plain owned state, and [`ScriptEngine::evaluate`] runs
//! each command to completion before the next can be submitted. No
//! locking — the guarantee is structural, not disciplinary. Porting the
//! dispatcher to a multithreaded host would require pinning it to one
//! dispatch thread (which is what `tether-rpc`'s in-process bridge
//! does).
//!
//! # Degradation over refusal
//!
//! Descriptor building never fails a call: values that resist
//! introspection come back as minimal enumerator descriptors, with the
//! unexpected cases logged and counted (see
//! [`ObjectRegistry::reflection_failures`]).

mod describe;
mod dispatch;
mod engine;
mod env;
mod error;
mod marshal;
mod registry;
mod scope;

pub use describe::{describe, Described};
pub use dispatch::{call, get_index, get_property, install, is_equal, new_instance, set_property};
pub use engine::{EngineConfig, ScriptEngine};
pub use error::{format_lua_error, proxy_failure, EngineError};
pub use marshal::{lua_to_json, prepare_arguments, prepare_value};
pub use registry::ObjectRegistry;
pub use scope::{map_global_scope, DEFAULT_SCOPE_EXTRAS};
