//! Engine environment setup.
//!
//! Builds the Lua state the dispatcher runs in: ambient host info and a
//! trimmed standard library. Host info (`engine`, `version`, `platform`)
//! is deliberately exposed through a metatable `__index` on the globals
//! table rather than as plain globals — those names resolve normally but
//! are invisible to iteration, which is exactly the reflection gap the
//! scope enumerator's extras list exists to cover.

use crate::engine::EngineConfig;
use crate::error::EngineError;
use mlua::{Function, Lua};

/// Creates a Lua state configured for dispatching.
///
/// `os` and `io` are withdrawn unless the config opts in: remote callers
/// drive arbitrary globals, and process/filesystem access is not part of
/// the proxy surface. The `debug` library stays — parameter reflection
/// depends on it.
pub fn build_lua(config: &EngineConfig) -> Result<Lua, EngineError> {
    // Parameter reflection depends on the `debug` library, which mlua
    // classifies as unsafe and refuses to load into a safe-mode state
    // (`Lua::new`). The proxy's sandboxing rests on the instruction limit
    // and withdrawing os/io below, not on mlua's safe-mode flag, so the
    // state is created unsafe to make the full standard library — debug
    // included — available.
    // SAFETY: no C modules or FFI are loaded or exposed to dispatched code.
    let lua = unsafe { Lua::unsafe_new() };

    if !config.expose_os_io {
        lua.load("os = nil\nio = nil").exec()?;
    }

    let info = lua.create_table()?;
    for (key, value) in &config.host_info {
        info.set(key.as_str(), value.as_str())?;
    }
    let install: Function = lua
        .load("return function(info) setmetatable(_G, { __index = info }) end")
        .eval()?;
    install.call::<()>(info)?;

    Ok(lua)
}
