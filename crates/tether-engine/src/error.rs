//! Error types for engine-side operations.

use tether_types::ProxyError;
use thiserror::Error;

/// Errors that can occur inside the engine half of the bridge.
///
/// Protocol failures ([`ProxyError`]) stay typed all the way to the
/// evaluation boundary so the bridge can report their error codes; Lua
/// and encoding faults are carried alongside.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Lua runtime error.
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// Named protocol failure.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Descriptor or result JSON could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EngineError {
    /// Converts into an `mlua::Error` for raising out of a dispatcher
    /// entry point.
    ///
    /// Protocol failures are attached as external errors so that
    /// [`proxy_failure`] can recover them at the evaluation boundary.
    #[must_use]
    pub fn into_lua(self) -> mlua::Error {
        match self {
            Self::Lua(e) => e,
            Self::Proxy(p) => mlua::Error::external(p),
            Self::Encode(e) => mlua::Error::external(e),
        }
    }
}

/// Recovers a typed [`ProxyError`] from an `mlua::Error` chain, if one
/// was raised by a dispatcher entry point.
#[must_use]
pub fn proxy_failure(err: &mlua::Error) -> Option<ProxyError> {
    match err {
        mlua::Error::CallbackError { cause, .. } => proxy_failure(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<ProxyError>().cloned(),
        _ => None,
    }
}

/// Formats an `mlua::Error` into a single-line message, unwrapping
/// callback layers so the callee's own text comes through.
#[must_use]
pub fn format_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::SyntaxError { message, .. } => format!("compile error: {message}"),
        _ => format!("{err}"),
    }
}
