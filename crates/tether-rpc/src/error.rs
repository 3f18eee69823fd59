//! Control-side error types.

use tether_types::{ErrorCode, EvalFailure, WireError};
use thiserror::Error;

/// Errors a remote call can resolve with on the control side.
///
/// # Variants
///
/// | Variant | Code | When |
/// |---------|------|------|
/// | `Timeout` | `RPC_TIMEOUT` | No outcome within the configured window |
/// | `BridgeClosed` | `RPC_BRIDGE_CLOSED` | The evaluation bridge went away |
/// | `Remote` | `RPC_REMOTE_FAILURE` | The engine reported a tagged failure |
/// | `Wire` | `RPC_WIRE_ERROR` | Frame encoding or result decoding failed |
/// | `UnknownMember` | `RPC_UNKNOWN_MEMBER` | Name not on the remote descriptor |
///
/// For `Remote`, the engine's own protocol code (`PROXY_*`) is available
/// through [`remote_code`](Self::remote_code).
#[derive(Debug, Error)]
pub enum RpcError {
    /// No outcome arrived within the configured call timeout.
    #[error("call timed out after {0}ms")]
    Timeout(u64),

    /// The evaluation bridge stopped before resolving the call.
    #[error("evaluation bridge closed")]
    BridgeClosed,

    /// The engine resolved the call as a tagged failure.
    #[error(transparent)]
    Remote(EvalFailure),

    /// Frame encoding or result decoding failed locally.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The requested name is not part of the remote value's descriptor.
    #[error("no such remote member: {0}")]
    UnknownMember(String),
}

impl RpcError {
    /// The engine-side protocol code, when this is a remote failure.
    #[must_use]
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            Self::Remote(failure) => Some(&failure.code),
            _ => None,
        }
    }
}

impl ErrorCode for RpcError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "RPC_TIMEOUT",
            Self::BridgeClosed => "RPC_BRIDGE_CLOSED",
            Self::Remote(_) => "RPC_REMOTE_FAILURE",
            Self::Wire(_) => "RPC_WIRE_ERROR",
            Self::UnknownMember(_) => "RPC_UNKNOWN_MEMBER",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Remote(failure) => failure.matches("PROXY_INVOCATION_FAILED"),
            Self::BridgeClosed | Self::Wire(_) | Self::UnknownMember(_) => false,
        }
    }
}

/// Errors starting an evaluation bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine thread could not be spawned.
    #[error("engine thread spawn failed: {0}")]
    Spawn(String),

    /// Engine construction or host setup failed on the engine thread.
    #[error("engine initialization failed: {0}")]
    Init(String),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "BRIDGE_SPAWN_FAILED",
            Self::Init(_) => "BRIDGE_INIT_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
