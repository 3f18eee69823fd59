//! Shared error taxonomy for the proxy protocol.
//!
//! All tether error types implement [`ErrorCode`] to provide:
//!
//! - **Machine-readable codes**: stable strings the control side can match
//!   on without parsing messages
//! - **Recoverability info**: whether retrying the failed call can help
//!
//! # Error Code Convention
//!
//! Protocol errors use the `PROXY_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`UnknownReference`](ProxyError::UnknownReference) | `PROXY_UNKNOWN_REFERENCE` | No |
//! | [`UnknownType`](ProxyError::UnknownType) | `PROXY_UNKNOWN_TYPE` | No |
//! | [`IndexOutOfRange`](ProxyError::IndexOutOfRange) | `PROXY_INDEX_OUT_OF_RANGE` | No |
//! | [`InvocationError`](ProxyError::InvocationError) | `PROXY_INVOCATION_FAILED` | Yes |
//! | [`ReflectionFailure`](ProxyError::ReflectionFailure) | `PROXY_REFLECTION_FAILED` | No |
//! | [`EvaluationFailure`](ProxyError::EvaluationFailure) | `PROXY_EVALUATION_FAILED` | No |

use crate::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error code interface for tether errors.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**: e.g. `"PROXY_UNKNOWN_REFERENCE"`
/// - **Prefixed by layer**: `PROXY_` for protocol errors, `BRIDGE_` for
///   transport-level errors
/// - **Stable**: codes are an API contract and do not change once defined
///
/// # Example
///
/// ```
/// use tether_types::{ErrorCode, ObjectId, ProxyError};
///
/// let err = ProxyError::UnknownReference(ObjectId(9));
/// assert_eq!(err.code(), "PROXY_UNKNOWN_REFERENCE");
/// assert!(!err.is_recoverable());
/// ```
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    ///
    /// - `true`: transient condition, retry may help
    /// - `false`: retry will not help without changing the request
    fn is_recoverable(&self) -> bool;
}

/// Protocol-level error surfaced by the engine command dispatcher.
///
/// These are the named failures a call can resolve with. The call queue
/// forwards them to the caller as error responses; it never retries and
/// never logs them at error level (callers decide how to react).
///
/// # Variants
///
/// | Variant | When | Recovery |
/// |---------|------|----------|
/// | `UnknownReference` | Id not in registry | Fix the reference |
/// | `UnknownType` | Construction target missing or not constructible | Fix the type name |
/// | `IndexOutOfRange` | Indexed read past the end | Stop iterating |
/// | `InvocationError` | The invoked callable itself failed | May retry |
/// | `ReflectionFailure` | Descriptor building could not introspect | Degraded descriptor |
/// | `EvaluationFailure` | The command could not be evaluated at all | Fix the command |
///
/// `ReflectionFailure` is special: the descriptor builder never propagates
/// it. Introspection failures degrade to a minimal enumerator descriptor,
/// and the failure is only observable through the registry's counter and a
/// warning log. The variant exists so that the condition has a name on the
/// wire and in diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum ProxyError {
    /// The identifier does not name a registry entry.
    ///
    /// **Not recoverable** — the id was never assigned (or belongs to a
    /// previous engine process).
    #[error("unknown remote reference: {0}")]
    UnknownReference(ObjectId),

    /// The construction target is not a constructible global.
    ///
    /// Raised by `new` when the named global is absent, or is neither a
    /// function, a callable table, nor a class table with a `new` field.
    ///
    /// **Not recoverable** — the scope will not grow a constructor by
    /// retrying.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// An indexed read resolved to nothing.
    ///
    /// **Not recoverable** — used by iterating callers as the end-of-
    /// sequence condition.
    #[error("index {index} out of range on {id}")]
    IndexOutOfRange {
        /// The indexed object.
        id: ObjectId,
        /// The requested index.
        index: i64,
    },

    /// The invoked callable raised an error of its own.
    ///
    /// The callee's message is carried verbatim.
    ///
    /// **Recoverable** — the callable exists and is callable; its failure
    /// may be transient.
    #[error("invocation failed: {0}")]
    InvocationError(String),

    /// Reflective introspection failed while building a descriptor.
    ///
    /// **Not recoverable** — the value's shape will not change.
    #[error("reflection failed: {0}")]
    ReflectionFailure(String),

    /// The evaluation bridge could not run the command at all.
    ///
    /// Covers malformed command text and engine-level evaluation faults.
    /// The failure is final for that single call; the next submitted call
    /// proceeds normally.
    ///
    /// **Not recoverable** — there is no automatic retry.
    #[error("evaluation failed: {0}")]
    EvaluationFailure(String),
}

impl ErrorCode for ProxyError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownReference(_) => "PROXY_UNKNOWN_REFERENCE",
            Self::UnknownType(_) => "PROXY_UNKNOWN_TYPE",
            Self::IndexOutOfRange { .. } => "PROXY_INDEX_OUT_OF_RANGE",
            Self::InvocationError(_) => "PROXY_INVOCATION_FAILED",
            Self::ReflectionFailure(_) => "PROXY_REFLECTION_FAILED",
            Self::EvaluationFailure(_) => "PROXY_EVALUATION_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvocationError(_))
    }
}

/// Validates that an error code follows tether conventions.
///
/// # Checks
///
/// 1. Code is UPPER_SNAKE_CASE
/// 2. Code starts with the expected prefix
/// 3. Code is not empty
///
/// # Panics
///
/// Panics with a descriptive message if validation fails.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates multiple error codes at once.
///
/// Use this to verify all variants of an error enum.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<ProxyError> {
        vec![
            ProxyError::UnknownReference(ObjectId(1)),
            ProxyError::UnknownType("Doc".into()),
            ProxyError::IndexOutOfRange {
                id: ObjectId(1),
                index: 4,
            },
            ProxyError::InvocationError("boom".into()),
            ProxyError::ReflectionFailure("opaque".into()),
            ProxyError::EvaluationFailure("syntax".into()),
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "PROXY_");
    }

    #[test]
    fn only_invocation_is_recoverable() {
        for err in all_variants() {
            let expected = matches!(err, ProxyError::InvocationError(_));
            assert_eq!(err.is_recoverable(), expected, "{}", err.code());
        }
    }

    #[test]
    fn messages_carry_context() {
        let err = ProxyError::UnknownReference(ObjectId(999));
        assert!(err.to_string().contains("obj:999"));

        let err = ProxyError::IndexOutOfRange {
            id: ObjectId(3),
            index: 12,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("obj:3"));
    }

    #[test]
    fn round_trips_through_serde() {
        for err in all_variants() {
            let encoded = serde_json::to_string(&err).unwrap();
            let back: ProxyError = serde_json::from_str(&encoded).unwrap();
            assert_eq!(back, err);
        }
    }

    #[test]
    fn is_upper_snake_case_rules() {
        assert!(is_upper_snake_case("PROXY_UNKNOWN_TYPE"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("_PROXY"));
        assert!(!is_upper_snake_case("PROXY__X"));
        assert!(!is_upper_snake_case("Proxy_X"));
    }
}
