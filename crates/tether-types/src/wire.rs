//! Call frames, command-text encoding, and result decoding.
//!
//! A call crosses the boundary twice:
//!
//! ```text
//! CallFrame ──to_command()──► "rpc_get(1,\"title\")" ──► engine dispatcher
//!                                                            │
//! ReturnValue ◄──decode()── Some("{\"__remote_id\":2,…}") ◄──┘
//! ```
//!
//! The engine side never sees frames — it sees command text its own
//! interpreter can parse. The control side never sees live values — it
//! sees descriptor JSON or scalar JSON, decoded into [`ReturnValue`].
//!
//! Evaluation failures travel as a tagged [`EvalFailure`] rather than a
//! sentinel string, so a call that legitimately returns the text of an
//! error message is never mistaken for a failed one.

use crate::{Descriptor, ErrorCode, ObjectId, ProxyError, REMOTE_ID_FIELD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Method names of the fixed operation set.
pub mod methods {
    /// Construct a zero-argument instance of a global type.
    pub const NEW: &str = "new";
    /// Read a named property.
    pub const GET: &str = "get";
    /// Read an indexed element.
    pub const GET_INDEX: &str = "get_index";
    /// Assign a named property.
    pub const SET: &str = "set";
    /// Invoke a callable, optionally bound to a receiver.
    pub const CALL: &str = "call";
    /// Compare two values with the engine's native equality.
    pub const IS_EQUAL: &str = "is_equal";
    /// Describe every top-level global.
    pub const GET_GLOBAL_SCOPE: &str = "get_global_scope";
    /// Evaluate raw command text.
    pub const EVAL: &str = "eval";
}

/// Errors produced while encoding frames or decoding results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    /// The frame does not fit the method's expected parameter shape.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Returned text was not decodable JSON, or a wrapped value did not
    /// match any descriptor shape.
    #[error("undecodable result: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// One outstanding request, as submitted by the control side.
///
/// `id` is the correlation id assigned by the call queue; responses are
/// matched against it explicitly rather than by arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Correlation id, monotonically increasing per queue.
    pub id: u64,
    /// One of [`methods`].
    pub method: String,
    /// Positional parameters; shape depends on the method.
    pub params: Vec<serde_json::Value>,
}

impl CallFrame {
    /// Creates a frame.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serializes the frame into one engine command string.
    ///
    /// The grammar is function-call-style text naming a dispatcher entry
    /// point: scalar parameters are rendered as engine literals, while
    /// structured parameters (call arguments, assigned values, equality
    /// operands) are rendered as engine-quoted JSON text which the
    /// dispatcher parses back out. `eval` frames pass their text through
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`WireError::Malformed`] when the parameter list does not fit the
    /// method.
    pub fn to_command(&self) -> Result<String, WireError> {
        match self.method.as_str() {
            methods::NEW => {
                let type_name = self.str_param(0)?;
                Ok(format!("return rpc_new({})", lua_quote(type_name)))
            }
            methods::GET => {
                let id = self.id_param(0)?;
                let name = self.str_param(1)?;
                Ok(format!("return rpc_get({},{})", id.value(), lua_quote(name)))
            }
            methods::GET_INDEX => {
                let id = self.id_param(0)?;
                let index = self.int_param(1)?;
                Ok(format!("return rpc_get_index({},{})", id.value(), index))
            }
            methods::SET => {
                let id = self.id_param(0)?;
                let name = self.str_param(1)?;
                let value = self.param(2)?;
                Ok(format!(
                    "return rpc_set({},{},{})",
                    id.value(),
                    lua_quote(name),
                    lua_quote(&value.to_string())
                ))
            }
            methods::CALL => {
                let id = self.id_param(0)?;
                let args = self.param(1)?;
                if !args.is_array() {
                    return Err(WireError::Malformed("call arguments must be a list".into()));
                }
                let parent = match self.params.get(2) {
                    None | Some(serde_json::Value::Null) => "nil".to_string(),
                    Some(serde_json::Value::Number(n)) => n.to_string(),
                    Some(other) => {
                        return Err(WireError::Malformed(format!(
                            "receiver must be an id, got {other}"
                        )))
                    }
                };
                Ok(format!(
                    "return rpc_call({},{},{})",
                    id.value(),
                    lua_quote(&args.to_string()),
                    parent
                ))
            }
            methods::IS_EQUAL => {
                if self.params.len() != 2 {
                    return Err(WireError::Malformed(
                        "is_equal takes exactly two operands".into(),
                    ));
                }
                let operands = serde_json::Value::Array(self.params.clone());
                Ok(format!(
                    "return rpc_is_equal({})",
                    lua_quote(&operands.to_string())
                ))
            }
            methods::GET_GLOBAL_SCOPE => Ok("return rpc_get_global_scope()".to_string()),
            methods::EVAL => Ok(self.str_param(0)?.to_string()),
            other => Err(WireError::Malformed(format!("unknown method: {other}"))),
        }
    }

    fn param(&self, index: usize) -> Result<&serde_json::Value, WireError> {
        self.params
            .get(index)
            .ok_or_else(|| WireError::Malformed(format!("{} missing param {index}", self.method)))
    }

    fn str_param(&self, index: usize) -> Result<&str, WireError> {
        self.param(index)?.as_str().ok_or_else(|| {
            WireError::Malformed(format!("{} param {index} must be a string", self.method))
        })
    }

    fn int_param(&self, index: usize) -> Result<i64, WireError> {
        self.param(index)?.as_i64().ok_or_else(|| {
            WireError::Malformed(format!("{} param {index} must be an integer", self.method))
        })
    }

    fn id_param(&self, index: usize) -> Result<ObjectId, WireError> {
        self.param(index)?
            .as_u64()
            .map(ObjectId)
            .ok_or_else(|| WireError::Malformed(format!("{} param {index} must be an id", self.method)))
    }
}

/// One response, correlated to its frame by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// Correlation id of the frame this answers.
    pub id: u64,
    /// Raw returned text, absent when the call produced no payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure, when the call did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvalFailure>,
}

impl CallResponse {
    /// A successful response carrying the returned text, if any.
    #[must_use]
    pub fn success(id: u64, result: Option<String>) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(id: u64, error: EvalFailure) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// One side of an `is_equal` comparison.
///
/// A wrapped operand carries the registry id of the value to compare; a
/// literal operand carries the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualityOperand {
    /// The id (wrapped) or the literal value.
    pub value: serde_json::Value,
    /// Whether `value` names a registry entry.
    pub is_wrapped: bool,
}

impl EqualityOperand {
    /// Operand naming a remote object.
    #[must_use]
    pub fn wrapped(id: ObjectId) -> Self {
        Self {
            value: serde_json::Value::from(id.value()),
            is_wrapped: true,
        }
    }

    /// Operand carrying a literal scalar.
    #[must_use]
    pub fn literal(value: serde_json::Value) -> Self {
        Self {
            value,
            is_wrapped: false,
        }
    }
}

/// Tagged failure reported by the evaluation bridge.
///
/// `code` is an [`ErrorCode`] string (`PROXY_*` for dispatcher failures,
/// `PROXY_EVALUATION_FAILED` when the command could not run at all), so
/// the control side can match failures without parsing messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct EvalFailure {
    /// Machine-readable failure code.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl EvalFailure {
    /// Creates a failure with an explicit code.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A bridge-level failure: the command could not be evaluated.
    #[must_use]
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(
            ProxyError::EvaluationFailure(String::new()).code(),
            message,
        )
    }

    /// Whether this failure carries the given code.
    #[must_use]
    pub fn matches(&self, code: &str) -> bool {
        self.code == code
    }
}

impl From<&ProxyError> for EvalFailure {
    fn from(err: &ProxyError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// The single outcome of one submitted evaluation.
///
/// `Ok(None)` means the command completed without producing a payload,
/// which is distinct from returning the scalar `null`.
pub type EvalOutcome = Result<Option<String>, EvalFailure>;

/// A decoded call result.
///
/// Wrapped values are detected by the reserved [`REMOTE_ID_FIELD`] in
/// their JSON; anything else is a scalar passed by value.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    /// The call produced no payload.
    Void,
    /// A scalar passed by value (number, string, boolean, null).
    Scalar(serde_json::Value),
    /// A remote reference, described.
    Wrapped(Descriptor),
    /// A sequence of results, element-wise decoded.
    Sequence(Vec<ReturnValue>),
}

impl ReturnValue {
    /// Decodes the raw text returned by the evaluation bridge.
    ///
    /// # Errors
    ///
    /// [`WireError::Decode`] when the text is not JSON or a wrapped value
    /// has no recognizable descriptor shape.
    pub fn decode(text: Option<&str>) -> Result<Self, WireError> {
        match text {
            None => Ok(Self::Void),
            Some(raw) => {
                let json: serde_json::Value = serde_json::from_str(raw)?;
                Self::from_json(json)
            }
        }
    }

    /// Decodes an already-parsed JSON value.
    pub fn from_json(json: serde_json::Value) -> Result<Self, WireError> {
        match json {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Sequence),
            serde_json::Value::Object(ref map) if map.contains_key(REMOTE_ID_FIELD) => {
                let descriptor: Descriptor = serde_json::from_value(json)?;
                Ok(Self::Wrapped(descriptor))
            }
            other => Ok(Self::Scalar(other)),
        }
    }

    /// The descriptor, when this is a wrapped value.
    #[must_use]
    pub fn as_wrapped(&self) -> Option<&Descriptor> {
        match self {
            Self::Wrapped(d) => Some(d),
            _ => None,
        }
    }

    /// The scalar JSON, when this is a by-value result.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the call produced no payload.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }
}

/// Quotes a string as an engine (Lua) double-quoted literal.
///
/// Control characters are escaped as decimal `\ddd` sequences, which are
/// valid in every Lua version, so arbitrary JSON text survives embedding
/// in command strings.
fn lua_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
