//! Typed client over the call queue.
//!
//! One method per dispatcher operation, plus raw `eval`. Results come
//! back decoded: scalars by value, non-scalars as descriptors carrying
//! the identifiers to address them with in later calls.

use crate::bridge::EvalBridge;
use crate::error::RpcError;
use crate::queue::{CallQueue, QueueConfig};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tether_types::{methods, EqualityOperand, ObjectId, ReturnValue};

/// Remote handle to the engine's dispatcher.
///
/// Cheap to clone; clones share one call queue and therefore one
/// serialization gate.
#[derive(Clone)]
pub struct RpcClient {
    queue: Arc<CallQueue>,
}

impl RpcClient {
    /// Creates a client over the given bridge.
    #[must_use]
    pub fn new(bridge: Arc<dyn EvalBridge>, config: QueueConfig) -> Self {
        Self {
            queue: Arc::new(CallQueue::new(bridge, config)),
        }
    }

    /// The underlying queue, shared with any clones.
    #[must_use]
    pub fn queue(&self) -> &Arc<CallQueue> {
        &self.queue
    }

    /// Constructs a zero-argument instance of the named global type.
    pub async fn new_instance(&self, type_name: &str) -> Result<ReturnValue, RpcError> {
        let payload = self.queue.call(methods::NEW, vec![json!(type_name)]).await?;
        decode(payload)
    }

    /// Reads a named property of a remote object.
    pub async fn get(&self, id: ObjectId, name: &str) -> Result<ReturnValue, RpcError> {
        let payload = self
            .queue
            .call(methods::GET, vec![json!(id.value()), json!(name)])
            .await?;
        decode(payload)
    }

    /// Reads an indexed element of a remote object.
    pub async fn get_index(&self, id: ObjectId, index: i64) -> Result<ReturnValue, RpcError> {
        let payload = self
            .queue
            .call(methods::GET_INDEX, vec![json!(id.value()), json!(index)])
            .await?;
        decode(payload)
    }

    /// Assigns a property of a remote object.
    ///
    /// `value` may be a scalar or a descriptor JSON previously handed
    /// out by any call — the engine resolves it back to the concrete
    /// value it names.
    pub async fn set(
        &self,
        id: ObjectId,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), RpcError> {
        self.queue
            .call(methods::SET, vec![json!(id.value()), json!(name), value])
            .await?;
        Ok(())
    }

    /// Invokes a remote callable.
    ///
    /// With `receiver`, the callable runs as a method of that object;
    /// without, as a free function.
    pub async fn call(
        &self,
        id: ObjectId,
        args: Vec<serde_json::Value>,
        receiver: Option<ObjectId>,
    ) -> Result<ReturnValue, RpcError> {
        let receiver = receiver.map_or(serde_json::Value::Null, |r| json!(r.value()));
        let payload = self
            .queue
            .call(
                methods::CALL,
                vec![json!(id.value()), serde_json::Value::Array(args), receiver],
            )
            .await?;
        decode(payload)
    }

    /// Compares two operands with the engine's native equality.
    pub async fn is_equal(
        &self,
        left: EqualityOperand,
        right: EqualityOperand,
    ) -> Result<bool, RpcError> {
        let payload = self
            .queue
            .call(
                methods::IS_EQUAL,
                vec![
                    serde_json::to_value(left).map_err(tether_types::WireError::from)?,
                    serde_json::to_value(right).map_err(tether_types::WireError::from)?,
                ],
            )
            .await?;
        match decode(payload)? {
            ReturnValue::Scalar(serde_json::Value::Bool(b)) => Ok(b),
            other => Err(tether_types::WireError::Decode(format!(
                "is_equal must resolve to a boolean, got {other:?}"
            ))
            .into()),
        }
    }

    /// Fetches the described global scope: name → decoded value.
    pub async fn global_scope(&self) -> Result<BTreeMap<String, ReturnValue>, RpcError> {
        let payload = self.queue.call(methods::GET_GLOBAL_SCOPE, vec![]).await?;
        let text = payload
            .ok_or_else(|| tether_types::WireError::Decode("scope map missing".to_string()))?;
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
            .map_err(tether_types::WireError::from)?;
        map.into_iter()
            .map(|(name, value)| {
                ReturnValue::from_json(value)
                    .map(|decoded| (name, decoded))
                    .map_err(RpcError::from)
            })
            .collect()
    }

    /// Evaluates raw command text in the engine.
    ///
    /// The text is the engine's to parse; the result comes back as the
    /// engine rendered it, with no descriptor wrapping.
    pub async fn eval(&self, command: &str) -> Result<Option<String>, RpcError> {
        self.queue.call(methods::EVAL, vec![json!(command)]).await
    }
}

fn decode(payload: Option<String>) -> Result<ReturnValue, RpcError> {
    ReturnValue::decode(payload.as_deref()).map_err(RpcError::from)
}
