//! Remote-object handles.
//!
//! Sugar over [`RpcClient`]: a [`RemoteObject`] pairs a descriptor with
//! the client that produced it, so property access, method calls, and
//! iteration read like local operations while every one of them is a
//! round trip. The concrete value never leaves the engine — a handle
//! holds nothing but the descriptor and the means to ask.
//!
//! Member access is gated on the descriptor (an unknown name fails
//! locally, without a round trip), except for enumerators, whose member
//! list the engine could not reflect — those forward every name and let
//! the engine decide.

use crate::client::RpcClient;
use crate::error::RpcError;
use std::collections::BTreeMap;
use tether_types::{Descriptor, EqualityOperand, ObjectId, ReturnValue};

/// A decoded remote result with call capability attached.
#[derive(Clone)]
pub enum Remote {
    /// The call produced no payload.
    Void,
    /// A scalar, passed by value.
    Scalar(serde_json::Value),
    /// A handle to a remote non-scalar value.
    Object(RemoteObject),
    /// A sequence of results.
    Sequence(Vec<Remote>),
}

impl Remote {
    /// Attaches a client to a decoded return value.
    #[must_use]
    pub fn from_return(client: &RpcClient, value: ReturnValue) -> Self {
        match value {
            ReturnValue::Void => Self::Void,
            ReturnValue::Scalar(v) => Self::Scalar(v),
            ReturnValue::Wrapped(descriptor) => {
                Self::Object(RemoteObject::new(client.clone(), descriptor))
            }
            ReturnValue::Sequence(items) => Self::Sequence(
                items
                    .into_iter()
                    .map(|item| Self::from_return(client, item))
                    .collect(),
            ),
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

    /// The handle, when this is a remote object.
    #[must_use]
    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Consumes into the handle, when this is a remote object.
    #[must_use]
    pub fn into_object(self) -> Option<RemoteObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Void => write!(f, "Remote::Void"),
            Self::Scalar(v) => write!(f, "Remote::Scalar({v})"),
            Self::Object(o) => write!(f, "Remote::Object({})", o.descriptor().id()),
            Self::Sequence(items) => write!(f, "Remote::Sequence(len={})", items.len()),
        }
    }
}

/// An argument to a remote call or assignment.
///
/// Remote handles encode as their descriptor JSON, which the engine's
/// marshaller resolves back to the concrete value — that round trip is
/// the whole protocol.
#[derive(Clone)]
pub enum CallArg {
    /// A scalar (or plain JSON structure), passed by value.
    Value(serde_json::Value),
    /// A remote reference, passed by identity.
    Object(RemoteObject),
}

impl CallArg {
    fn to_json(&self) -> Result<serde_json::Value, RpcError> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Object(o) => serde_json::to_value(o.descriptor())
                .map_err(|e| tether_types::WireError::Decode(e.to_string()).into()),
        }
    }
}

impl From<serde_json::Value> for CallArg {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

impl From<&RemoteObject> for CallArg {
    fn from(object: &RemoteObject) -> Self {
        Self::Object(object.clone())
    }
}

impl From<RemoteObject> for CallArg {
    fn from(object: RemoteObject) -> Self {
        Self::Object(object)
    }
}

/// Handle to one remote value.
///
/// Cheap to clone. Two handles with the same id address the same
/// concrete value; [`remote_eq`](Self::remote_eq) answers identity
/// questions beyond that.
#[derive(Clone)]
pub struct RemoteObject {
    client: RpcClient,
    descriptor: Descriptor,
}

impl RemoteObject {
    /// Wraps a descriptor with the client to reach it through.
    #[must_use]
    pub fn new(client: RpcClient, descriptor: Descriptor) -> Self {
        Self { client, descriptor }
    }

    /// The remote identifier.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.descriptor.id()
    }

    /// The descriptor this handle was built from.
    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Reads a property.
    ///
    /// # Errors
    ///
    /// [`RpcError::UnknownMember`] locally when the name is not on the
    /// descriptor (enumerators excepted).
    pub async fn get(&self, name: &str) -> Result<Remote, RpcError> {
        self.check_member(name)?;
        let value = self.client.get(self.id(), name).await?;
        Ok(Remote::from_return(&self.client, value))
    }

    /// Assigns a property.
    pub async fn set(&self, name: &str, value: impl Into<CallArg>) -> Result<(), RpcError> {
        self.check_member(name)?;
        self.client
            .set(self.id(), name, value.into().to_json()?)
            .await
    }

    /// Invokes a method with this object as receiver.
    pub async fn call_method(
        &self,
        name: &str,
        args: Vec<CallArg>,
    ) -> Result<Remote, RpcError> {
        let method_id = self
            .descriptor
            .method(name)
            .map(|m| m.id)
            .ok_or_else(|| RpcError::UnknownMember(name.to_string()))?;
        let args = encode_args(args)?;
        let value = self.client.call(method_id, args, Some(self.id())).await?;
        Ok(Remote::from_return(&self.client, value))
    }

    /// Invokes this value as a free function (function handles only —
    /// everything else fails remotely as an invocation error).
    pub async fn invoke(&self, args: Vec<CallArg>) -> Result<Remote, RpcError> {
        let args = encode_args(args)?;
        let value = self.client.call(self.id(), args, None).await?;
        Ok(Remote::from_return(&self.client, value))
    }

    /// Reads an indexed element (engine indexing starts at 1).
    pub async fn index(&self, index: i64) -> Result<Remote, RpcError> {
        let value = self.client.get_index(self.id(), index).await?;
        Ok(Remote::from_return(&self.client, value))
    }

    /// Collects indexed elements until the engine reports the end of the
    /// sequence.
    pub async fn items(&self) -> Result<Vec<Remote>, RpcError> {
        let mut collected = Vec::new();
        let mut index = 1;
        loop {
            match self.index(index).await {
                Ok(item) => collected.push(item),
                Err(err) if err.remote_code() == Some("PROXY_INDEX_OUT_OF_RANGE") => break,
                Err(err) => return Err(err),
            }
            index += 1;
        }
        Ok(collected)
    }

    /// Whether this handle and the other address equal values, by the
    /// engine's own equality.
    ///
    /// Matching ids short-circuit: they are the same registry entry.
    /// Distinct ids still go to the engine — two entries can hold equal
    /// values.
    pub async fn remote_eq(&self, other: &RemoteObject) -> Result<bool, RpcError> {
        if self.id() == other.id() {
            return Ok(true);
        }
        self.client
            .is_equal(
                EqualityOperand::wrapped(self.id()),
                EqualityOperand::wrapped(other.id()),
            )
            .await
    }

    /// Compares this remote value against a literal scalar.
    pub async fn remote_eq_literal(&self, value: serde_json::Value) -> Result<bool, RpcError> {
        self.client
            .is_equal(
                EqualityOperand::wrapped(self.id()),
                EqualityOperand::literal(value),
            )
            .await
    }

    fn check_member(&self, name: &str) -> Result<(), RpcError> {
        if self.descriptor.has_member(name) || self.descriptor.is_enumerator() {
            Ok(())
        } else {
            Err(RpcError::UnknownMember(name.to_string()))
        }
    }
}

fn encode_args(args: Vec<CallArg>) -> Result<Vec<serde_json::Value>, RpcError> {
    args.iter().map(CallArg::to_json).collect()
}

impl std::fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<remote {} type={} name={}>",
            self.descriptor.id(),
            self.descriptor.instance_of(),
            self.descriptor.name()
        )
    }
}

/// The described global scope, by name.
pub struct RemoteScope {
    entries: BTreeMap<String, Remote>,
}

impl RemoteScope {
    /// Fetches and decodes the engine's global scope.
    pub async fn fetch(client: &RpcClient) -> Result<Self, RpcError> {
        let scope = client.global_scope().await?;
        let entries = scope
            .into_iter()
            .map(|(name, value)| (name, Remote::from_return(client, value)))
            .collect();
        Ok(Self { entries })
    }

    /// Looks up a scope entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Remote> {
        self.entries.get(name)
    }

    /// All scope names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope came back empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
