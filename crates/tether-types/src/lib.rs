//! Core types for the tether remote-object proxy protocol.
//!
//! This crate provides the foundation layer shared by both sides of the
//! bridge: the engine side (which hosts live objects) and the control side
//! (which drives them remotely).
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Side                             │
//! │  tether-rpc     : call queue, eval bridge, remote proxies   │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↕  command text / descriptor JSON
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Engine Side                              │
//! │  tether-engine  : registry, reflection, dispatcher (Lua)    │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↕
//! ┌─────────────────────────────────────────────────────────────┐
//! │  tether-types   : ObjectId, Descriptor, wire frames  ◄── HERE│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # What lives here
//!
//! - [`ObjectId`] — the stable integer handle naming a registry entry
//! - [`Descriptor`] and friends — serializable descriptions of non-scalar
//!   engine values ([`ObjectDescriptor`], [`FunctionDescriptor`],
//!   [`EnumeratorDescriptor`], [`MethodDescriptor`], [`ArgumentDescriptor`])
//! - [`CallFrame`] / [`CallResponse`] — the RPC frame shapes, plus the
//!   command-text encoding consumed by the engine dispatcher
//! - [`ReturnValue`] — decoded results (void / scalar / wrapped / sequence)
//! - [`ProxyError`] and the [`ErrorCode`] trait — the shared error taxonomy
//!
//! Everything here is plain data: no Lua, no async, no I/O. Both halves of
//! the system depend on this crate and nothing else shared.

mod descriptor;
mod error;
mod id;
mod wire;

pub use descriptor::{
    ArgumentDescriptor, Descriptor, EnumeratorDescriptor, FunctionDescriptor, MethodDescriptor,
    ObjectDescriptor, ENUMERATOR_TYPE, FUNCTION_TYPE, REMOTE_ID_FIELD,
};
pub use error::{assert_error_code, assert_error_codes, ErrorCode, ProxyError};
pub use id::ObjectId;
pub use wire::{
    methods, CallFrame, CallResponse, EqualityOperand, EvalFailure, EvalOutcome, ReturnValue,
    WireError,
};
