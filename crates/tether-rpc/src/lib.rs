//! Control-process side of the tether remote-object proxy protocol.
//!
//! Drives live objects inside a scripting engine without ever holding a
//! native reference to them: every value the control side sees is either
//! a scalar or a descriptor naming a registry entry, and every
//! manipulation is a command evaluated by the engine.
//!
//! # Architecture
//!
//! ```text
//!  caller        caller        caller            (concurrent)
//!     │             │             │
//!     └──────┬──────┴─────────────┘
//!            ▼
//!  ┌───────────────────┐   pending map, correlation ids,
//!  │     CallQueue     │   one in-flight submission
//!  └─────────┬─────────┘
//!            ▼
//!  ┌───────────────────┐   trait seam — swap in a real
//!  │    EvalBridge     │   transport here
//!  └─────────┬─────────┘
//!            ▼
//!  ┌───────────────────┐   dedicated engine thread,
//!  │  InProcessBridge  │   FIFO, tagged outcomes
//!  └─────────┬─────────┘
//!            ▼
//!       ScriptEngine (tether-engine)
//! ```
//!
//! # Layers
//!
//! - [`RpcClient`] — one typed method per dispatcher operation
//! - [`RemoteObject`] / [`RemoteScope`] — handles that make remote
//!   property access, method calls, and iteration read like local code
//! - [`CallQueue`] — serialization and correlation bookkeeping
//! - [`EvalBridge`] — the transport seam; [`InProcessBridge`] bundles an
//!   engine on its own thread
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_engine::EngineConfig;
//! use tether_rpc::{InProcessBridge, QueueConfig, RemoteScope, RpcClient};
//!
//! let bridge = InProcessBridge::spawn(EngineConfig::default(), |engine| {
//!     engine.lua().load(include_str!("../host/doc.lua")).exec()?;
//!     Ok(())
//! })?;
//! let client = RpcClient::new(Arc::new(bridge), QueueConfig::default());
//!
//! let doc = client.new_instance("Doc").await?;
//! ```

mod bridge;
mod client;
mod error;
mod proxy;
mod queue;

pub use bridge::{EvalBridge, InProcessBridge};
pub use client::RpcClient;
pub use error::{BridgeError, RpcError};
pub use proxy::{CallArg, Remote, RemoteObject, RemoteScope};
pub use queue::{CallQueue, QueueConfig};
