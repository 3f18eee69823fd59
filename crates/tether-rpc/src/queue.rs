//! The call queue: pending-call bookkeeping and one-at-a-time submission.
//!
//! Callers may issue calls concurrently; the queue serializes them in
//! front of the evaluation bridge. Each call is tagged with a
//! monotonically increasing correlation id and parked in the pending map
//! until its outcome is dispatched back — matched explicitly by id, not
//! by arrival order, so a transport that reorders responses would still
//! resolve the right caller.
//!
//! Failed calls resolve the caller and nothing else: no retry, and no
//! error-level logging from this layer. Whether a failure is worth a log
//! line is the caller's decision (an expected `IndexOutOfRange` ends an
//! iteration; it is not an incident).

use crate::bridge::EvalBridge;
use crate::error::RpcError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_types::{CallFrame, CallResponse, EvalFailure};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Control-side configuration.
///
/// Deserializable with full defaults.
///
/// # Example
///
/// ```
/// use tether_rpc::QueueConfig;
///
/// let config: QueueConfig = serde_json::from_str("{}").unwrap();
/// assert_eq!(config.call_timeout_ms, 30_000);
/// assert!(!config.network_debug);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long one call may wait for its outcome, in milliseconds.
    pub call_timeout_ms: u64,
    /// Log every frame and response at debug level.
    pub network_debug: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            network_debug: false,
        }
    }
}

impl QueueConfig {
    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

type PendingOutcome = Result<Option<String>, RpcError>;

/// Serializes concurrent callers into one in-flight evaluation.
pub struct CallQueue {
    bridge: Arc<dyn EvalBridge>,
    pending: Mutex<HashMap<u64, oneshot::Sender<PendingOutcome>>>,
    seq: AtomicU64,
    gate: tokio::sync::Mutex<()>,
    config: QueueConfig,
}

impl CallQueue {
    /// Creates a queue in front of the given bridge.
    #[must_use]
    pub fn new(bridge: Arc<dyn EvalBridge>, config: QueueConfig) -> Self {
        Self {
            bridge,
            pending: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            gate: tokio::sync::Mutex::new(()),
            config,
        }
    }

    /// Submits one operation and waits for its single outcome.
    ///
    /// Contending callers queue; they observe latency, not failure.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<String>, RpcError> {
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = CallFrame::new(id, method, params);
        let command = frame.to_command()?;

        let (caller_tx, caller_rx) = oneshot::channel();
        self.pending.lock().insert(id, caller_tx);

        {
            let _slot = self.gate.lock().await;
            if self.config.network_debug {
                debug!(id, method, %command, "submitting call frame");
            }

            let (reply_tx, reply_rx) = oneshot::channel();
            self.bridge.submit(command, reply_tx);

            let outcome = match tokio::time::timeout(self.config.call_timeout(), reply_rx).await {
                Ok(Ok(outcome)) => outcome.map_err(RpcError::Remote),
                Ok(Err(_)) => Err(RpcError::BridgeClosed),
                Err(_) => Err(RpcError::Timeout(self.config.call_timeout_ms)),
            };
            self.resolve(id, outcome);
        }

        match caller_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::BridgeClosed),
        }
    }

    /// Number of calls parked in the pending map.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Dispatches an outcome to the pending call it correlates with.
    fn resolve(&self, id: u64, outcome: PendingOutcome) {
        if self.config.network_debug {
            let response = match &outcome {
                Ok(result) => CallResponse::success(id, result.clone()),
                Err(RpcError::Remote(failure)) => CallResponse::failure(id, failure.clone()),
                Err(other) => CallResponse::failure(id, EvalFailure::evaluation(other.to_string())),
            };
            debug!(id, ?response, "resolving call frame");
        }

        match self.pending.lock().remove(&id) {
            Some(caller) => {
                // The caller may have gone away; nothing to deliver to.
                let _ = caller.send(outcome);
            }
            None => warn!(id, "outcome without a pending call"),
        }
    }
}
