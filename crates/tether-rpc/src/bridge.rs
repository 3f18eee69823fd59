//! The evaluation bridge: one command in, exactly one outcome out.
//!
//! The bridge is the seam between the call queue and whatever carries
//! commands into the engine. The contract is minimal on purpose:
//!
//! - deliver an ordered sequence of command strings
//! - deliver exactly one [`EvalOutcome`] per command
//! - never run two evaluations at once
//!
//! Failures are a tagged result, not a sentinel string — a command that
//! legitimately evaluates to error-looking text is still a success.
//!
//! [`InProcessBridge`] is the bundled implementation: it pins a
//! [`ScriptEngine`] to a dedicated thread (the Lua state cannot move
//! between threads, and the registry's lock-free design requires exactly
//! one dispatch thread) and drains submissions strictly FIFO. A real
//! interprocess transport would implement [`EvalBridge`] instead; the
//! queue above does not care.

use crate::error::BridgeError;
use tether_engine::{EngineConfig, EngineError, ScriptEngine};
use tether_types::{EvalFailure, EvalOutcome};
use tokio::sync::oneshot;
use tracing::debug;

/// A one-command-at-a-time channel into the engine.
///
/// `submit` must not block: the outcome arrives through the reply
/// sender, exactly once per submission.
pub trait EvalBridge: Send + Sync {
    /// Submits one command for evaluation.
    fn submit(&self, command: String, reply: oneshot::Sender<EvalOutcome>);
}

struct Submission {
    command: String,
    reply: oneshot::Sender<EvalOutcome>,
}

/// Bridge to a [`ScriptEngine`] running on its own thread.
///
/// Submissions queue through an mpsc channel and are evaluated one at a
/// time in submission order, which makes the bridge's FIFO and
/// no-overlap guarantees structural. Dropping the bridge closes the
/// queue; the engine thread drains what was already submitted and
/// exits.
///
/// # Example
///
/// ```ignore
/// use tether_rpc::InProcessBridge;
/// use tether_engine::EngineConfig;
///
/// let bridge = InProcessBridge::spawn(EngineConfig::default(), |engine| {
///     engine.lua().load("Doc = ...").exec()?;
///     Ok(())
/// })?;
/// ```
pub struct InProcessBridge {
    tx: std::sync::mpsc::Sender<Submission>,
}

impl InProcessBridge {
    /// Spawns the engine thread and waits for it to come up.
    ///
    /// `setup` runs on the engine thread after construction and before
    /// any command is served — it is the place to seed host classes and
    /// objects into the Lua state, which cannot be touched from any
    /// other thread afterwards.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Init`] when engine construction or `setup` fails.
    pub fn spawn<F>(config: EngineConfig, setup: F) -> Result<Self, BridgeError>
    where
        F: FnOnce(&ScriptEngine) -> Result<(), EngineError> + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel::<Submission>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("tether-engine".to_string())
            .spawn(move || {
                let engine = match ScriptEngine::with_config(config)
                    .and_then(|engine| setup(&engine).map(|()| engine))
                {
                    Ok(engine) => {
                        let _ = ready_tx.send(Ok(()));
                        engine
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return;
                    }
                };

                while let Ok(Submission { command, reply }) = rx.recv() {
                    let outcome = engine.evaluate(&command);
                    // A dropped receiver means the caller timed out;
                    // nothing to deliver to.
                    let _ = reply.send(outcome);
                }
                debug!("engine thread stopped");
            })
            .map_err(|err| BridgeError::Spawn(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(message)) => Err(BridgeError::Init(message)),
            Err(_) => Err(BridgeError::Init("engine thread exited early".to_string())),
        }
    }
}

impl EvalBridge for InProcessBridge {
    fn submit(&self, command: String, reply: oneshot::Sender<EvalOutcome>) {
        if let Err(rejected) = self.tx.send(Submission { command, reply }) {
            let Submission { reply, .. } = rejected.0;
            let _ = reply.send(Err(EvalFailure::evaluation("engine thread stopped")));
        }
    }
}
