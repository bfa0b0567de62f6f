//! Call bridge
//!
//! Lets callers in a blocking context invoke the relay's async dispatch
//! without owning an event loop. The bridge holds a dedicated runtime on its
//! own worker threads; `run` spawns the future there and blocks the calling
//! thread on a plain channel. The calling thread never enters a runtime, so
//! invoking this from inside another event loop cannot deadlock and cannot
//! trip tokio's nested-runtime panic. One loop inside another is ruled out
//! by construction rather than patched around.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::orchestrator::{AdapterHealth, Relay};
use crate::types::{GenerationRequest, GenerationResult, RelayError, RelayResult};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("call did not complete within the allotted time")]
    Timeout,
    #[error("dispatch task terminated without a result")]
    TaskFailed,
}

/// Dedicated execution context for blocking callers.
pub struct CallBridge {
    runtime: tokio::runtime::Runtime,
}

impl CallBridge {
    pub fn new() -> RelayResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("textrelay-bridge")
            .enable_all()
            .build()
            .map_err(|e| RelayError::Config(format!("cannot start bridge runtime: {e}")))?;
        Ok(Self { runtime })
    }

    /// Run `future` on the bridge runtime and block until it completes or
    /// the timeout elapses. On timeout the spawned task is aborted, so the
    /// cancellation is observed rather than silently discarded.
    pub fn run<F>(&self, future: F, timeout: Option<Duration>) -> Result<F::Output, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = self.runtime.spawn(async move {
            // The receiver may be gone already when the caller timed out.
            let _ = tx.send(future.await);
        });

        let received = match timeout {
            Some(limit) => rx.recv_timeout(limit).map_err(|err| match err {
                mpsc::RecvTimeoutError::Timeout => BridgeError::Timeout,
                mpsc::RecvTimeoutError::Disconnected => BridgeError::TaskFailed,
            }),
            None => rx.recv().map_err(|_| BridgeError::TaskFailed),
        };

        if matches!(received, Err(BridgeError::Timeout)) {
            handle.abort();
        }
        received
    }
}

/// Synchronous facade over a shared [`Relay`].
pub struct BlockingRelay {
    relay: Arc<Relay>,
    bridge: CallBridge,
}

impl BlockingRelay {
    pub fn new(relay: Arc<Relay>) -> RelayResult<Self> {
        Ok(Self {
            relay,
            bridge: CallBridge::new()?,
        })
    }

    /// Blocking [`Relay::generate`]. The timeout bounds the whole dispatch,
    /// cache operations included, and maps to
    /// [`RelayError::DeadlineExceeded`] on expiry.
    pub fn generate(
        &self,
        request: GenerationRequest,
        timeout: Option<Duration>,
    ) -> RelayResult<GenerationResult> {
        let relay = Arc::clone(&self.relay);
        match self
            .bridge
            .run(async move { relay.generate(request).await }, timeout)
        {
            Ok(outcome) => outcome,
            Err(BridgeError::Timeout) => Err(RelayError::DeadlineExceeded),
            Err(BridgeError::TaskFailed) => {
                warn!("bridge task died before answering");
                Err(RelayError::Internal("dispatch task died".to_string()))
            }
        }
    }

    /// Breaker states, directly readable without entering the runtime.
    pub fn health(&self) -> Vec<AdapterHealth> {
        self.relay.health()
    }
}
