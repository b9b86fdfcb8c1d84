//! Tokio-Runtime hinter der synchronen Client-API.
//!
//! The emulator calls into the client from its frame loop, which is plain
//! synchronous code. Every RPC and stream operation is driven to completion
//! here with [`ClientNetworkRuntime::block_on`]; clones share one runtime so
//! a client and all of its handlers talk over the same channel.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// Worker threads used by [`ClientNetworkRuntime::multi_thread`]. One drives
/// the HTTP/2 connection, the other the outbound event stream.
pub const DEFAULT_WORKER_THREADS: usize = 2;

#[derive(Debug, Clone)]
pub struct ClientNetworkRuntime {
    runtime: Arc<Runtime>,
}

impl ClientNetworkRuntime {
    pub fn multi_thread() -> Result<Self, RuntimeError> {
        Self::with_worker_threads(DEFAULT_WORKER_THREADS)
    }

    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, RuntimeError> {
        if worker_threads == 0 {
            return Err(RuntimeError::NoWorkers);
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("netplay-client")
            .enable_all()
            .build()
            .map_err(RuntimeError::Build)?;
        debug!(worker_threads, "client runtime started");
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// Blockiert den aufrufenden Thread, bis das Future fertig ist.
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to build tokio runtime: {0}")]
    Build(std::io::Error),
    #[error("client runtime needs at least one worker thread")]
    NoWorkers,
}
