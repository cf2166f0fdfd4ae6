//! Await bridge — the one primitive that lets an otherwise-fully-async core
//! expose thread-blocking behavior (§4.5, §9).
//!
//! Isolated here so the connection engine itself stays pure `async`; only
//! [`crate::manager::ConnectionManager`]'s blocking facade reaches for this.
//! On timeout, the bridge does not cancel the observed future — cancelling
//! the underlying operation, if desired, is the caller's responsibility.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::ClientError;

/// Runs a future to completion on a tokio runtime handle, enforcing a
/// deadline. Blocks the calling OS thread until the future resolves or the
/// deadline elapses.
#[derive(Clone)]
pub struct AwaitBridge {
    handle: Handle,
}

impl AwaitBridge {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime the calling thread is already inside.
    ///
    /// # Panics
    /// Panics if called outside of a tokio runtime context, matching
    /// [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Block the calling thread until `fut` resolves or `timeout` elapses,
    /// naming the operation in the resulting [`ClientError::Timeout`].
    ///
    /// Drives `fut` with [`Handle::block_on`] directly: the expected caller
    /// is a plain synchronous thread (the embedding host's own thread, or a
    /// `spawn_blocking` slot) with no runtime context of its own, and
    /// arbitrary such threads may call this concurrently — each gets its
    /// own independent drive of the shared runtime. Calling this from a
    /// thread that is itself already polling a task on the same runtime is
    /// unsupported (`Handle::block_on` panics in that case); per §5's
    /// "serialize outer waits" allowance, such a caller must hop off the
    /// runtime first (e.g. via `spawn_blocking`) before invoking the
    /// blocking facade.
    pub fn block_on<F, T>(&self, operation: &str, timeout: Duration, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        self.handle.block_on(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::timeout(operation)),
            }
        })
    }
}
