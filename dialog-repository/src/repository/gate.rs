//! Index readiness gate
//!
//! Collections build their secondary indexes asynchronously and announce
//! completion once. The gate caches that announcement: callers that ask
//! before it arrives wait on a one-shot channel, and callers that ask after
//! it get the cached answer without registering anything.

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct GateState {
    indexed: Option<bool>,
    waiters: Vec<oneshot::Sender<bool>>,
}

/// Single-resolution broadcast of index readiness
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use dialog_repository::repository::IndexGate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = Arc::new(IndexGate::new());
/// let waiter = tokio::spawn({
///     let gate = Arc::clone(&gate);
///     async move { gate.wait_indexed().await }
/// });
/// tokio::task::yield_now().await;
/// gate.resolve(true);
/// assert!(waiter.await.unwrap());
/// assert!(gate.wait_indexed().await);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct IndexGate {
    state: Mutex<GateState>,
}

impl IndexGate {
    /// A gate that has not observed the index event yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the index event has been observed
    ///
    /// Resolves immediately once the event has fired. There is no timeout.
    pub async fn wait_indexed(&self) -> bool {
        let receiver = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(indexed) = state.indexed {
                return indexed;
            }
            // Drop waiters whose futures were abandoned.
            state.waiters.retain(|sender| !sender.is_closed());
            let (sender, receiver) = oneshot::channel();
            state.waiters.push(sender);
            receiver
        };
        receiver.await.unwrap_or(false)
    }

    /// Record the index event and release every waiter
    ///
    /// Only the first call has an effect.
    pub fn resolve(&self, indexed: bool) {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.indexed.is_some() {
                return;
            }
            state.indexed = Some(indexed);
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            // A dropped receiver just means nobody is listening any more.
            let _ = waiter.send(indexed);
        }
    }

    /// Cached readiness, `None` until the event fires
    pub fn state(&self) -> Option<bool> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .indexed
    }

    /// Number of callers currently registered
    pub fn pending_waiters(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiters
            .len()
    }
}
