//! Cancellation signal shared by the tasks of one cycle.
//!
//! Built on a `tokio::sync::watch` channel holding a single `bool`, the same
//! shutdown mechanism the WebSocket connection loop uses. [`Cancellation`]
//! is the owning side; any number of [`CancelSignal`] clones observe it.

use std::future::Future;

use tokio::sync::watch;

use crate::error::FeedError;

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct Cancellation {
    tx: watch::Sender<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A new observer of this cancellation.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal { rx: self.tx.subscribe() }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a [`Cancellation`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pends forever if the owning
    /// [`Cancellation`] is dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Race `fut` against the signal; returns [`FeedError::Cancelled`] if the
    /// signal wins.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, FeedError>
    where
        F: Future<Output = Result<T, FeedError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(FeedError::Cancelled),
            res = fut => res,
        }
    }
}
