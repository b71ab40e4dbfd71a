use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::BrokerError;
use crate::types::SessionId;

/// Outcome of a unit of work submitted to the confined worker.
///
/// The work is already queued by the time a `Reply` exists; awaiting it only collects the
/// result on the awaiting task. Dropping a `Reply` does not cancel the work.
#[must_use = "the work runs regardless, but its outcome is lost unless the reply is awaited"]
#[derive(Debug)]
pub struct Reply<T> {
    session: SessionId,
    rx: oneshot::Receiver<Result<T, BrokerError>>,
}

impl<T> Reply<T> {
    pub(crate) fn new(session: SessionId, rx: oneshot::Receiver<Result<T, BrokerError>>) -> Self {
        Self { session, rx }
    }

    /// A reply that is already resolved with `err`.
    pub(crate) fn failed(session: SessionId, err: BrokerError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { session, rx }
    }

    /// Session the work was submitted for.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Block the current thread until the outcome arrives.
    ///
    /// For callers outside an async runtime.
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    ///
    /// # Errors
    /// Returns the unit's error, or [`BrokerError::DatabaseClosed`] if the worker went away
    /// before replying.
    pub fn wait(self) -> Result<T, BrokerError> {
        let session = self.session;
        self.rx
            .blocking_recv()
            .unwrap_or(Err(BrokerError::DatabaseClosed(session)))
    }
}

impl<T> Future for Reply<T> {
    type Output = Result<T, BrokerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let session = self.session;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(BrokerError::DatabaseClosed(session))))
    }
}
