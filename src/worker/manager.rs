use std::io;
use std::sync::mpsc::{self, Sender};
use std::thread;

use tokio::sync::oneshot;

use crate::error::BrokerError;
use crate::types::SessionId;

use super::channel::Command;
use super::dispatcher::run_worker;
use super::reply::Reply;

/// The running worker thread. Dropping it asks the thread to stop once every unit already
/// queued ahead of the stop has run.
pub(crate) struct ConfinedWorker {
    sender: Sender<Command>,
    generation: u64,
}

impl ConfinedWorker {
    pub(crate) fn spawn(generation: u64, priority: i32) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Command>();
        thread::Builder::new()
            .name(format!("sqlite-broker-{generation}"))
            .spawn(move || {
                run_worker(&receiver);
            })?;
        tracing::debug!(generation, priority, "started worker");
        Ok(Self { sender, generation })
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            sender: self.sender.clone(),
        }
    }
}

impl Drop for ConfinedWorker {
    fn drop(&mut self) {
        tracing::debug!(generation = self.generation, "stopping worker");
        let _ = self.sender.send(Command::Shutdown);
    }
}

/// Cheap clone of the worker's queue, handed to callers for submission outside the registry
/// lock.
#[derive(Clone)]
pub(crate) struct WorkerHandle {
    sender: Sender<Command>,
}

impl WorkerHandle {
    /// Enqueue a unit of work and return the future of its outcome. Never blocks.
    ///
    /// If the worker is already gone the reply resolves to
    /// [`BrokerError::DatabaseClosed`].
    pub(crate) fn request<T>(
        &self,
        session: SessionId,
        build: impl FnOnce(oneshot::Sender<Result<T, BrokerError>>) -> Command,
    ) -> Reply<T> {
        let (tx, rx) = oneshot::channel();
        // on failure the command, and its responder, is dropped
        let _ = self.sender.send(build(tx));
        Reply::new(session, rx)
    }
}
