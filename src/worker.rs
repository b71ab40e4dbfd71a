// Confined worker - the single thread that runs every engine operation in the process
//
// - channel: commands submitted to the worker
// - manager: worker lifecycle and submission handles
// - dispatcher: the worker's run loop
// - reply: future resolving to a unit of work's outcome

mod channel;
mod dispatcher;
mod manager;
mod reply;

pub(crate) use channel::{Command, Responder};
pub(crate) use manager::{ConfinedWorker, WorkerHandle};
pub use reply::Reply;
