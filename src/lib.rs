//! Session broker for embedded SQLite databases.
//!
//! A [`Broker`] keeps a registry of open database sessions and runs every engine operation on
//! one confined worker thread, one unit at a time and in submission order. Open and close are
//! handled synchronously; execute, insert, update, query and batch calls return a [`Reply`]
//! that resolves once the worker has run them.
//!
//! Calls can be made through the typed methods on [`Broker`] or as [`MethodCall`]s decoded
//! from a method name and a JSON argument map, see [`Broker::handle`].

pub mod broker;
pub mod config;
pub mod error;
pub mod operation;
pub mod params;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod results;
pub mod sanitize;
pub mod session;
pub mod types;
mod worker;

pub use broker::Broker;
pub use config::{BrokerOptions, BrokerOptionsBuilder, DEFAULT_WORKER_PRIORITY, OptionsUpdate};
pub use error::{BrokerError, ErrorKind, ErrorPayload, SqlErrorContext};
pub use operation::{BatchOperation, BatchRequest, Operation, OperationKind, SqlCommand};
pub use registry::{OpenOutcome, OpenRequest, RegistrySnapshot};
pub use request::{MethodCall, Request};
pub use results::{BatchEntry, OperationOutput, QueryResult};
pub use session::{DatabasePath, MEMORY_DATABASE_PATH};
pub use types::{CellValue, QueryEncoding, SessionId};
pub use worker::Reply;
