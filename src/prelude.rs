//! Convenient imports for common functionality.
//!
//! This module re-exports the types most callers need to open sessions and submit work.

pub use crate::broker::Broker;
pub use crate::config::{BrokerOptions, OptionsUpdate};
pub use crate::error::{BrokerError, ErrorKind, ErrorPayload};
pub use crate::operation::{BatchOperation, BatchRequest, SqlCommand};
pub use crate::registry::{OpenOutcome, OpenRequest};
pub use crate::request::{MethodCall, Request};
pub use crate::results::{BatchEntry, OperationOutput, QueryResult};
pub use crate::session::DatabasePath;
pub use crate::types::{CellValue, QueryEncoding, SessionId};
pub use crate::worker::Reply;
