//! Convenient imports for common functionality.
//!
//! This module re-exports the types a host needs to drive queries.

pub use crate::backend::{Backend, NativeConnection};
pub use crate::config::DriverConfig;
pub use crate::driver::{API_VERSION, Driver, SqlDriver};
pub use crate::error::{ConsumerError, DriverError};
pub use crate::handlers::QueryEventHandlers;
pub use crate::results::{ResultSet, Row};
pub use crate::session::Session;
pub use crate::type_map::{TypeRegistry, oid};
pub use crate::types::{ColumnKind, NO_LIMIT, Placeholder, QueryOptions};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresBackend;
