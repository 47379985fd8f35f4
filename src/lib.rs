//! Synchronous PostgreSQL driver core.
//!
//! Runs statements through a pluggable [`backend::Backend`], rewrites inline
//! `/**...**/'literal'` annotations into server-side large objects before execution, and
//! streams typed results (scalar cells and fully read large objects) into a host
//! [`QueryEventHandlers`] consumer.

pub mod backend;
pub mod binder;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod handlers;
pub mod large_object;
pub mod prelude;
pub mod preprocess;
pub mod results;
pub mod session;
pub mod status;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod type_map;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use config::DriverConfig;
pub use driver::{API_VERSION, Driver, SqlDriver};
pub use error::{ConsumerError, DriverError, NativeError, Result};
pub use handlers::QueryEventHandlers;
pub use results::{ResultSet, Row};
pub use session::{Session, quote};
pub use type_map::{TypeRegistry, oid};
pub use types::{
    ColumnDescriptor, ColumnKind, LoFd, NO_LIMIT, Oid, Placeholder, QueryOptions, ResultOutcome,
};

#[cfg(feature = "postgres")]
pub use postgres::PostgresBackend;
