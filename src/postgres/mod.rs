//! PostgreSQL backend built on `tokio-postgres`.
//!
//! Connections are blocking: each one owns a current-thread `tokio` runtime that drives the
//! client and its connection task.

mod connection;
pub mod params;
pub mod text;

use tokio_postgres::NoTls;

pub use connection::PgConnection;

use crate::backend::Backend;
use crate::error::NativeError;

/// [`Backend`] that connects to a real server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresBackend;

impl Backend for PostgresBackend {
    type Connection = PgConnection;

    fn connect(&self, conninfo: &str) -> Result<PgConnection, NativeError> {
        let config: tokio_postgres::Config = conninfo
            .parse()
            .map_err(|e: tokio_postgres::Error| NativeError::new(connection::error_text(&e)))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NativeError::new(format!("could not start session runtime: {e}")))?;

        let (client, driver_task) = runtime
            .block_on(config.connect(NoTls))
            .map_err(|e| NativeError::new(connection::error_text(&e)))?;
        runtime.spawn(async move {
            if let Err(e) = driver_task.await {
                tracing::warn!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(PgConnection::new(runtime, client))
    }
}
