use std::borrow::Cow;

use crate::backend::{Backend, NativeConnection};
use crate::binder::bind_parameters;
use crate::config::DriverConfig;
use crate::decoder::{DecodeLimits, decode};
use crate::error::{DriverError, Result};
use crate::handlers::QueryEventHandlers;
use crate::preprocess::preprocess;
use crate::session::{Session, quote};
use crate::type_map::TypeRegistry;
use crate::types::{Placeholder, QueryOptions};

/// Host protocol compatibility tag.
pub const API_VERSION: u32 = 9;

/// The fixed operation set a host drives.
pub trait SqlDriver {
    type Session;

    fn api_version(&self) -> u32;

    /// Make the native client available.
    ///
    /// # Errors
    /// Returns `DriverError::ProtocolError` when `library` is missing or the backend
    /// rejects it.
    fn initialize(&mut self, library: Option<&str>) -> Result<()>;

    /// Open a session; `charset` falls back to the configured default.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionError` with the native failure text.
    fn connect(&self, url: &str, charset: Option<&str>) -> Result<Self::Session>;

    /// Release a session. Taking it by value rules out a second disconnect.
    fn disconnect(&self, session: Self::Session);

    /// Statements auto-commit; nothing to do.
    ///
    /// # Errors
    /// Never fails.
    fn commit(&self, session: &mut Self::Session) -> Result<()>;

    /// Statements auto-commit; nothing to do.
    ///
    /// # Errors
    /// Never fails.
    fn rollback(&self, session: &mut Self::Session) -> Result<()>;

    fn ping(&self, session: &Self::Session) -> bool;

    fn quote<'a>(&self, session: &Self::Session, bytes: &'a [u8]) -> Cow<'a, [u8]>;

    /// Run one statement and stream its result into `handlers`.
    ///
    /// `limit == NO_LIMIT` means unlimited; `offset == 0` means no offset.
    ///
    /// # Errors
    /// Any failure aborts the whole query; see [`DriverError`].
    fn query(
        &self,
        session: &mut Self::Session,
        statement: &str,
        placeholders: &[Placeholder],
        offset: u64,
        limit: u64,
        handlers: &mut dyn QueryEventHandlers,
    ) -> Result<()>;
}

/// Driver over an injected [`Backend`].
#[derive(Debug)]
pub struct Driver<B: Backend> {
    backend: B,
    config: DriverConfig,
    types: TypeRegistry,
}

impl<B: Backend> Driver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: DriverConfig::default(),
            types: TypeRegistry::default(),
        }
    }

    /// # Errors
    /// Returns `DriverError::ConfigError` if `config` does not validate.
    pub fn with_config(backend: B, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            types: TypeRegistry::default(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Mutable access for registering extra type identifiers.
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// [`SqlDriver::query`] with the window given as [`QueryOptions`].
    ///
    /// # Errors
    /// See [`SqlDriver::query`].
    pub fn query_with_options<H>(
        &self,
        session: &mut Session<B::Connection>,
        statement: &str,
        placeholders: &[Placeholder],
        options: &QueryOptions,
        handlers: &mut H,
    ) -> Result<()>
    where
        H: QueryEventHandlers + ?Sized,
    {
        let span = tracing::debug_span!(
            "pgsql.query",
            statement_len = statement.len(),
            placeholders = placeholders.len()
        );
        let _span_guard = span.entered();

        let params = bind_parameters(placeholders)?;
        let conn = session.connection();
        let rewritten = preprocess(conn, statement, options, self.config.lob_chunk_size)?;
        if !rewritten.large_objects.is_empty() {
            tracing::debug!(objects = rewritten.large_objects.len(), "literals uploaded");
        }

        let executed = if params.is_empty() {
            conn.exec(&rewritten.sql)
        } else {
            conn.exec_params(&rewritten.sql, &params)
        };
        let result = executed.map_err(|e| DriverError::StatementError(e.to_string()))?;

        let limits = DecodeLimits {
            max_columns: self.config.max_columns,
            lob_chunk_size: self.config.lob_chunk_size,
        };
        decode(conn, result, &self.types, limits, handlers)
    }
}

impl<B: Backend> SqlDriver for Driver<B> {
    type Session = Session<B::Connection>;

    fn api_version(&self) -> u32 {
        API_VERSION
    }

    fn initialize(&mut self, library: Option<&str>) -> Result<()> {
        let Some(library) = library else {
            return Err(DriverError::ProtocolError(
                "client library column is empty".to_string(),
            ));
        };
        self.backend
            .initialize(library)
            .map_err(|e| DriverError::ProtocolError(e.to_string()))
    }

    fn connect(&self, url: &str, charset: Option<&str>) -> Result<Self::Session> {
        let charset = charset.unwrap_or(self.config.charset.as_str());
        Session::open(&self.backend, &self.config.url_prefix, url, charset)
    }

    fn disconnect(&self, session: Self::Session) {
        session.close();
    }

    fn commit(&self, _session: &mut Self::Session) -> Result<()> {
        Ok(())
    }

    fn rollback(&self, _session: &mut Self::Session) -> Result<()> {
        Ok(())
    }

    fn ping(&self, session: &Self::Session) -> bool {
        session.ping()
    }

    fn quote<'a>(&self, _session: &Self::Session, bytes: &'a [u8]) -> Cow<'a, [u8]> {
        quote(bytes)
    }

    fn query(
        &self,
        session: &mut Self::Session,
        statement: &str,
        placeholders: &[Placeholder],
        offset: u64,
        limit: u64,
        handlers: &mut dyn QueryEventHandlers,
    ) -> Result<()> {
        let options = QueryOptions::from_window(offset, limit);
        self.query_with_options(session, statement, placeholders, &options, handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultSet;
    use crate::test_utils::memory::{MemoryBackend, MemoryServer};
    use crate::types::NO_LIMIT;

    fn driver() -> (MemoryServer, Driver<MemoryBackend>) {
        let server = MemoryServer::new();
        let driver = Driver::new(server.backend());
        (server, driver)
    }

    #[test]
    fn initialize_requires_a_library() {
        let (server, mut driver) = driver();
        let err = driver.initialize(None).unwrap_err();
        assert!(matches!(err, DriverError::ProtocolError(ref m) if m == "client library column is empty"));
        assert!(driver.initialize(Some("libpq.so")).is_ok());

        server.reject_library("libmissing.so");
        assert!(matches!(
            driver.initialize(Some("libmissing.so")),
            Err(DriverError::ProtocolError(_))
        ));
    }

    #[test]
    fn connect_uses_configured_charset() {
        let (_server, driver) = driver();
        let session = driver.connect("localhost/db", None).unwrap();
        assert_eq!(session.charset(), "UTF-8");
        assert!(driver.ping(&session));
        driver.disconnect(session);

        let session = driver.connect("localhost/db", Some("WIN1251")).unwrap();
        assert_eq!(session.charset(), "WIN1251");
    }

    #[test]
    fn refused_connection_is_a_connection_error() {
        let (server, driver) = driver();
        server.refuse_connections("could not connect to server: Connection refused");
        assert!(matches!(
            driver.connect("localhost/db", None),
            Err(DriverError::ConnectionError(ref m)) if m.contains("Connection refused")
        ));
    }

    #[test]
    fn commit_and_rollback_are_no_ops() {
        let (server, driver) = driver();
        let mut session = driver.connect("db", None).unwrap();
        driver.commit(&mut session).unwrap();
        driver.rollback(&mut session).unwrap();
        assert!(server.executed().is_empty());
    }

    #[test]
    fn query_without_placeholders_uses_plain_exec() {
        let (server, driver) = driver();
        let mut session = driver.connect("db", None).unwrap();
        let mut rows = ResultSet::default();
        driver
            .query(&mut session, "DELETE FROM t", &[], 0, NO_LIMIT, &mut rows)
            .unwrap();
        assert_eq!(server.executed()[0].params, None);
    }

    #[test]
    fn query_with_placeholders_uses_exec_params() {
        let (server, driver) = driver();
        let mut session = driver.connect("db", None).unwrap();
        let mut rows = ResultSet::default();
        driver
            .query(
                &mut session,
                "UPDATE t SET a = $2 WHERE id = $1",
                &[Placeholder::new("2", "x"), Placeholder::new("1", "7")],
                0,
                NO_LIMIT,
                &mut rows,
            )
            .unwrap();
        assert_eq!(
            server.executed()[0].params,
            Some(vec![Some(b"7".to_vec()), Some(b"x".to_vec())])
        );
    }

    #[test]
    fn bad_key_fails_before_any_upload() {
        let (server, driver) = driver();
        let mut session = driver.connect("db", None).unwrap();
        let err = driver
            .query(
                &mut session,
                "INSERT INTO t VALUES (/**b**/'x', $1)",
                &[Placeholder::new("7", "v")],
                0,
                NO_LIMIT,
                &mut ResultSet::default(),
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::BindingError(_)));
        assert_eq!(server.object_count(), 0);
        assert!(server.executed().is_empty());
    }
}
