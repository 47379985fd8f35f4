//! The native protocol seam.
//!
//! The driver never talks to a server directly. A [`Backend`] opens [`NativeConnection`]s,
//! and every statement execution and large-object primitive goes through that trait. The
//! PostgreSQL implementation lives in `crate::postgres`; tests use the in-memory backend
//! from `test_utils::memory` (feature `test-utils`).

use std::ops::BitOr;

use crate::error::NativeError;
use crate::types::{LoFd, Oid};

/// Connection readiness as reported by the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Ok,
    Bad,
}

/// Execution status of a single statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    EmptyQuery,
    CommandOk,
    TuplesOk,
    CopyOut,
    CopyIn,
    FatalError,
}

/// Open mode for large objects (`INV_READ` / `INV_WRITE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoMode(pub i32);

impl LoMode {
    pub const READ: LoMode = LoMode(0x40000);
    pub const WRITE: LoMode = LoMode(0x20000);
    pub const READ_WRITE: LoMode = LoMode(0x40000 | 0x20000);

    #[must_use]
    pub fn can_read(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }
}

impl BitOr for LoMode {
    type Output = LoMode;

    fn bitor(self, rhs: LoMode) -> LoMode {
        LoMode(self.0 | rhs.0)
    }
}

/// Seek origin for [`NativeConnection::lo_lseek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Name and type of a result field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeField {
    pub name: String,
    pub type_oid: Oid,
}

impl NativeField {
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
        }
    }
}

/// A fully materialized statement result.
///
/// Cells are the server's text representation; `None` is SQL NULL. The result is owned by
/// the query call that produced it and released when dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeResult {
    status: ExecStatus,
    error_message: Option<String>,
    fields: Vec<NativeField>,
    rows: Vec<Vec<Option<Vec<u8>>>>,
}

impl NativeResult {
    #[must_use]
    pub fn empty_query() -> Self {
        Self::with_status(ExecStatus::EmptyQuery)
    }

    #[must_use]
    pub fn command_ok() -> Self {
        Self::with_status(ExecStatus::CommandOk)
    }

    #[must_use]
    pub fn tuples(fields: Vec<NativeField>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self {
            status: ExecStatus::TuplesOk,
            error_message: None,
            fields,
            rows,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::FatalError,
            error_message: Some(message.into()),
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_status(status: ExecStatus) -> Self {
        Self {
            status,
            error_message: None,
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> ExecStatus {
        self.status
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub fn fields(&self) -> &[NativeField] {
        &self.fields
    }

    #[must_use]
    pub fn nfields(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn ntuples(&self) -> usize {
        self.rows.len()
    }

    /// Cell text at (`row`, `col`); `None` for NULL or out-of-range positions.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> Option<&[u8]> {
        self.rows.get(row)?.get(col)?.as_deref()
    }
}

/// Opens native connections. Injected into [`crate::Driver`] at construction.
pub trait Backend {
    type Connection: NativeConnection;

    /// Resolve or verify the native client named by `library`.
    ///
    /// Backends linked at build time accept any library.
    ///
    /// # Errors
    /// Returns the reason the client could not be made available.
    fn initialize(&mut self, library: &str) -> Result<(), NativeError> {
        let _ = library;
        Ok(())
    }

    /// Open a connection for a full connection string (scheme prefix included).
    ///
    /// # Errors
    /// Returns the native failure text when no connection handle could be produced.
    fn connect(&self, conninfo: &str) -> Result<Self::Connection, NativeError>;
}

/// One live protocol session. Blocking; not shared across threads without external locking.
pub trait NativeConnection {
    fn status(&self) -> ConnStatus;

    /// Text of the most recent failure on this connection.
    fn error_message(&self) -> String;

    /// Execute a statement without parameters.
    ///
    /// # Errors
    /// Returns an error only when no result could be produced at all; server-side statement
    /// failures come back as a [`NativeResult`] with [`ExecStatus::FatalError`].
    fn exec(&mut self, sql: &str) -> Result<NativeResult, NativeError>;

    /// Execute a statement with text-format positional parameters; `None` is NULL.
    ///
    /// # Errors
    /// Same contract as [`NativeConnection::exec`].
    fn exec_params(
        &mut self,
        sql: &str,
        params: &[Option<&[u8]>],
    ) -> Result<NativeResult, NativeError>;

    /// Create a new, empty large object.
    ///
    /// # Errors
    /// Returns the server's text when the object cannot be allocated.
    fn lo_creat(&mut self, mode: LoMode) -> Result<Oid, NativeError>;

    /// # Errors
    /// Returns the server's text when the object does not exist or cannot be opened.
    fn lo_open(&mut self, object: Oid, mode: LoMode) -> Result<LoFd, NativeError>;

    /// Read up to `buf.len()` bytes at the current position; returns the count read.
    ///
    /// # Errors
    /// Returns the server's text on failure.
    fn lo_read(&mut self, fd: LoFd, buf: &mut [u8]) -> Result<usize, NativeError>;

    /// Write `buf` at the current position; returns the count written.
    ///
    /// # Errors
    /// Returns the server's text on failure.
    fn lo_write(&mut self, fd: LoFd, buf: &[u8]) -> Result<usize, NativeError>;

    /// Move the position; returns the new absolute position.
    ///
    /// # Errors
    /// Returns the server's text on failure.
    fn lo_lseek(&mut self, fd: LoFd, offset: i64, whence: Whence) -> Result<i64, NativeError>;

    /// # Errors
    /// Returns the server's text on failure.
    fn lo_tell(&mut self, fd: LoFd) -> Result<i64, NativeError>;

    /// # Errors
    /// Returns the server's text on failure.
    fn lo_close(&mut self, fd: LoFd) -> Result<(), NativeError>;

    /// # Errors
    /// Returns the server's text on failure.
    fn lo_unlink(&mut self, object: Oid) -> Result<(), NativeError>;

    /// Release the session.
    fn finish(self)
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lo_mode_flags_combine() {
        let mode = LoMode::READ | LoMode::WRITE;
        assert_eq!(mode, LoMode::READ_WRITE);
        assert!(mode.can_read() && mode.can_write());
        assert!(!LoMode::READ.can_write());
        assert!(!LoMode::WRITE.can_read());
    }

    #[test]
    fn result_value_lookup_handles_null_and_bounds() {
        let result = NativeResult::tuples(
            vec![NativeField::new("a", 23), NativeField::new("b", 25)],
            vec![vec![Some(b"1".to_vec()), None]],
        );
        assert_eq!(result.nfields(), 2);
        assert_eq!(result.ntuples(), 1);
        assert_eq!(result.value(0, 0), Some(&b"1"[..]));
        assert_eq!(result.value(0, 1), None);
        assert_eq!(result.value(1, 0), None);
        assert_eq!(result.value(0, 5), None);
    }
}
