use std::borrow::Cow;

use crate::backend::{Backend, ConnStatus, NativeConnection};
use crate::error::{DriverError, Result};

/// A live server session.
///
/// Owns the native connection and the charset tag negotiated with the host. One session
/// serves one query at a time; release it with [`crate::SqlDriver::disconnect`].
#[derive(Debug)]
pub struct Session<C: NativeConnection> {
    conn: C,
    charset: String,
}

impl<C: NativeConnection> Session<C> {
    /// Open a session for `url`, prefixed with `url_prefix`.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionError` if no handle could be opened or the handle is
    /// not ready.
    pub fn open<B>(backend: &B, url_prefix: &str, url: &str, charset: &str) -> Result<Self>
    where
        B: Backend<Connection = C>,
    {
        let conninfo = format!("{url_prefix}{url}");
        let conn = backend
            .connect(&conninfo)
            .map_err(|e| DriverError::ConnectionError(e.to_string()))?;
        if conn.status() != ConnStatus::Ok {
            let message = conn.error_message();
            conn.finish();
            return Err(DriverError::ConnectionError(message));
        }
        tracing::debug!(charset, "session opened");
        Ok(Self {
            conn,
            charset: charset.to_string(),
        })
    }

    /// Wrap an already connected handle.
    pub fn from_connection(conn: C, charset: impl Into<String>) -> Self {
        Self {
            conn,
            charset: charset.into(),
        }
    }

    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }

    /// True iff the session is ready. Never fails.
    #[must_use]
    pub fn ping(&self) -> bool {
        self.conn.status() == ConnStatus::Ok
    }

    pub(crate) fn close(self) {
        self.conn.finish();
        tracing::debug!("session closed");
    }
}

/// Escape `bytes` for use inside a single-quoted SQL literal by doubling every `'`.
///
/// Input without a quote byte is returned borrowed.
///
/// ```rust
/// use pgsql_lob_driver::session::quote;
///
/// assert_eq!(quote(b"it's"), &b"it''s"[..]);
/// ```
#[must_use]
pub fn quote(bytes: &[u8]) -> Cow<'_, [u8]> {
    let quotes = bytes.iter().filter(|&&b| b == b'\'').count();
    if quotes == 0 {
        return Cow::Borrowed(bytes);
    }
    let mut escaped = Vec::with_capacity(bytes.len() + quotes);
    for &b in bytes {
        escaped.push(b);
        if b == b'\'' {
            escaped.push(b'\'');
        }
    }
    Cow::Owned(escaped)
}
