//! Chunked large-object transfer.
//!
//! All reads and writes go through the native connection in slices of at most
//! `chunk_size` bytes, whatever the size of the caller's buffer.

use crate::backend::{LoMode, NativeConnection, Whence};
use crate::error::{DriverError, Result};
use crate::types::{LoFd, Oid};

/// Write all of `bytes` to `fd` in chunks of at most `chunk_size`.
///
/// A chunk call that transfers nothing, or fails, ends the loop; anything left unwritten is
/// a hard failure.
///
/// # Errors
/// Returns `DriverError::LargeObjectError` if not every byte could be written.
pub fn write_chunked<C: NativeConnection + ?Sized>(
    conn: &mut C,
    fd: LoFd,
    bytes: &[u8],
    chunk_size: usize,
) -> Result<()> {
    let mut remaining = bytes;
    while !remaining.is_empty() {
        let len = remaining.len().min(chunk_size);
        match conn.lo_write(fd, &remaining[..len]) {
            Ok(0) => break,
            Ok(written) => remaining = &remaining[written.min(len)..],
            Err(err) => {
                return Err(DriverError::large_object(
                    "lo_write could not write all bytes of object",
                    &err,
                ));
            }
        }
    }
    if remaining.is_empty() {
        Ok(())
    } else {
        Err(DriverError::LargeObjectError(
            "lo_write could not write all bytes of object".to_string(),
        ))
    }
}

/// Read exactly `length` bytes from `fd` in chunks of at most `chunk_size`.
///
/// # Errors
/// Returns `DriverError::LargeObjectError` on a failed or short read.
pub fn read_chunked<C: NativeConnection + ?Sized>(
    conn: &mut C,
    fd: LoFd,
    length: usize,
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        let end = length.min(filled + chunk_size);
        match conn.lo_read(fd, &mut buf[filled..end]) {
            Ok(0) => break,
            Ok(read) => filled += read.min(end - filled),
            Err(err) => {
                return Err(DriverError::large_object(
                    "lo_read can not read all bytes of object",
                    &err,
                ));
            }
        }
    }
    if filled == length {
        Ok(buf)
    } else {
        Err(DriverError::LargeObjectError(
            "lo_read can not read all bytes of object".to_string(),
        ))
    }
}

/// Fetch the full contents of a large object.
///
/// Opens the object, probes its length by seeking to the end, rewinds, reads and closes.
/// An empty object yields `None`.
///
/// # Errors
/// Returns `DriverError::LargeObjectError` with the server's text if any step fails. The
/// handle is closed on every path.
pub fn read_object<C: NativeConnection + ?Sized>(
    conn: &mut C,
    object: Oid,
    chunk_size: usize,
) -> Result<Option<Vec<u8>>> {
    let fd = conn
        .lo_open(object, LoMode::READ)
        .map_err(|e| DriverError::large_object(&format!("lo_open of object {object}"), &e))?;

    let contents = read_open_object(conn, fd, chunk_size);
    let closed = conn.lo_close(fd);

    let contents = match contents {
        Ok(contents) => contents,
        Err(err) => {
            if let Err(close_err) = closed {
                tracing::warn!(object, fd, error = %close_err, "lo_close failed after read error");
            }
            return Err(err);
        }
    };
    closed.map_err(|e| DriverError::large_object("lo_close", &e))?;

    tracing::trace!(object, len = contents.as_ref().map_or(0, Vec::len), "large object read");
    Ok(contents)
}

fn read_open_object<C: NativeConnection + ?Sized>(
    conn: &mut C,
    fd: LoFd,
    chunk_size: usize,
) -> Result<Option<Vec<u8>>> {
    conn.lo_lseek(fd, 0, Whence::End)
        .map_err(|e| DriverError::large_object("lo_lseek to end", &e))?;
    let size = conn
        .lo_tell(fd)
        .map_err(|e| DriverError::large_object("lo_tell", &e))?;
    let length = usize::try_from(size).map_err(|_| {
        DriverError::LargeObjectError(format!("lo_tell returned invalid size {size}"))
    })?;
    conn.lo_lseek(fd, 0, Whence::Start)
        .map_err(|e| DriverError::large_object("lo_lseek to start", &e))?;

    if length == 0 {
        return Ok(None);
    }
    read_chunked(conn, fd, length, chunk_size).map(Some)
}

/// Streaming upload into a freshly created large object.
///
/// Bytes are staged up to `chunk_size` and flushed chunk by chunk, so a literal is never
/// held as one buffer.
#[derive(Debug)]
pub struct LargeObjectWriter<'c, C: NativeConnection + ?Sized> {
    conn: &'c mut C,
    object: Oid,
    fd: LoFd,
    chunk_size: usize,
    staged: Vec<u8>,
    written: usize,
}

impl<'c, C: NativeConnection + ?Sized> LargeObjectWriter<'c, C> {
    /// Create a new object and open it for writing.
    ///
    /// # Errors
    /// Returns `DriverError::LargeObjectError` if `chunk_size` is zero or the object cannot
    /// be created or opened.
    pub fn create(conn: &'c mut C, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DriverError::LargeObjectError(
                "large object chunk size must be positive".to_string(),
            ));
        }
        let object = conn
            .lo_creat(LoMode::READ_WRITE)
            .map_err(|e| DriverError::large_object("lo_creat", &e))?;
        let fd = conn
            .lo_open(object, LoMode::WRITE)
            .map_err(|e| DriverError::large_object(&format!("lo_open of object {object}"), &e))?;
        tracing::trace!(object, fd, "large object created");
        Ok(Self {
            conn,
            object,
            fd,
            chunk_size,
            staged: Vec::with_capacity(chunk_size),
            written: 0,
        })
    }

    #[must_use]
    pub fn object(&self) -> Oid {
        self.object
    }

    /// Append bytes, flushing every full chunk.
    ///
    /// # Errors
    /// Returns `DriverError::LargeObjectError` on a failed or short write.
    pub fn write(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let room = self.chunk_size - self.staged.len();
            let take = room.min(bytes.len());
            self.staged.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.staged.len() == self.chunk_size {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        write_chunked(&mut *self.conn, self.fd, &self.staged, self.chunk_size)?;
        self.written += self.staged.len();
        self.staged.clear();
        Ok(())
    }

    /// Flush the tail, close the handle and return the object identifier.
    ///
    /// # Errors
    /// Returns `DriverError::LargeObjectError` if the final write or the close fails. The
    /// handle is closed either way.
    pub fn finish(mut self) -> Result<Oid> {
        if let Err(err) = self.flush() {
            self.abandon();
            return Err(err);
        }
        self.conn
            .lo_close(self.fd)
            .map_err(|e| DriverError::large_object("lo_close", &e))?;
        tracing::trace!(object = self.object, len = self.written, "large object written");
        Ok(self.object)
    }

    /// Close the handle after a failure; the close error, if any, is only logged.
    pub fn abandon(self) {
        if let Err(err) = self.conn.lo_close(self.fd) {
            tracing::warn!(object = self.object, error = %err, "lo_close failed on abandoned upload");
        }
    }
}
