//! A scripted, in-memory stand-in for a PostgreSQL server.
//!
//! [`MemoryServer`] holds large objects and canned statement results; [`MemoryBackend`]
//! opens [`MemoryConnection`]s against it. Every large-object primitive is recorded as a
//! [`LoCall`] so tests can check chunking and handle discipline.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{
    Backend, ConnStatus, LoMode, NativeConnection, NativeResult, Whence,
};
use crate::error::NativeError;
use crate::types::{LoFd, Oid};

const FIRST_OID: Oid = 16_384;

const COMMAND_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "BEGIN", "COMMIT", "ROLLBACK",
    "SET", "TRUNCATE",
];

/// One recorded large-object primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoCall {
    Create,
    Open(Oid),
    Read(usize),
    Write(usize),
    Seek(i64, Whence),
    Tell,
    Close,
    Unlink(Oid),
}

/// A statement as the server received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Option<Vec<Option<Vec<u8>>>>,
}

#[derive(Debug, Default)]
struct ServerState {
    objects: BTreeMap<Oid, Vec<u8>>,
    next_oid: Oid,
    exact: HashMap<String, NativeResult>,
    prefixed: Vec<(String, NativeResult)>,
    executed: Vec<ExecutedStatement>,
    lo_calls: Vec<LoCall>,
    conninfos: Vec<String>,
    transfer_cap: Option<usize>,
    refuse_connect: Option<String>,
    connect_bad: Option<String>,
    fail_creat: Option<String>,
    fail_read: Option<String>,
    reject_library: Option<String>,
    finished: usize,
}

impl ServerState {
    fn respond(&self, sql: &str) -> NativeResult {
        if let Some(result) = self.exact.get(sql) {
            return result.clone();
        }
        if let Some((_, result)) = self
            .prefixed
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            return result.clone();
        }

        let trimmed = sql.trim().trim_end_matches(';').trim();
        let Some(word) = trimmed.split_whitespace().next() else {
            return NativeResult::empty_query();
        };
        if COMMAND_KEYWORDS
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(word))
        {
            NativeResult::command_ok()
        } else {
            NativeResult::failed(format!("ERROR:  syntax error at or near \"{word}\""))
        }
    }
}

/// Shared server state. Clones refer to the same server.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    inner: Arc<Mutex<ServerState>>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServerState {
                next_oid: FIRST_OID,
                ..ServerState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            server: self.clone(),
        }
    }

    /// A ready connection that bypasses the backend's connect checks.
    #[must_use]
    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection::new(self.clone(), ConnStatus::Ok, String::new())
    }

    /// Answer `sql` (exact match) with `result`.
    pub fn script(&self, sql: impl Into<String>, result: NativeResult) {
        self.state().exact.insert(sql.into(), result);
    }

    /// Answer every statement starting with `prefix` with `result`.
    pub fn script_prefix(&self, prefix: impl Into<String>, result: NativeResult) {
        self.state().prefixed.push((prefix.into(), result));
    }

    /// Store an object directly, without recording any call.
    pub fn insert_object(&self, contents: Vec<u8>) -> Oid {
        let mut state = self.state();
        let object = state.next_oid;
        state.next_oid += 1;
        state.objects.insert(object, contents);
        object
    }

    #[must_use]
    pub fn object(&self, object: Oid) -> Option<Vec<u8>> {
        self.state().objects.get(&object).cloned()
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    #[must_use]
    pub fn lo_calls(&self) -> Vec<LoCall> {
        self.state().lo_calls.clone()
    }

    /// Largest single read or write transfer requested so far.
    #[must_use]
    pub fn max_transfer(&self) -> usize {
        self.state()
            .lo_calls
            .iter()
            .filter_map(|call| match call {
                LoCall::Read(n) | LoCall::Write(n) => Some(*n),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.state().executed.clone()
    }

    #[must_use]
    pub fn conninfos(&self) -> Vec<String> {
        self.state().conninfos.clone()
    }

    /// Number of connections released through `finish`.
    #[must_use]
    pub fn finished_connections(&self) -> usize {
        self.state().finished
    }

    /// Cap every read/write transfer at `cap` bytes (`Some(0)` makes transfers stall).
    pub fn set_transfer_cap(&self, cap: Option<usize>) {
        self.state().transfer_cap = cap;
    }

    pub fn refuse_connections(&self, message: impl Into<String>) {
        self.state().refuse_connect = Some(message.into());
    }

    /// Hand out connection handles that are not ready.
    pub fn connect_in_bad_state(&self, message: impl Into<String>) {
        self.state().connect_bad = Some(message.into());
    }

    pub fn fail_large_object_creation(&self, message: impl Into<String>) {
        self.state().fail_creat = Some(message.into());
    }

    pub fn fail_large_object_reads(&self, message: impl Into<String>) {
        self.state().fail_read = Some(message.into());
    }

    /// Make `initialize` fail for this client library.
    pub fn reject_library(&self, library: impl Into<String>) {
        self.state().reject_library = Some(library.into());
    }
}

/// [`Backend`] over a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    server: MemoryServer,
}

impl MemoryBackend {
    #[must_use]
    pub fn server(&self) -> &MemoryServer {
        &self.server
    }
}

impl Backend for MemoryBackend {
    type Connection = MemoryConnection;

    fn initialize(&mut self, library: &str) -> Result<(), NativeError> {
        match &self.server.state().reject_library {
            Some(rejected) if rejected == library => Err(NativeError::new(format!(
                "can not open the dynamic link module {library}"
            ))),
            _ => Ok(()),
        }
    }

    fn connect(&self, conninfo: &str) -> Result<MemoryConnection, NativeError> {
        let mut state = self.server.state();
        state.conninfos.push(conninfo.to_string());
        if let Some(message) = &state.refuse_connect {
            return Err(NativeError::new(message.clone()));
        }
        let (status, error) = match &state.connect_bad {
            Some(message) => (ConnStatus::Bad, message.clone()),
            None => (ConnStatus::Ok, String::new()),
        };
        drop(state);
        Ok(MemoryConnection::new(self.server.clone(), status, error))
    }
}

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    object: Oid,
    mode: LoMode,
    position: usize,
}

/// Connection to a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryConnection {
    server: MemoryServer,
    status: ConnStatus,
    last_error: String,
    descriptors: HashMap<LoFd, Descriptor>,
    next_fd: LoFd,
}

impl MemoryConnection {
    fn new(server: MemoryServer, status: ConnStatus, last_error: String) -> Self {
        Self {
            server,
            status,
            last_error,
            descriptors: HashMap::new(),
            next_fd: 0,
        }
    }

    /// Mark the connection as dropped by the server.
    pub fn break_connection(&mut self) {
        self.status = ConnStatus::Bad;
        self.last_error = "server closed the connection unexpectedly".to_string();
    }

    #[must_use]
    pub fn open_descriptors(&self) -> usize {
        self.descriptors.len()
    }

    fn fail<T>(&mut self, message: String) -> Result<T, NativeError> {
        self.last_error.clone_from(&message);
        Err(NativeError::new(message))
    }

    fn descriptor(&mut self, fd: LoFd) -> Result<Descriptor, NativeError> {
        match self.descriptors.get(&fd) {
            Some(descriptor) => Ok(*descriptor),
            None => self.fail(format!("ERROR:  invalid large-object descriptor: {fd}")),
        }
    }

    fn run(&mut self, sql: &str, params: Option<&[Option<&[u8]>]>) -> NativeResult {
        let mut state = self.server.state();
        state.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.map(|p| p.iter().map(|v| v.map(<[u8]>::to_vec)).collect()),
        });
        let result = state.respond(sql);
        drop(state);
        if let Some(message) = result.error_message() {
            self.last_error = message.to_string();
        }
        result
    }
}

impl NativeConnection for MemoryConnection {
    fn status(&self) -> ConnStatus {
        self.status
    }

    fn error_message(&self) -> String {
        self.last_error.clone()
    }

    fn exec(&mut self, sql: &str) -> Result<NativeResult, NativeError> {
        if self.status == ConnStatus::Bad {
            return self.fail("no connection to the server".to_string());
        }
        Ok(self.run(sql, None))
    }

    fn exec_params(
        &mut self,
        sql: &str,
        params: &[Option<&[u8]>],
    ) -> Result<NativeResult, NativeError> {
        if self.status == ConnStatus::Bad {
            return self.fail("no connection to the server".to_string());
        }
        Ok(self.run(sql, Some(params)))
    }

    fn lo_creat(&mut self, _mode: LoMode) -> Result<Oid, NativeError> {
        let mut state = self.server.state();
        state.lo_calls.push(LoCall::Create);
        if let Some(message) = state.fail_creat.clone() {
            drop(state);
            return self.fail(message);
        }
        let object = state.next_oid;
        state.next_oid += 1;
        state.objects.insert(object, Vec::new());
        Ok(object)
    }

    fn lo_open(&mut self, object: Oid, mode: LoMode) -> Result<LoFd, NativeError> {
        let mut state = self.server.state();
        state.lo_calls.push(LoCall::Open(object));
        let exists = state.objects.contains_key(&object);
        drop(state);
        if !exists {
            return self.fail(format!("ERROR:  large object {object} does not exist"));
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.descriptors.insert(
            fd,
            Descriptor {
                object,
                mode,
                position: 0,
            },
        );
        Ok(fd)
    }

    fn lo_read(&mut self, fd: LoFd, buf: &mut [u8]) -> Result<usize, NativeError> {
        let mut state = self.server.state();
        state.lo_calls.push(LoCall::Read(buf.len()));
        let fail_read = state.fail_read.clone();
        let cap = state.transfer_cap;
        drop(state);
        if let Some(message) = fail_read {
            return self.fail(message);
        }
        let descriptor = self.descriptor(fd)?;
        if !descriptor.mode.can_read() {
            return self.fail(format!(
                "ERROR:  large object descriptor {fd} was not opened for reading"
            ));
        }

        let state = self.server.state();
        let contents = state.objects.get(&descriptor.object).map_or(&[][..], Vec::as_slice);
        let start = descriptor.position.min(contents.len());
        let n = buf
            .len()
            .min(contents.len() - start)
            .min(cap.unwrap_or(usize::MAX));
        buf[..n].copy_from_slice(&contents[start..start + n]);
        drop(state);

        if let Some(open) = self.descriptors.get_mut(&fd) {
            open.position += n;
        }
        Ok(n)
    }

    fn lo_write(&mut self, fd: LoFd, buf: &[u8]) -> Result<usize, NativeError> {
        let mut state = self.server.state();
        state.lo_calls.push(LoCall::Write(buf.len()));
        let cap = state.transfer_cap;
        drop(state);
        let descriptor = self.descriptor(fd)?;
        if !descriptor.mode.can_write() {
            return self.fail(format!(
                "ERROR:  large object descriptor {fd} was not opened for writing"
            ));
        }

        let n = buf.len().min(cap.unwrap_or(usize::MAX));
        let mut state = self.server.state();
        let contents = state.objects.entry(descriptor.object).or_default();
        let end = descriptor.position + n;
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[descriptor.position..end].copy_from_slice(&buf[..n]);
        drop(state);

        if let Some(open) = self.descriptors.get_mut(&fd) {
            open.position = end;
        }
        Ok(n)
    }

    fn lo_lseek(&mut self, fd: LoFd, offset: i64, whence: Whence) -> Result<i64, NativeError> {
        self.server.state().lo_calls.push(LoCall::Seek(offset, whence));
        let descriptor = self.descriptor(fd)?;
        let len = self
            .server
            .state()
            .objects
            .get(&descriptor.object)
            .map_or(0, Vec::len);
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => descriptor.position,
            Whence::End => len,
        };
        let Some(position) = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .filter(|position| *position >= 0)
        else {
            return self.fail(format!("ERROR:  invalid seek offset: {offset}"));
        };
        if let Some(open) = self.descriptors.get_mut(&fd) {
            open.position = usize::try_from(position).unwrap_or(0);
        }
        Ok(position)
    }

    fn lo_tell(&mut self, fd: LoFd) -> Result<i64, NativeError> {
        self.server.state().lo_calls.push(LoCall::Tell);
        let descriptor = self.descriptor(fd)?;
        Ok(i64::try_from(descriptor.position).unwrap_or(i64::MAX))
    }

    fn lo_close(&mut self, fd: LoFd) -> Result<(), NativeError> {
        self.server.state().lo_calls.push(LoCall::Close);
        match self.descriptors.remove(&fd) {
            Some(_) => Ok(()),
            None => self.fail(format!("ERROR:  invalid large-object descriptor: {fd}")),
        }
    }

    fn lo_unlink(&mut self, object: Oid) -> Result<(), NativeError> {
        let mut state = self.server.state();
        state.lo_calls.push(LoCall::Unlink(object));
        let removed = state.objects.remove(&object).is_some();
        drop(state);
        if removed {
            Ok(())
        } else {
            self.fail(format!("ERROR:  large object {object} does not exist"))
        }
    }

    fn finish(self) {
        self.server.state().finished += 1;
    }
}
