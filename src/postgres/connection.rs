use std::collections::HashMap;

use tokio::runtime::Runtime;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Row, Statement};

use super::params::{WireValue, text_params};
use super::text::{self, TextCell};
use crate::backend::{
    ConnStatus, LoMode, NativeConnection, NativeField, NativeResult, Whence,
};
use crate::error::NativeError;
use crate::types::{LoFd, Oid};

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    object: Oid,
    mode: LoMode,
    position: i64,
}

/// Blocking session over a `tokio_postgres` client.
///
/// Every call drives the client on the session's own current-thread runtime. Large-object
/// descriptors are kept here; the server only ever sees whole-object function calls, so no
/// transaction has to stay open between calls.
pub struct PgConnection {
    runtime: Runtime,
    client: Client,
    descriptors: HashMap<LoFd, Descriptor>,
    next_fd: LoFd,
    last_error: String,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .field("descriptors", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}

/// libpq-style text for a client error: `SEVERITY:  message` for server errors.
pub(crate) fn error_text(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{}:  {}", db.severity(), db.message()),
        None => err.to_string(),
    }
}

impl PgConnection {
    pub(crate) fn new(runtime: Runtime, client: Client) -> Self {
        Self {
            runtime,
            client,
            descriptors: HashMap::new(),
            next_fd: 0,
            last_error: String::new(),
        }
    }

    fn record(&mut self, err: &tokio_postgres::Error) -> NativeError {
        self.last_error = error_text(err);
        NativeError::new(self.last_error.clone())
    }

    fn fail(&mut self, message: String) -> NativeError {
        self.last_error.clone_from(&message);
        NativeError::new(message)
    }

    fn descriptor(&mut self, fd: LoFd) -> Result<Descriptor, NativeError> {
        match self.descriptors.get(&fd) {
            Some(descriptor) => Ok(*descriptor),
            None => Err(self.fail(format!("ERROR:  invalid large-object descriptor: {fd}"))),
        }
    }

    fn run(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<NativeResult, NativeError> {
        if is_empty_statement(sql) {
            return Ok(NativeResult::empty_query());
        }
        let client = &self.client;
        let outcome = self.runtime.block_on(async {
            let statement = client.prepare(sql).await?;
            if statement.columns().is_empty() {
                client.execute(&statement, params).await?;
                Ok(NativeResult::command_ok())
            } else {
                let rows = client.query(&statement, params).await?;
                materialize(client, &statement, &rows).await
            }
        });
        match outcome {
            Ok(result) => Ok(result),
            Err(err) if err.as_db_error().is_some() => {
                let message = error_text(&err);
                self.last_error.clone_from(&message);
                Ok(NativeResult::failed(message))
            }
            Err(err) => Err(self.record(&err)),
        }
    }

    fn object_length(&mut self, object: Oid) -> Result<i64, NativeError> {
        let client = &self.client;
        let length = self.runtime.block_on(async {
            let row = client
                .query_one(
                    "SELECT coalesce(octet_length(lo_get($1::oid)), 0)::int8",
                    &[&object],
                )
                .await?;
            row.try_get::<_, i64>(0)
        });
        length.map_err(|e| self.record(&e))
    }
}

/// True when `sql` holds only whitespace, comments and semicolons, which the server
/// answers with an empty-query response.
fn is_empty_statement(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b if b.is_ascii_whitespace() || b == b';' => idx += 1,
            b'-' if bytes.get(idx + 1) == Some(&b'-') => {
                idx = bytes[idx..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |n| idx + n + 1);
            }
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                // block comments nest
                let mut depth = 1;
                idx += 2;
                while depth > 0 {
                    match bytes.get(idx..idx + 2) {
                        Some([b'*', b'/']) => {
                            depth -= 1;
                            idx += 2;
                        }
                        Some([b'/', b'*']) => {
                            depth += 1;
                            idx += 2;
                        }
                        Some(_) => idx += 1,
                        // unterminated; the server reports it
                        None => return false,
                    }
                }
            }
            _ => return false,
        }
    }
    true
}

/// Columns the client cannot render, with a statement that casts them to `text`.
struct TextCast {
    columns: Vec<usize>,
    statement: Statement,
}

async fn prepare_text_cast(
    client: &Client,
    statement: &Statement,
) -> Result<Option<TextCast>, tokio_postgres::Error> {
    let (columns, types): (Vec<usize>, Vec<Type>) = statement
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| !text::renders(column.type_()))
        .map(|(idx, column)| (idx, column.type_().clone()))
        .unzip();
    if columns.is_empty() {
        return Ok(None);
    }
    let list = (1..=columns.len())
        .map(|n| format!("${n}::text"))
        .collect::<Vec<_>>()
        .join(", ");
    let statement = client.prepare_typed(&format!("SELECT {list}"), &types).await?;
    Ok(Some(TextCast { columns, statement }))
}

async fn materialize(
    client: &Client,
    statement: &Statement,
    rows: &[Row],
) -> Result<NativeResult, tokio_postgres::Error> {
    let fields = statement
        .columns()
        .iter()
        .map(|column| NativeField::new(column.name(), column.type_().oid()))
        .collect();
    let cast = if rows.is_empty() {
        None
    } else {
        prepare_text_cast(client, statement).await?
    };
    let mut cells = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            if text::renders(column.type_()) {
                let cell: Option<TextCell> = row.try_get(idx)?;
                values.push(cell.map(TextCell::into_bytes));
            } else {
                values.push(None);
            }
        }
        if let Some(cast) = &cast {
            let wire = cast
                .columns
                .iter()
                .map(|&idx| row.try_get::<_, Option<WireValue<'_>>>(idx))
                .collect::<Result<Vec<_>, _>>()?;
            if wire.iter().any(Option::is_some) {
                let params: Vec<&(dyn ToSql + Sync)> =
                    wire.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
                let rendered = client.query_one(&cast.statement, &params).await?;
                for (pos, &idx) in cast.columns.iter().enumerate() {
                    let cell: Option<String> = rendered.try_get(pos)?;
                    values[idx] = cell.map(String::into_bytes);
                }
            }
        }
        cells.push(values);
    }
    Ok(NativeResult::tuples(fields, cells))
}

impl NativeConnection for PgConnection {
    fn status(&self) -> ConnStatus {
        if self.client.is_closed() {
            ConnStatus::Bad
        } else {
            ConnStatus::Ok
        }
    }

    fn error_message(&self) -> String {
        self.last_error.clone()
    }

    fn exec(&mut self, sql: &str) -> Result<NativeResult, NativeError> {
        self.run(sql, &[])
    }

    fn exec_params(
        &mut self,
        sql: &str,
        params: &[Option<&[u8]>],
    ) -> Result<NativeResult, NativeError> {
        let values = text_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        self.run(sql, &refs)
    }

    fn lo_creat(&mut self, _mode: LoMode) -> Result<Oid, NativeError> {
        let client = &self.client;
        let created = self.runtime.block_on(async {
            let row = client.query_one("SELECT lo_creat(-1)", &[]).await?;
            row.try_get::<_, Oid>(0)
        });
        created.map_err(|e| self.record(&e))
    }

    fn lo_open(&mut self, object: Oid, mode: LoMode) -> Result<LoFd, NativeError> {
        let client = &self.client;
        let found = self.runtime.block_on(async {
            client
                .query_opt(
                    "SELECT 1 FROM pg_catalog.pg_largeobject_metadata WHERE oid = $1::oid",
                    &[&object],
                )
                .await
        });
        match found {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(self.fail(format!("ERROR:  large object {object} does not exist")));
            }
            Err(err) => return Err(self.record(&err)),
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
        let descriptor = self.descriptor(fd)?;
        if !descriptor.mode.can_read() {
            return Err(self.fail(format!(
                "ERROR:  large object descriptor {fd} was not opened for reading"
            )));
        }
        let len = i32::try_from(buf.len())
            .map_err(|_| self.fail(format!("ERROR:  read of {} bytes is too large", buf.len())))?;
        let client = &self.client;
        let chunk = self.runtime.block_on(async {
            let row = client
                .query_one(
                    "SELECT lo_get($1::oid, $2::int8, $3::int4)",
                    &[&descriptor.object, &descriptor.position, &len],
                )
                .await?;
            row.try_get::<_, Vec<u8>>(0)
        });
        let chunk = chunk.map_err(|e| self.record(&e))?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if let Some(open) = self.descriptors.get_mut(&fd) {
            open.position += i64::try_from(n).unwrap_or(i64::MAX);
        }
        Ok(n)
    }

    fn lo_write(&mut self, fd: LoFd, buf: &[u8]) -> Result<usize, NativeError> {
        let descriptor = self.descriptor(fd)?;
        if !descriptor.mode.can_write() {
            return Err(self.fail(format!(
                "ERROR:  large object descriptor {fd} was not opened for writing"
            )));
        }
        let client = &self.client;
        let written = self.runtime.block_on(async {
            client
                .execute(
                    "SELECT lo_put($1::oid, $2::int8, $3::bytea)",
                    &[&descriptor.object, &descriptor.position, &buf],
                )
                .await
        });
        written.map_err(|e| self.record(&e))?;
        if let Some(open) = self.descriptors.get_mut(&fd) {
            open.position += i64::try_from(buf.len()).unwrap_or(i64::MAX);
        }
        Ok(buf.len())
    }

    fn lo_lseek(&mut self, fd: LoFd, offset: i64, whence: Whence) -> Result<i64, NativeError> {
        let descriptor = self.descriptor(fd)?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => descriptor.position,
            Whence::End => self.object_length(descriptor.object)?,
        };
        let Some(position) = base.checked_add(offset).filter(|p| *p >= 0) else {
            return Err(self.fail(format!("ERROR:  invalid seek offset: {offset}")));
        };
        if let Some(open) = self.descriptors.get_mut(&fd) {
            open.position = position;
        }
        Ok(position)
    }

    fn lo_tell(&mut self, fd: LoFd) -> Result<i64, NativeError> {
        Ok(self.descriptor(fd)?.position)
    }

    fn lo_close(&mut self, fd: LoFd) -> Result<(), NativeError> {
        match self.descriptors.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(self.fail(format!("ERROR:  invalid large-object descriptor: {fd}"))),
        }
    }

    fn lo_unlink(&mut self, object: Oid) -> Result<(), NativeError> {
        let client = &self.client;
        let unlinked = self.runtime.block_on(async {
            client
                .execute("SELECT lo_unlink($1::oid)", &[&object])
                .await
        });
        unlinked.map(|_| ()).map_err(|e| self.record(&e))
    }

    fn finish(self) {
        drop(self.client);
        self.runtime.shutdown_background();
    }
}
