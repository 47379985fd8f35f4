//! Streams an executed statement's result to a host consumer.

use crate::backend::{NativeConnection, NativeResult};
use crate::error::{DriverError, Result};
use crate::handlers::QueryEventHandlers;
use crate::large_object::read_object;
use crate::status::{classify, gate};
use crate::type_map::TypeRegistry;
use crate::types::{ColumnDescriptor, ColumnKind, Oid};

/// Limits applied while decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_columns: usize,
    pub lob_chunk_size: usize,
}

/// Gate `result` on its outcome, then stream its columns and rows into `handlers`.
///
/// Large-object columns are resolved through `conn` one cell at a time. The result is
/// released before this returns, on success and on every failure.
///
/// # Errors
/// - `StatementError` for an empty query, a failed statement or a row result without columns.
/// - `LargeObjectError` if any large-object cell cannot be read.
/// - `ConsumerError` if a handler rejects a call.
pub fn decode<C, H>(
    conn: &mut C,
    result: NativeResult,
    registry: &TypeRegistry,
    limits: DecodeLimits,
    handlers: &mut H,
) -> Result<()>
where
    C: NativeConnection + ?Sized,
    H: QueryEventHandlers + ?Sized,
{
    let outcome = stream(conn, &result, registry, limits, handlers);
    drop(result);
    outcome
}

fn stream<C, H>(
    conn: &mut C,
    result: &NativeResult,
    registry: &TypeRegistry,
    limits: DecodeLimits,
    handlers: &mut H,
) -> Result<()>
where
    C: NativeConnection + ?Sized,
    H: QueryEventHandlers + ?Sized,
{
    if !gate(classify(result))? {
        return Ok(());
    }

    let columns = describe_columns(result, registry, limits.max_columns)?;
    for column in &columns {
        handlers.add_column(&column.name)?;
    }
    handlers.before_rows()?;

    for row in 0..result.ntuples() {
        handlers.add_row()?;
        for column in &columns {
            let raw = result.value(row, column.ordinal);
            match column.kind {
                ColumnKind::Scalar => {
                    handlers.add_row_cell(raw.filter(|bytes| !bytes.is_empty()))?;
                }
                ColumnKind::LargeObject => match parse_object_id(raw) {
                    Some(object) => {
                        let contents = read_object(conn, object, limits.lob_chunk_size)?;
                        handlers.add_row_cell(contents.as_deref())?;
                    }
                    None => handlers.add_row_cell(None)?,
                },
            }
        }
    }
    Ok(())
}

/// Classify the result's fields, keeping at most `max_columns`.
///
/// # Errors
/// Returns `DriverError::StatementError` when the result has no columns.
pub fn describe_columns(
    result: &NativeResult,
    registry: &TypeRegistry,
    max_columns: usize,
) -> Result<Vec<ColumnDescriptor>> {
    let fields = result.fields();
    if fields.is_empty() {
        return Err(DriverError::StatementError(
            "result contains no columns".to_string(),
        ));
    }
    if fields.len() > max_columns {
        tracing::warn!(
            columns = fields.len(),
            max_columns,
            "result has more columns than the driver streams; extra columns dropped"
        );
    }
    Ok(fields
        .iter()
        .take(max_columns)
        .enumerate()
        .map(|(ordinal, field)| ColumnDescriptor {
            name: field.name.clone(),
            ordinal,
            type_oid: field.type_oid,
            kind: registry.classify(field.type_oid),
        })
        .collect())
}

/// Object identifier in a large-object cell; zero, empty and unparsable cells are `None`.
fn parse_object_id(cell: Option<&[u8]>) -> Option<Oid> {
    let text = std::str::from_utf8(cell?).ok()?;
    text.trim().parse::<Oid>().ok().filter(|object| *object != 0)
}
