use std::collections::HashMap;
use std::sync::Arc;

use super::row::{Row, index_columns};
use crate::error::ConsumerError;
use crate::handlers::QueryEventHandlers;

/// A query result materialized through [`QueryEventHandlers`].
///
/// ```rust
/// use pgsql_lob_driver::prelude::*;
///
/// let mut results = ResultSet::default();
/// results.add_column("a").unwrap();
/// results.before_rows().unwrap();
/// results.add_row().unwrap();
/// results.add_row_cell(Some(&b"1"[..])).unwrap();
/// assert_eq!(results.rows[0].get("a"), Some(&b"1"[..]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Completed rows
    pub rows: Vec<Row>,
    columns: Vec<String>,
    shared: Option<(Arc<Vec<String>>, Arc<HashMap<String, usize>>)>,
    pending: Option<Vec<Option<Vec<u8>>>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            rows: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Column names in stream order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Number of completed rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn shared(&mut self) -> (Arc<Vec<String>>, Arc<HashMap<String, usize>>) {
        let columns = &self.columns;
        self.shared
            .get_or_insert_with(|| {
                (
                    Arc::new(columns.clone()),
                    Arc::new(index_columns(columns)),
                )
            })
            .clone()
    }

    fn complete_pending(&mut self) {
        if let Some(cells) = self.pending.take() {
            let (column_names, column_index) = self.shared();
            self.rows.push(Row {
                column_names,
                cells,
                column_index,
            });
        }
    }
}

impl QueryEventHandlers for ResultSet {
    fn add_column(&mut self, name: &str) -> Result<(), ConsumerError> {
        if self.shared.is_some() {
            return Err(ConsumerError::new("column added after rows started"));
        }
        self.columns.push(name.to_string());
        Ok(())
    }

    fn before_rows(&mut self) -> Result<(), ConsumerError> {
        self.shared();
        Ok(())
    }

    fn add_row(&mut self) -> Result<(), ConsumerError> {
        self.complete_pending();
        self.pending = Some(Vec::with_capacity(self.columns.len()));
        if self.columns.is_empty() {
            self.complete_pending();
        }
        Ok(())
    }

    fn add_row_cell(&mut self, value: Option<&[u8]>) -> Result<(), ConsumerError> {
        let columns = self.columns.len();
        let Some(cells) = self.pending.as_mut() else {
            return Err(ConsumerError::new("cell added before any row"));
        };
        if cells.len() == columns {
            return Err(ConsumerError::new(format!(
                "row already has {columns} cells"
            )));
        }
        cells.push(value.map(<[u8]>::to_vec));
        if cells.len() == columns {
            self.complete_pending();
        }
        Ok(())
    }
}
