use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// A row collected from a streamed query result.
///
/// Column names and the name index are shared by every row of a [`super::ResultSet`].
#[derive(Debug, Clone)]
pub struct Row {
    /// The column names for this row
    pub column_names: Arc<Vec<String>>,
    /// Cell values; `None` for absent cells
    pub cells: Vec<Option<Vec<u8>>>,
    pub(crate) column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a row, building its own column index.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, cells: Vec<Option<Vec<u8>>>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            cells,
            column_index,
        }
    }

    /// Index of the first column called `column_name`.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_index.get(column_name).copied()
    }

    /// Cell bytes by column name; `None` if the column is unknown or the cell is absent.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&[u8]> {
        self.get_by_index(self.get_column_index(column_name)?)
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&[u8]> {
        self.cells.get(index)?.as_deref()
    }

    /// Cell as text, replacing invalid UTF-8.
    #[must_use]
    pub fn get_text(&self, column_name: &str) -> Option<Cow<'_, str>> {
        self.get(column_name).map(String::from_utf8_lossy)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        // duplicate names resolve to the first column
        index.entry(name.clone()).or_insert(i);
    }
    index
}
