use crate::error::ConsumerError;

/// Host-side consumer of a streamed result.
///
/// Calls arrive in a fixed order: every `add_column` first, then one `before_rows`, then for
/// each row one `add_row` followed by one `add_row_cell` per column. Returning an error from
/// any method aborts the query.
pub trait QueryEventHandlers {
    /// # Errors
    /// Any error aborts the query.
    fn add_column(&mut self, name: &str) -> Result<(), ConsumerError>;

    /// # Errors
    /// Any error aborts the query.
    fn before_rows(&mut self) -> Result<(), ConsumerError>;

    /// # Errors
    /// Any error aborts the query.
    fn add_row(&mut self) -> Result<(), ConsumerError>;

    /// `None` is an absent cell (SQL NULL, empty scalar or empty large object).
    ///
    /// # Errors
    /// Any error aborts the query.
    fn add_row_cell(&mut self, value: Option<&[u8]>) -> Result<(), ConsumerError>;
}

impl<H: QueryEventHandlers + ?Sized> QueryEventHandlers for &mut H {
    fn add_column(&mut self, name: &str) -> Result<(), ConsumerError> {
        (**self).add_column(name)
    }

    fn before_rows(&mut self) -> Result<(), ConsumerError> {
        (**self).before_rows()
    }

    fn add_row(&mut self) -> Result<(), ConsumerError> {
        (**self).add_row()
    }

    fn add_row_cell(&mut self, value: Option<&[u8]>) -> Result<(), ConsumerError> {
        (**self).add_row_cell(value)
    }
}
