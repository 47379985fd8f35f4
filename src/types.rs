/// Server type / object identifier.
pub type Oid = u32;

/// Descriptor of an open large object, scoped to one connection.
pub type LoFd = i32;

/// Sentinel for "no limit" in the positional `query` form.
pub const NO_LIMIT: u64 = u64::MAX;

/// Semantic kind of a result column, derived from its server type identifier.
///
/// ```rust
/// use pgsql_lob_driver::prelude::*;
///
/// let registry = TypeRegistry::default();
/// assert_eq!(registry.classify(oid::INT4), ColumnKind::Scalar);
/// assert_eq!(registry.classify(oid::OID), ColumnKind::LargeObject);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Delivered as the raw cell bytes.
    Scalar,
    /// Cell holds an object identifier; the object's contents are delivered instead.
    LargeObject,
}

/// Metadata for one streamed result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub ordinal: usize,
    pub type_oid: Oid,
    pub kind: ColumnKind,
}

/// Top-level classification of an executed statement, resolved before any row is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    /// The statement contained no query (e.g. empty text).
    NoData,
    /// A statement without a result set succeeded.
    CommandOk,
    /// Rows are available.
    RowsOk,
    /// Server-reported or protocol failure with the server's text.
    Failed(String),
}

/// A positional parameter value. `name` is the 1-based position encoded as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub value: Option<Vec<u8>>,
}

impl Placeholder {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Per-call window options appended to a statement as `limit`/`offset` clauses.
///
/// ```rust
/// use pgsql_lob_driver::prelude::*;
///
/// let options = QueryOptions::default().with_limit(10).with_offset(5);
/// assert_eq!(options.limit, Some(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// Rows to skip; zero means no `offset` clause.
    pub offset: u64,
    /// Maximum rows; `None` means no `limit` clause.
    pub limit: Option<u64>,
}

impl QueryOptions {
    /// Build options from the positional form where `NO_LIMIT` means unlimited.
    #[must_use]
    pub fn from_window(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: (limit != NO_LIMIT).then_some(limit),
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn is_windowed(&self) -> bool {
        self.offset != 0 || self.limit.is_some()
    }
}
