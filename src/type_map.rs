use std::collections::HashMap;

use crate::types::{ColumnKind, Oid};

/// Well-known PostgreSQL type identifiers (`catalog/pg_type.h`).
pub mod oid {
    use crate::types::Oid;

    pub const BOOL: Oid = 16;
    pub const BYTEA: Oid = 17;
    pub const CHAR: Oid = 18;
    pub const NAME: Oid = 19;
    pub const INT8: Oid = 20;
    pub const INT2: Oid = 21;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    pub const JSON: Oid = 114;
    pub const FLOAT4: Oid = 700;
    pub const FLOAT8: Oid = 701;
    pub const UNKNOWN: Oid = 705;
    pub const BPCHAR: Oid = 1042;
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    pub const TIME: Oid = 1083;
    pub const TIMESTAMP: Oid = 1114;
    pub const TIMESTAMPTZ: Oid = 1184;
    pub const TIMETZ: Oid = 1266;
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;
    pub const JSONB: Oid = 3802;
}

const DEFAULT_KINDS: &[(Oid, ColumnKind)] = &[
    (oid::BOOL, ColumnKind::Scalar),
    (oid::INT8, ColumnKind::Scalar),
    (oid::INT2, ColumnKind::Scalar),
    (oid::INT4, ColumnKind::Scalar),
    (oid::FLOAT4, ColumnKind::Scalar),
    (oid::FLOAT8, ColumnKind::Scalar),
    (oid::DATE, ColumnKind::Scalar),
    (oid::TIME, ColumnKind::Scalar),
    (oid::TIMESTAMP, ColumnKind::Scalar),
    (oid::TIMESTAMPTZ, ColumnKind::Scalar),
    (oid::TIMETZ, ColumnKind::Scalar),
    (oid::NUMERIC, ColumnKind::Scalar),
    (oid::OID, ColumnKind::LargeObject),
];

/// Maps server type identifiers to column kinds.
///
/// Identifiers without an entry classify as [`ColumnKind::Scalar`].
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    kinds: HashMap<Oid, ColumnKind>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            kinds: DEFAULT_KINDS.iter().copied().collect(),
        }
    }
}

impl TypeRegistry {
    /// Registry with no entries at all; everything is scalar.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Add or override the kind for a type identifier.
    pub fn register(&mut self, type_oid: Oid, kind: ColumnKind) -> &mut Self {
        self.kinds.insert(type_oid, kind);
        self
    }

    #[must_use]
    pub fn classify(&self, type_oid: Oid) -> ColumnKind {
        self.kinds
            .get(&type_oid)
            .copied()
            .unwrap_or(ColumnKind::Scalar)
    }

    #[must_use]
    pub fn is_registered(&self, type_oid: Oid) -> bool {
        self.kinds.contains_key(&type_oid)
    }
}
