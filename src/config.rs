use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Scheme prepended to every caller-supplied connection string.
pub const PG_CONNECT_STRING_PREFIX: &str = "postgresql://";

/// Transfer size for one large-object read or write call.
///
/// Larger per-call transfers have been seen to fail intermittently, so this stays at half of
/// the client library's own buffer size.
pub const LO_BUFSIZE: usize = 0x1000;

/// Upper bound on streamed result columns.
pub const MAX_COLS: usize = 500;

/// Driver-wide settings.
///
/// ```rust
/// use pgsql_lob_driver::DriverConfig;
///
/// let config = DriverConfig::from_json(r#"{ "lob_chunk_size": 1024 }"#).unwrap();
/// assert_eq!(config.lob_chunk_size, 1024);
/// assert_eq!(config.max_columns, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub url_prefix: String,
    pub lob_chunk_size: usize,
    pub max_columns: usize,
    /// Charset tag recorded on sessions that do not name one.
    pub charset: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            url_prefix: PG_CONNECT_STRING_PREFIX.to_string(),
            lob_chunk_size: LO_BUFSIZE,
            max_columns: MAX_COLS,
            charset: "UTF-8".to_string(),
        }
    }
}

impl DriverConfig {
    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `DriverError::ConfigError` for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DriverConfig = serde_json::from_str(json)
            .map_err(|e| DriverError::ConfigError(format!("invalid driver config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `DriverError::ConfigError` when a size limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.lob_chunk_size == 0 {
            return Err(DriverError::ConfigError(
                "lob_chunk_size must be positive".to_string(),
            ));
        }
        if self.max_columns == 0 {
            return Err(DriverError::ConfigError(
                "max_columns must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_lob_chunk_size(mut self, size: usize) -> Self {
        self.lob_chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns;
        self
    }

    #[must_use]
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }
}
