use thiserror::Error;

/// Errors surfaced by the driver to its host.
///
/// Every failing operation maps to exactly one variant; there is no partial success and no
/// retry inside the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Statement error: {0}")]
    StatementError(String),

    #[error("Binding error: {0}")]
    BindingError(String),

    #[error("Large object error: {0}")]
    LargeObjectError(String),

    #[error("Consumer error: {0}")]
    ConsumerError(#[from] ConsumerError),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DriverError {
    pub(crate) fn large_object(context: &str, err: &NativeError) -> Self {
        DriverError::LargeObjectError(format!("{context}: {err}"))
    }
}

/// Failure reported by the native protocol layer, carrying the server's error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure signalled by a host result consumer while rows are being streamed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConsumerError {
    pub message: String,
}

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
