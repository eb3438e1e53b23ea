use thiserror::Error;

/// Main application error type that encompasses all run-level failure modes
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Invalid URL: {url} - {details}")]
    InvalidUrl { url: String, details: String },

    #[error("Malformed response envelope: {url} - {details}")]
    Envelope { url: String, details: String },

    #[error("Document conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Invalid record: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },

    #[error("Queue closed: {queue}")]
    QueueClosed { queue: String },
}

/// Errors raised while turning a raw document into a canonical record
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid timestamp for {field}: {value}")]
    InvalidTimestamp { field: String, value: String },

    #[error("Invalid record content: {0}")]
    Model(#[from] ModelError),
}

/// Violations of the canonical record invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Relationship {field} must not be empty")]
    EmptyRelationshipField { field: &'static str },

    #[error("Accession must not be empty")]
    EmptyAccession,
}

impl MigrationError {
    /// Whether this error came from reaching a remote system, as opposed to its content
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            MigrationError::Http(_)
                | MigrationError::HttpStatus { .. }
                | MigrationError::Timeout { .. }
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Conversion result type alias
pub type ConversionResult<T> = std::result::Result<T, ConversionError>;
