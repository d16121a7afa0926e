use std::sync::Arc;
use thiserror::Error;

/// Unified error type for formatter-cache-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Record resolution and access checks
/// - Rendering (formatter bundles, timeouts, public derivation)
/// - Upstream catalog requests
/// - Cache operations (initialization, reading, writing)
/// - Configuration operations (loading, validation)
///
/// It is `Clone` because a single failed render is delivered to every
/// request waiting on it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ==========================================================================
    // Request Errors
    // ==========================================================================
    /// The requested id or uuid does not resolve to a record
    #[error("there is no metadata {0}")]
    RecordNotFound(String),

    /// The caller may not perform the operation on the record
    #[error("operation not allowed on record {record_id}")]
    AccessDenied { record_id: u64 },

    /// Unknown output type in the request path
    #[error("unsupported format type: {0}")]
    UnsupportedFormatType(String),

    /// A required request parameter is absent
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    /// A request parameter could not be interpreted
    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    // ==========================================================================
    // Render Errors
    // ==========================================================================
    /// The formatter bundle does not support the record's schema
    #[error("formatter '{formatter}' cannot format this record: {reason}")]
    IncompatibleFormatter { formatter: String, reason: String },

    /// The formatting pipeline failed while producing output
    #[error("failed to render {key}: {reason}")]
    RenderFailure { key: String, reason: String },

    /// The formatting pipeline did not finish in time
    #[error("render of {key} timed out after {seconds}s")]
    RenderTimeout { key: String, seconds: u64 },

    /// Failure while producing the public variant of a record
    #[error("public variant derivation failed: {0}")]
    PublicDerivation(String),

    // ==========================================================================
    // Upstream Errors
    // ==========================================================================
    /// Catalog API request failed
    #[error("catalog request failed: {0}")]
    UpstreamRequest(String),

    /// Invalid response from the catalog API
    #[error("invalid catalog response: {0}")]
    UpstreamInvalidResponse(String),

    /// Rate limited by the catalog API
    #[error("catalog rate limited{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    UpstreamRateLimited { retry_after: Option<u64> },

    /// Catalog request timed out
    #[error("catalog request timed out")]
    UpstreamTimeout,

    // ==========================================================================
    // Cache Errors
    // ==========================================================================
    /// Failed to initialize the cache
    #[error("failed to initialize cache: {0}")]
    CacheInit(String),

    /// Failed to read from cache
    #[error("failed to read from cache: {0}")]
    CacheRead(String),

    /// Failed to write to cache
    #[error("failed to write to cache: {0}")]
    CacheWrite(String),

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl Error {
    /// Whether the error is caused by the request rather than the server.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::RecordNotFound(_)
                | Self::AccessDenied { .. }
                | Self::UnsupportedFormatType(_)
                | Self::MissingParameter(_)
                | Self::InvalidParameter { .. }
                | Self::IncompatibleFormatter { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
