//! Helper types and traits for cleaner route handlers.
//!
//! Provides extension traits for converting `Option` and `Result` types
//! into HTTP-appropriate error responses, reducing boilerplate in routes.

use axum::http::StatusCode;
use formatter_cache_core::Error;

/// Standard result type for route handlers.
pub type RouteResult<T> = Result<T, (StatusCode, String)>;

/// Extension trait for converting `Option<T>` to `RouteResult<T>`.
pub trait OptionExt<T> {
    /// Returns the contained value or a 404 Not Found error.
    fn or_not_found(self, msg: &str) -> RouteResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> RouteResult<T> {
        self.ok_or_else(|| (StatusCode::NOT_FOUND, msg.to_string()))
    }
}

/// Extension trait for converting `Result<T, E>` to `RouteResult<T>`.
pub trait ResultExt<T, E: std::fmt::Display> {
    /// Converts the error to 500 Internal Server Error.
    fn or_internal_error(self) -> RouteResult<T>;

    /// Converts the error to 400 Bad Request.
    fn or_bad_request(self) -> RouteResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn or_internal_error(self) -> RouteResult<T> {
        self.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    }

    fn or_bad_request(self) -> RouteResult<T> {
        self.map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
    }
}

/// Extension trait mapping core errors onto their HTTP status.
pub trait ServiceResultExt<T> {
    fn or_error_status(self) -> RouteResult<T>;
}

impl<T> ServiceResultExt<T> for formatter_cache_core::Result<T> {
    fn or_error_status(self) -> RouteResult<T> {
        self.map_err(|e| (error_status(&e), e.to_string()))
    }
}

/// HTTP status for a core error.
pub const fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::RecordNotFound(_) => StatusCode::NOT_FOUND,
        Error::AccessDenied { .. } => StatusCode::FORBIDDEN,
        Error::UnsupportedFormatType(_)
        | Error::MissingParameter(_)
        | Error::InvalidParameter { .. }
        | Error::IncompatibleFormatter { .. } => StatusCode::BAD_REQUEST,
        Error::RenderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::UpstreamRequest(_)
        | Error::UpstreamInvalidResponse(_)
        | Error::UpstreamRateLimited { .. }
        | Error::UpstreamTimeout => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
