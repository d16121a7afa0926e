//! HTTP route handlers for the formatter cache server.
//!
//! Every service lives under `/{lang}/{service}`; the service segment names
//! the operation and, for formatter output, the format type
//! (`md.format.html`, `md.format.public.xml`, `admin.format.clear`, ...).

mod admin;
mod format;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::Response,
    routing::get,
};
use formatter_cache_core::FormatType;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::helpers::{RouteResult, ServiceResultExt};
use crate::state::AppState;

const FORMAT_PREFIX: &str = "md.format.";
const PUBLIC_PREFIX: &str = "md.format.public.";

/// Operation addressed by the service path segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
    Format(FormatType),
    FormatPublic(FormatType),
    Clear,
    Stats,
}

impl ServiceName {
    /// Parse the service path segment. Unknown services are 404; a known
    /// service with an unsupported format type is 400.
    pub fn parse(segment: &str) -> RouteResult<Self> {
        match segment {
            "admin.format.clear" => Ok(Self::Clear),
            "admin.format.stats" => Ok(Self::Stats),
            _ => {
                if let Some(ty) = segment.strip_prefix(PUBLIC_PREFIX) {
                    ty.parse().map(Self::FormatPublic).or_error_status()
                } else if let Some(ty) = segment.strip_prefix(FORMAT_PREFIX) {
                    ty.parse().map(Self::Format).or_error_status()
                } else {
                    Err((StatusCode::NOT_FOUND, format!("Unknown service '{segment}'")))
                }
            }
        }
    }
}

/// Build the application router with its middleware stack.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{lang}/{service}", get(dispatch).post(dispatch))
        // Clients must revalidate; conditional requests are answered with 304
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path((lang, service)): Path<(String, String)>,
    method: Method,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> RouteResult<Response> {
    let service = ServiceName::parse(&service)?;

    match (service, method) {
        (ServiceName::Format(format_type), Method::GET) => {
            format::format(&state, lang, format_type, params, &headers).await
        }
        (ServiceName::FormatPublic(format_type), Method::GET) => {
            format::format_public(&state, lang, format_type, params).await
        }
        (ServiceName::Clear, Method::GET | Method::POST) => Ok(admin::clear(&state)),
        (ServiceName::Stats, Method::GET) => Ok(admin::stats(&state).await),
        (_, method) => Err((
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{method} not allowed on this service"),
        )),
    }
}
