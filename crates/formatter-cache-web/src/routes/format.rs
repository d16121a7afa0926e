//! Formatter routes - render-and-serve and the public fast read.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use formatter_cache_core::{
    Caller, FormatRequest, FormatResponse, FormatType, Lang, PublicRequest,
    util::{format_http_date, parse_http_date},
};

use crate::helpers::{OptionExt, ResultExt, RouteResult, ServiceResultExt};
use crate::state::AppState;

/// Render a record in the requested language and format type.
///
/// Honors `If-Modified-Since` and forwards the caller's `Authorization`
/// header to the catalog for privilege checks.
pub async fn format(
    state: &AppState,
    lang: String,
    format_type: FormatType,
    params: Vec<(String, String)>,
    headers: &HeaderMap,
) -> RouteResult<Response> {
    let caller = headers
        .get(header::AUTHORIZATION)
        .map(HeaderValue::to_str)
        .transpose()
        .or_bad_request()?
        .map_or_else(Caller::anonymous, Caller::with_authorization);

    // An unparseable date is ignored, as if the header were absent
    let if_modified_since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);

    let request = FormatRequest {
        language: Lang::new(lang),
        format_type,
        params,
        if_modified_since,
        caller,
    };

    match state.service.format(request).await.or_error_status()? {
        FormatResponse::NotModified { last_modified } => Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::LAST_MODIFIED, format_http_date(last_modified))
            .body(Body::empty())
            .or_internal_error(),
        FormatResponse::Rendered {
            bytes,
            format_type,
            last_modified,
        } => {
            let mut response = output_response(format_type);
            if let Some(last_modified) = last_modified {
                response = response.header(header::LAST_MODIFIED, format_http_date(last_modified));
            }
            response.body(Body::from(bytes)).or_internal_error()
        }
    }
}

fn output_response(format_type: FormatType) -> axum::http::response::Builder {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format_type.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", format_type.file_name()),
        )
}

/// Serve the stored public output of a record, or 404 if none is stored.
pub async fn format_public(
    state: &AppState,
    lang: String,
    format_type: FormatType,
    params: Vec<(String, String)>,
) -> RouteResult<Response> {
    let request = PublicRequest {
        language: Lang::new(lang),
        format_type,
        params,
    };

    let bytes = state
        .service
        .format_public(request)
        .await
        .or_error_status()?
        .or_not_found("No public output stored for this record")?;

    output_response(format_type)
        .body(Body::from(bytes))
        .or_internal_error()
}
