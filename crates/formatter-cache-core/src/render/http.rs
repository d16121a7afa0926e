use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tracing::debug;

use super::{FormatParams, Rendered, Renderer, RendererInfo};
use crate::cache::Key;
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::upstream::UpstreamClient;
use crate::util::parse_flag;

/// Response header carrying the rendered record's change date (RFC 3339)
pub const CHANGE_DATE_HEADER: &str = "x-change-date";
/// Response header telling whether the record is publicly viewable
pub const PUBLISHED_HEADER: &str = "x-published";

const DEFAULT_FORMATTER: &str = "default";

/// Renders records through the catalog's formatter endpoint
/// (`GET {api_base}/records/{id}/formatters/{formatter}`).
pub struct HttpRenderer {
    upstream: UpstreamClient,
}

impl HttpRenderer {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        Ok(Self {
            upstream: UpstreamClient::new(config)?,
        })
    }

    fn formatter_path(key: &Key) -> String {
        let formatter = key.formatter_id.as_deref().unwrap_or(DEFAULT_FORMATTER);
        format!(
            "records/{}/formatters/{}",
            key.record_id,
            urlencoding::encode(formatter)
        )
    }

    fn query(key: &Key, params: &FormatParams) -> Vec<(String, String)> {
        let mut query = vec![
            ("lang".to_string(), key.language.to_string()),
            ("type".to_string(), key.format_type.to_string()),
            ("hide_withheld".to_string(), key.hide_withheld.to_string()),
        ];
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        query
    }
}

/// Map a non-success formatter response onto a render error
fn status_error(key: &Key, status: StatusCode, body: String) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::RecordNotFound(format!("id = {}", key.record_id)),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Error::AccessDenied {
            record_id: key.record_id,
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::IncompatibleFormatter {
                formatter: key
                    .formatter_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FORMATTER.to_string()),
                reason: body,
            }
        }
        _ => Error::RenderFailure {
            key: key.to_string(),
            reason: format!("HTTP {status}: {body}"),
        },
    }
}

/// Read change date and publication state from the response headers
fn render_metadata(headers: &HeaderMap) -> Result<(DateTime<Utc>, bool)> {
    let raw = headers
        .get(CHANGE_DATE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            Error::UpstreamInvalidResponse(format!("missing {CHANGE_DATE_HEADER} header"))
        })?;

    let change_date = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| Error::UpstreamInvalidResponse(format!("bad change date '{raw}': {e}")))?
        .with_timezone(&Utc);

    let published = headers
        .get(PUBLISHED_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(parse_flag);

    Ok((change_date, published))
}

#[async_trait]
impl Renderer for HttpRenderer {
    fn info(&self) -> RendererInfo {
        RendererInfo {
            name: "catalog-http",
            remote: true,
        }
    }

    async fn render(&self, key: &Key, params: &FormatParams) -> Result<Rendered> {
        let url = self.upstream.url(&Self::formatter_path(key));
        let query = Self::query(key, params);
        debug!("Rendering {} via {}", key, url);

        let response = self
            .upstream
            .send(|client| client.get(&url).query(&query), None)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(key, status, body));
        }

        let (change_date, published) = render_metadata(response.headers())?;
        let bytes = response.bytes().await.map_err(|e| Error::RenderFailure {
            key: key.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;

        Ok(Rendered {
            bytes,
            change_date,
            published,
        })
    }
}
