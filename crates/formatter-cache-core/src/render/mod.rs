mod http;

pub use http::HttpRenderer;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::Key;
use crate::config::CatalogConfig;
use crate::error::Result;

/// Information about a renderer backend
#[derive(Debug, Clone)]
pub struct RendererInfo {
    /// Human-readable name
    pub name: &'static str,
    /// Whether rendering leaves the process
    pub remote: bool,
}

/// Output of one render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Bytes,
    /// Change date of the record state that was rendered
    pub change_date: DateTime<Utc>,
    /// Whether the record is viewable by anonymous users
    pub published: bool,
}

/// Request parameters outside the cacheable allow-list, forwarded to the
/// formatter as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatParams(Vec<(String, String)>);

impl FormatParams {
    pub fn new(params: Vec<(String, String)>) -> Self {
        Self(params)
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Trait for formatting pipelines (XSLT bundles, script templates, remote
/// catalogs). Implementations load the record, apply the formatter named by
/// the key and report the record's change date and publication state.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Get information about this renderer
    fn info(&self) -> RendererInfo;

    /// Get the renderer name (convenience method)
    fn name(&self) -> &'static str {
        self.info().name
    }

    /// Render the record identified by `key`
    async fn render(&self, key: &Key, params: &FormatParams) -> Result<Rendered>;
}

/// Create the catalog-backed renderer from configuration
pub fn create_renderer(config: &CatalogConfig) -> Result<Arc<dyn Renderer>> {
    Ok(Arc::new(HttpRenderer::new(config)?))
}
