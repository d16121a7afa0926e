//! Request layer in front of the cache: record resolution, privilege checks,
//! conditional requests and popularity counting.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheStats, FormatterCache, Key, Validator};
use crate::catalog::{Caller, Catalog, Operation, create_catalog};
use crate::config::{AppConfig, Lang, ServiceConfig};
use crate::error::{Error, Result};
use crate::format_type::FormatType;
use crate::render::{FormatParams, Renderer, RendererInfo, create_renderer};
use crate::util::{parse_flag, truncate_to_seconds};

const PARAM_ID: &str = "id";
const PARAM_UUID: &str = "uuid";
const PARAM_XSL: &str = "xsl";
const PARAM_SKIP_POPULARITY: &str = "skipPopularity";
const PARAM_HIDE_WITHHELD: &str = "hide_withheld";

/// A render-and-serve request
#[derive(Debug, Clone)]
pub struct FormatRequest {
    pub language: Lang,
    pub format_type: FormatType,
    /// Raw query parameters in request order
    pub params: Vec<(String, String)>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub caller: Caller,
}

impl FormatRequest {
    pub fn new(language: impl Into<Lang>, format_type: FormatType) -> Self {
        Self {
            language: language.into(),
            format_type,
            params: Vec::new(),
            if_modified_since: None,
            caller: Caller::anonymous(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn if_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(since);
        self
    }

    #[must_use]
    pub fn caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }
}

/// A public fast-read request
#[derive(Debug, Clone)]
pub struct PublicRequest {
    pub language: Lang,
    pub format_type: FormatType,
    pub params: Vec<(String, String)>,
}

impl PublicRequest {
    pub fn new(language: impl Into<Lang>, format_type: FormatType) -> Self {
        Self {
            language: language.into(),
            format_type,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatResponse {
    /// The client's copy is current
    NotModified { last_modified: DateTime<Utc> },
    Rendered {
        bytes: Bytes,
        format_type: FormatType,
        /// Record change date in whole seconds, when known
        last_modified: Option<DateTime<Utc>>,
    },
}

/// First non-empty value of a parameter, matching the name case-insensitively
fn lookup<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, v)| k.eq_ignore_ascii_case(name) && !v.trim().is_empty())
        .map(|(_, v)| v.trim())
}

/// Combines cache, renderer and catalog into the formatter endpoint logic
pub struct FormatService {
    cache: FormatterCache,
    renderer: Arc<dyn Renderer>,
    catalog: Arc<dyn Catalog>,
    allowed_parameters: Vec<String>,
}

impl FormatService {
    /// Create a service backed by the catalog API
    pub fn new(config: &AppConfig) -> Result<Self> {
        let renderer = create_renderer(&config.catalog)?;
        let catalog = create_catalog(&config.catalog)?;
        let cache = FormatterCache::new(&config.cache)?;

        Ok(Self::with_parts(cache, renderer, catalog, &config.service))
    }

    /// Create with custom collaborators
    pub fn with_parts(
        cache: FormatterCache,
        renderer: Arc<dyn Renderer>,
        catalog: Arc<dyn Catalog>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            cache,
            renderer,
            catalog,
            allowed_parameters: config.allowed_parameters.clone(),
        }
    }

    pub const fn cache(&self) -> &FormatterCache {
        &self.cache
    }

    pub fn renderer_info(&self) -> RendererInfo {
        self.renderer.info()
    }

    /// Render a record, serving from cache when possible
    pub async fn format(&self, request: FormatRequest) -> Result<FormatResponse> {
        let record_id = self.resolve_record(&request.params).await?;

        if !self
            .catalog
            .check_access(record_id, Operation::View, &request.caller)
            .await?
            .is_allowed()
        {
            return Err(Error::AccessDenied { record_id });
        }

        let hide_withheld = self.hide_withheld(record_id, &request).await?;
        let key = Key::new(
            record_id,
            request.language.clone(),
            request.format_type,
            lookup(&request.params, PARAM_XSL).map(String::from),
            hide_withheld,
        );

        let change_date = self.change_date(record_id).await?;
        let last_modified = change_date.map(truncate_to_seconds);
        let extra = self.extra_params(&request.params);
        let skip_popularity = lookup(&request.params, PARAM_SKIP_POPULARITY).is_some_and(parse_flag);

        if let Some(modified) = last_modified
            && let Some(since) = request.if_modified_since
            && extra.is_empty()
            && self.cache.allows_caching(&key)
            && since >= modified
        {
            debug!("{} not modified since {}", key, since);
            self.count_popularity(record_id, skip_popularity).await;
            return Ok(FormatResponse::NotModified {
                last_modified: modified,
            });
        }

        let bytes = if extra.is_empty() {
            self.cache
                .get(
                    key,
                    Validator::from_change_date(change_date),
                    Arc::clone(&self.renderer),
                )
                .await?
        } else {
            self.cache
                .render_direct(&key, self.renderer.as_ref(), &extra)
                .await?
        };

        self.count_popularity(record_id, skip_popularity).await;

        Ok(FormatResponse::Rendered {
            bytes,
            format_type: request.format_type,
            last_modified,
        })
    }

    /// Stored public output of a record, without access checks or rendering
    pub async fn format_public(&self, request: PublicRequest) -> Result<Option<Bytes>> {
        let record_id = self.resolve_record(&request.params).await?;
        let key = Key::new(
            record_id,
            request.language,
            request.format_type,
            lookup(&request.params, PARAM_XSL).map(String::from),
            true,
        );

        Ok(self.cache.get_published(&key).await)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    async fn resolve_record(&self, params: &[(String, String)]) -> Result<u64> {
        if let Some(id) = lookup(params, PARAM_ID) {
            return id.parse().map_err(|_| Error::InvalidParameter {
                name: PARAM_ID.to_string(),
                reason: format!("'{id}' is not a record id"),
            });
        }

        match lookup(params, PARAM_UUID) {
            Some(uuid) => self.catalog.resolve_uuid(uuid).await,
            None => Err(Error::MissingParameter(format!(
                "either '{PARAM_ID}' or '{PARAM_UUID}'"
            ))),
        }
    }

    /// Withheld elements are hidden on request, or when the caller may not
    /// edit the record.
    async fn hide_withheld(&self, record_id: u64, request: &FormatRequest) -> Result<bool> {
        if lookup(&request.params, PARAM_HIDE_WITHHELD).is_some_and(parse_flag) {
            return Ok(true);
        }

        let editing = self
            .catalog
            .check_access(record_id, Operation::Editing, &request.caller)
            .await?;
        Ok(!editing.is_allowed())
    }

    /// Change date of the record; `None` disables caching for this request
    async fn change_date(&self, record_id: u64) -> Result<Option<DateTime<Utc>>> {
        match self.catalog.change_signal(record_id).await {
            Ok(signal) => Ok(signal.change_date()),
            Err(e @ Error::RecordNotFound(_)) => Err(e),
            Err(e) => {
                warn!("Change date of record {} unavailable, not caching: {}", record_id, e);
                Ok(None)
            }
        }
    }

    /// Parameters outside the allow-list
    fn extra_params(&self, params: &[(String, String)]) -> FormatParams {
        FormatParams::new(
            params
                .iter()
                .filter(|(name, _)| {
                    !self
                        .allowed_parameters
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(name))
                })
                .cloned()
                .collect(),
        )
    }

    async fn count_popularity(&self, record_id: u64, skip: bool) {
        if skip {
            return;
        }
        if let Err(e) = self.catalog.increase_popularity(record_id).await {
            warn!("Failed to count view of record {}: {}", record_id, e);
        }
    }
}
