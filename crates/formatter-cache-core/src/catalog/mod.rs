mod http;

pub use http::HttpCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::CatalogConfig;
use crate::error::Result;

/// Freshness signal of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignal {
    Changed(DateTime<Utc>),
    /// The record exists but its change date could not be established
    Unknown,
}

impl ChangeSignal {
    pub const fn change_date(self) -> Option<DateTime<Utc>> {
        match self {
            Self::Changed(ts) => Some(ts),
            Self::Unknown => None,
        }
    }
}

/// Operations checked against a record's privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    View,
    Editing,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Editing => "editing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

impl Access {
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl From<bool> for Access {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allowed } else { Self::Denied }
    }
}

/// Credentials of the user behind a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Raw `Authorization` header value, forwarded to the catalog
    pub authorization: Option<String>,
}

impl Caller {
    pub const fn anonymous() -> Self {
        Self {
            authorization: None,
        }
    }

    pub fn with_authorization(authorization: impl Into<String>) -> Self {
        Self {
            authorization: Some(authorization.into()),
        }
    }
}

/// The record store the request layer consults around the cache.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a record uuid to its numeric id
    async fn resolve_uuid(&self, uuid: &str) -> Result<u64>;

    /// Change date of a record; `RecordNotFound` if it does not exist
    async fn change_signal(&self, record_id: u64) -> Result<ChangeSignal>;

    /// Whether `caller` may perform `operation` on the record
    async fn check_access(
        &self,
        record_id: u64,
        operation: Operation,
        caller: &Caller,
    ) -> Result<Access>;

    /// Count one view of the record
    async fn increase_popularity(&self, record_id: u64) -> Result<()>;
}

/// Create the HTTP catalog client from configuration
pub fn create_catalog(config: &CatalogConfig) -> Result<Arc<dyn Catalog>> {
    Ok(Arc::new(HttpCatalog::new(config)?))
}
