//! Metadata Formatter Cache Core Library
//!
//! This library caches the output of metadata formatters:
//! - Storage of rendered output keyed by record, language, format type,
//!   formatter and withheld-element visibility (memory and disk)
//! - Freshness validation against the record's change date
//! - At most one render per key at a time, shared by every waiting request
//! - Background derivation of public variants for anonymous readers
//! - A request layer handling access checks, conditional requests and
//!   popularity counting against the catalog API

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod format_type;
pub mod render;
pub mod service;
pub mod upstream;
pub mod util;

pub use cache::{CacheEntry, CacheStats, FormatterCache, Key, StoreStats, Validator};
pub use catalog::{Access, Caller, Catalog, ChangeSignal, HttpCatalog, Operation, create_catalog};
pub use config::{AppConfig, CacheConfig, CachePolicy, CatalogConfig, Lang, ServiceConfig};
pub use error::{Error, Result};
pub use format_type::FormatType;
pub use render::{FormatParams, HttpRenderer, Rendered, Renderer, RendererInfo, create_renderer};
pub use service::{FormatRequest, FormatResponse, FormatService, PublicRequest};
pub use util::clear_formatter_cache;
