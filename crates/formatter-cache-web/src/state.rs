use anyhow::{Context, Result};
use formatter_cache_core::{AppConfig, FormatService};

/// Global application state
pub struct AppState {
    pub service: FormatService,
}

impl AppState {
    /// Create the state from configuration (opens the disk tier, so it fails
    /// fast if another process holds the cache lock).
    pub fn new(config: &AppConfig) -> Result<Self> {
        let service = FormatService::new(config).context("Failed to create format service")?;
        Ok(Self { service })
    }

    #[cfg(test)]
    pub const fn with_service(service: FormatService) -> Self {
        Self { service }
    }
}
