//! CLI command implementations

pub mod convert;
pub mod export;
pub mod import;
pub mod tag;

use anyhow::{Context, Result};
use metabridge_core::{Config, ShopifyClient, StoreRole};
use std::path::Path;

/// Load the configuration file (defaults when absent) and apply the
/// command-line API version
pub fn load_config(path: &Path, api_version: Option<String>) -> Result<Config> {
    let mut config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(version) = api_version {
        config.api_version = version;
    }
    Ok(config)
}

/// Client for the store playing `role`
pub fn connect(config: &Config, role: StoreRole) -> Result<ShopifyClient> {
    let store = config.store(role)?;
    tracing::info!(
        "Using {} store {} (API {})",
        role,
        store.shop,
        config.api_version_for(store)
    );
    ShopifyClient::connect(config, store).context("Failed to create API client")
}
