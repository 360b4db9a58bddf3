//! Configuration parsing and validation
//!
//! Connection parameters for every store role, plus client tuning, are
//! read from an optional `metabridge.yaml` and then overridden by values the
//! CLI collected from flags and the environment.
//!
//! ```yaml
//! api_version: "2024-10"
//! page_size: 50
//! retry:
//!   max_attempts: 5
//! stores:
//!   source:
//!     shop: source-store.myshopify.com
//!     token: shpat_xxx
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default Admin API version
pub const DEFAULT_API_VERSION: &str = "2024-10";

/// Role a store plays in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    /// Store metafields are exported from
    Source,
    /// Store metafields are imported into
    Target,
    /// Store the color tagger runs against
    SecondarySource,
}

impl StoreRole {
    /// Environment variables conventionally holding this role's shop and token
    pub fn env_vars(self) -> (&'static str, &'static str) {
        match self {
            StoreRole::Source => ("SOURCE_SHOP", "SOURCE_TOKEN"),
            StoreRole::Target => ("TARGET_SHOP", "TARGET_TOKEN"),
            StoreRole::SecondarySource => ("SOURCE2_SHOP", "SOURCE2_TOKEN"),
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreRole::Source => "source",
            StoreRole::Target => "target",
            StoreRole::SecondarySource => "secondary_source",
        })
    }
}

/// Connection parameters for one store
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Shop domain, e.g. `my-shop.myshopify.com`
    pub shop: String,

    /// Admin API access token
    pub token: String,

    /// API version override for this store
    #[serde(default)]
    pub api_version: Option<String>,
}

impl StoreConfig {
    /// Create connection parameters for a shop
    pub fn new(shop: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            shop: shop.into(),
            token: token.into(),
            api_version: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("shop", &self.shop)
            .field("token", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Retry settings for transient API failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry when the API gives no hint
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Main configuration container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Admin API version used when a store does not override it
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Entities requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Connection parameters per store role
    #[serde(default)]
    pub stores: HashMap<StoreRole, StoreConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
            stores: HashMap::new(),
        }
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./metabridge.yaml")?;
    /// println!("API version: {}", config.api_version);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration if the file exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load(path.as_ref()) {
            Err(Error::ConfigNotFound { path }) => {
                tracing::debug!("No configuration file at {}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 250 {
            return Err(Error::ConfigInvalid {
                message: format!("page_size must be within 1..=250, got {}", self.page_size),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::ConfigInvalid {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        for (role, store) in &self.stores {
            if store.shop.trim().is_empty() || store.token.trim().is_empty() {
                return Err(Error::ConfigInvalid {
                    message: format!("stores.{} needs both shop and token", role),
                });
            }
        }
        Ok(())
    }

    /// Override (or add) the connection parameters of a role
    pub fn set_store(&mut self, role: StoreRole, store: StoreConfig) {
        self.stores.insert(role, store);
    }

    /// Merge partially supplied credentials over whatever the file provided.
    ///
    /// Either value may be absent; a role ends up configured only when both a
    /// shop and a token are known.
    pub fn merge_store(&mut self, role: StoreRole, shop: Option<String>, token: Option<String>) {
        let existing = self.stores.remove(&role);
        let api_version = existing.as_ref().and_then(|s| s.api_version.clone());
        let shop = shop.or_else(|| existing.as_ref().map(|s| s.shop.clone()));
        let token = token.or_else(|| existing.as_ref().map(|s| s.token.clone()));

        if let (Some(shop), Some(token)) = (shop, token) {
            self.stores.insert(
                role,
                StoreConfig {
                    shop,
                    token,
                    api_version,
                },
            );
        }
    }

    /// Connection parameters for a role
    pub fn store(&self, role: StoreRole) -> Result<&StoreConfig> {
        self.stores.get(&role).ok_or_else(|| {
            let (shop_var, token_var) = role.env_vars();
            Error::ConfigInvalid {
                message: format!(
                    "no credentials for the {} store; set {} and {} or add stores.{} to the configuration file",
                    role, shop_var, token_var, role
                ),
            }
        })
    }

    /// API version to use for a store
    pub fn api_version_for<'a>(&'a self, store: &'a StoreConfig) -> &'a str {
        store.api_version.as_deref().unwrap_or(&self.api_version)
    }

    /// HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_version, "2024-10");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.stores.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
api_version: "2025-01"
page_size: 100
retry:
  max_attempts: 3
  base_delay_ms: 250
stores:
  source:
    shop: source.myshopify.com
    token: shpat_source
  secondary_source:
    shop: other.myshopify.com
    token: shpat_other
    api_version: "2024-07"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.max_delay_ms, 30_000);

        let source = config.store(StoreRole::Source).unwrap();
        assert_eq!(source.shop, "source.myshopify.com");
        assert_eq!(config.api_version_for(source), "2025-01");

        let other = config.store(StoreRole::SecondarySource).unwrap();
        assert_eq!(config.api_version_for(other), "2024-07");
    }

    #[test]
    fn test_missing_role_names_env_vars() {
        let config = Config::default();
        let err = config.store(StoreRole::Target).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("TARGET_SHOP"));
        assert!(text.contains("TARGET_TOKEN"));
    }

    #[test]
    fn test_invalid_page_size_rejected() {
        let config: Config = serde_yaml::from_str("page_size: 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_merge_store_overrides_file_values() {
        let mut config = Config::default();
        config.set_store(
            StoreRole::Source,
            StoreConfig {
                shop: "file.myshopify.com".into(),
                token: "file-token".into(),
                api_version: Some("2024-07".into()),
            },
        );

        config.merge_store(StoreRole::Source, None, Some("env-token".into()));
        let source = config.store(StoreRole::Source).unwrap();
        assert_eq!(source.shop, "file.myshopify.com");
        assert_eq!(source.token, "env-token");
        assert_eq!(source.api_version.as_deref(), Some("2024-07"));

        config.merge_store(StoreRole::Target, Some("t.myshopify.com".into()), None);
        assert!(config.store(StoreRole::Target).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let store = StoreConfig::new("a.myshopify.com", "shpat_secret");
        let debug = format!("{:?}", store);
        assert!(debug.contains("a.myshopify.com"));
        assert!(!debug.contains("shpat_secret"));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("metabridge.yaml")).unwrap();
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_load_rejects_store_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metabridge.yaml");
        std::fs::write(
            &path,
            "stores:\n  target:\n    shop: t.myshopify.com\n    token: \"\"\n",
        )
        .unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(Error::ConfigInvalid { .. })
        ));
    }
}
