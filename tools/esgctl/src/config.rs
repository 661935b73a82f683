//! esgctl configuration
//!
//! Layered loading, lowest to highest priority: built-in defaults,
//! config/esgctl.toml, config/esgctl.yaml, then ESG_-prefixed
//! environment variables.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EsgConfig {
    /// SQLite database URL
    pub database_url: String,
    /// Default tracing filter, overridable with RUST_LOG
    pub log_filter: String,
}

impl Default for EsgConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/esg.db".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

pub fn load_config() -> Result<EsgConfig> {
    Figment::from(Serialized::defaults(EsgConfig::default()))
        .merge(Toml::file("config/esgctl.toml"))
        .merge(Yaml::file("config/esgctl.yaml"))
        .merge(Env::prefixed("ESG_"))
        .extract()
        .context("Failed to load configuration")
}
