//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var("PODCONSOLE_ENV").unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false))
        // 3. Environment variables (highest priority), e.g. PODCONSOLE_CLUSTER__TOKEN
        .add_source(
            Environment::with_prefix("PODCONSOLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use podconsole_terminal::CliClient;

    fn embedded() -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_embedded_defaults_deserialize() {
        let config = embedded();
        assert_eq!(config.cluster.cli_client, CliClient::Kubectl);
        assert_eq!(config.terminal.max_tabs, 8);
        assert_eq!(config.catalog.debounce_secs, 5);
        assert!(config.cluster.token.is_none());
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_overrides_layer_on_top() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(
                "[cluster]\ncli_client = \"oc\"\ntoken = \"sha256~abc\"\n[catalog]\nbatch_size = 50\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.terminal_config().cli_client, CliClient::Oc);
        assert_eq!(
            config.cluster.endpoint().token.as_deref(),
            Some("sha256~abc")
        );
        assert_eq!(config.catalog.batch_size, 50);
        assert_eq!(config.catalog.max_concurrent_sources, 4);
    }
}
