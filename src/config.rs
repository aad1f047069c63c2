//! Application configuration types
//!
//! The library crates own their sections; this module aggregates them.

use podconsole_catalog::CatalogConfig;
use podconsole_terminal::{CliClient, ClusterEndpoint, TerminalConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Terminal settings with the cluster-wide CLI client applied
    pub fn terminal_config(&self) -> TerminalConfig {
        TerminalConfig {
            cli_client: self.cluster.cli_client,
            ..self.terminal.clone()
        }
    }
}

/// Console backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub cli_client: CliClient,
}

impl ClusterConfig {
    pub fn endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint {
            base_url: self.base_url.clone(),
            token: self.token.clone().filter(|t| !t.is_empty()),
        }
    }
}

/// Log file settings (used when the terminal owns stdout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("podconsole")
                .join("logs")
        })
    }
}
