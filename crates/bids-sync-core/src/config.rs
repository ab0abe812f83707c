use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::metadata::AssociationRule;
use crate::reconcile::ImportMode;

pub const DEFAULT_VALIDATOR_COMMAND: &str = "bids-validator";
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub mode: ImportMode,
    #[serde(default = "default_validator_command")]
    pub validator_command: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub upload_modified: bool,
    #[serde(default)]
    pub pair_sidecars: bool,
    #[serde(default)]
    pub association_rule: AssociationRule,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Everything needed to open an authenticated session against the remote store.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub api_url: String,
    pub api_key: String,
    pub verify_ssl: bool,
    pub ca_cert: Option<PathBuf>,
    pub chunk_size: usize,
}

fn default_validator_command() -> String {
    DEFAULT_VALIDATOR_COMMAND.to_string()
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            folder_id: None,
            mode: ImportMode::default(),
            validator_command: default_validator_command(),
            ignore_patterns: Vec::new(),
            upload_modified: true,
            pair_sidecars: false,
            association_rule: AssociationRule::default(),
            verify_ssl: true,
            ca_cert: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Layered load: optional `bids-sync.*` file, then `BIDS_SYNC_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("bids-sync").required(false))
        .add_source(
            Environment::with_prefix("BIDS_SYNC")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    pub fn connection(&self) -> Result<ConnectionSettings> {
        let api_url = self
            .api_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::MissingSetting("api_url"))?;
        let api_key = self
            .api_key
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::MissingSetting("api_key"))?;

        Ok(ConnectionSettings {
            api_url,
            api_key,
            verify_ssl: self.verify_ssl,
            ca_cert: self.ca_cert.clone(),
            chunk_size: self.chunk_size.max(1),
        })
    }

    pub fn folder_id(&self) -> Result<&str> {
        self.folder_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(Error::MissingSetting("folder_id"))
    }
}
