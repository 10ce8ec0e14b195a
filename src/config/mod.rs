pub mod session_config;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::session_config::SessionConfig;
use crate::utils::ensure_directory_exists;

const CONFIG_FILE_NAME: &str = "smart_hole_config.json";
const CONFIG_DIR_NAME: &str = "smart-hole-link";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    /// `env_logger` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            session: SessionConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Default location of the config file in the user's config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("No config directory on this platform"))?;
        Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the config from a configuration file.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!(
                "Config file not found at {:?}, using default.",
                file_path_str
            );
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Config saved to {:?}.", file_path_str);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::session_config::CelebrationStyle;

    fn temp_config_path(test_name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("smart-hole-link-{}-{}", test_name, std::process::id()))
            .join(CONFIG_FILE_NAME)
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let path = temp_config_path("missing");
        let config = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let path = temp_config_path("save");
        let config = AppConfig {
            session: SessionConfig {
                celebration: CelebrationStyle::Firmware,
                celebrate_on_shot: true,
                name_markers: vec!["HOLE".into()],
                ..SessionConfig::default()
            },
            log_filter: "debug".into(),
        };

        config.save_config(&path).await.unwrap();
        let loaded = AppConfig::load_config(&path).await.unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let path = temp_config_path("invalid");
        ensure_directory_exists(path.parent().unwrap()).await.unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(AppConfig::load_config(&path).await.is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
