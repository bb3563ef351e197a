use crate::core::gateway::DEFAULT_REGION;
use crate::utils::{default_state_path, get_data_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent tool configuration
///
/// Command-line flags take precedence over every field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Region used when neither `--region` nor the spec names one
    #[serde(default = "default_region")]
    pub default_region: String,
    /// Local group state document; `None` means `<data dir>/state.json`
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Append a JSON line to the audit log after every command
    #[serde(default = "default_true")]
    pub audit_log_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_region: default_region(),
            state_file: None,
            audit_log_enabled: true,
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Resolves the state document path, preferring an explicit override.
    pub fn state_path(&self, override_path: Option<&Path>) -> Option<PathBuf> {
        override_path
            .map(Path::to_path_buf)
            .or_else(|| self.state_file.clone())
            .or_else(default_state_path)
    }

    /// Picks the region for a command: flag, then spec, then config.
    pub fn resolve_region<'a>(&'a self, flag: Option<&'a str>, spec_region: &'a str) -> &'a str {
        flag.filter(|r| !r.is_empty())
            .or(Some(spec_region).filter(|r| !r.is_empty()))
            .unwrap_or(self.default_region.as_str())
    }
}

fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join("config.json"))
}

/// Saves the config to `<data dir>/config.json` using an atomic write.
///
/// The temporary file is created with mode 0o600 before any data is written,
/// then renamed over the target.
pub async fn save_config(config: &AppConfig) -> std::io::Result<()> {
    match config_path() {
        Some(path) => save_config_to(config, &path).await,
        None => Ok(()),
    }
}

pub async fn save_config_to(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;

    let mut temp_path = path.to_path_buf();
    temp_path.set_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Loads the config, or returns the default if it is missing or unreadable.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}

pub async fn load_config_from(path: &Path) -> AppConfig {
    if let Ok(json) = tokio::fs::read_to_string(path).await {
        match serde_json::from_str::<AppConfig>(&json) {
            Ok(config) => return config,
            Err(e) => tracing::warn!("Ignoring unreadable config {}: {e}", path.display()),
        }
    }
    AppConfig::default()
}
