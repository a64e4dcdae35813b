use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per download (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.25,
            max_delay_secs: 10,
        }
    }
}

/// Files at or below this size are downloaded before the resolution returns.
pub const DEFAULT_DOWNLOAD_THRESHOLD: u64 = 2 * 1024 * 1024;

/// Fragment appended to remote URLs used inline so they never share a
/// platform cache slot with the background download of the same file.
pub const DEFAULT_EMBEDDED_FRAGMENT: &str = "assetpool-embedded";

/// Global configuration loaded from `~/.config/assetpool/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPoolConfig {
    /// Known-size assets up to this many bytes are fetched eagerly.
    pub download_threshold_bytes: u64,
    /// Cached copies older than this are refreshed (None = never expire).
    #[serde(default)]
    pub max_age_secs: Option<u64>,
    /// Fragment added to remote URLs handed to inline elements.
    #[serde(default = "default_embedded_fragment")]
    pub embedded_fragment: String,
    /// Override for the local cache root (default: XDG cache dir).
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Curl connect timeout for probes and downloads.
    pub connect_timeout_secs: u64,
    /// Curl total transfer timeout for downloads.
    pub transfer_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_embedded_fragment() -> String {
    DEFAULT_EMBEDDED_FRAGMENT.to_string()
}

impl Default for AssetPoolConfig {
    fn default() -> Self {
        Self {
            download_threshold_bytes: DEFAULT_DOWNLOAD_THRESHOLD,
            max_age_secs: None,
            embedded_fragment: default_embedded_fragment(),
            cache_dir: None,
            connect_timeout_secs: 15,
            transfer_timeout_secs: 120,
            retry: None,
        }
    }
}

impl AssetPoolConfig {
    /// Cache root: the configured override or `~/.cache/assetpool`.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("assetpool")?;
        Ok(xdg_dirs.get_cache_home())
    }

    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("assetpool")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<AssetPoolConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = AssetPoolConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: AssetPoolConfig = toml::from_str(&data)?;
    Ok(cfg)
}
