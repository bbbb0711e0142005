//! Config model and persistence helpers.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

/// Environment variable that overrides `server.base_url`.
pub const BASE_URL_ENV: &str = "CODECAPTURE_BASE_URL";

/// Top-level configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Processing server connection.
    pub server: ServerCfg,
    /// Progress estimate shown while a job is pending.
    pub progress: ProgressCfg,
    /// Where downloaded results are written.
    pub download: DownloadCfg,
}

/// Processing server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCfg {
    /// Base URL every operation path is appended to.
    pub base_url: String,
    /// Multipart field name shared by all uploaded files.
    pub upload_field: String,
    /// Whole-request timeout in seconds; 0 disables it.
    pub request_timeout_secs: u64,
}

/// Progress heuristic settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressCfg {
    /// Interval between estimate bumps.
    pub tick_ms: u64,
    /// Highest estimate shown before the response arrives.
    pub ceiling: u8,
}

/// Download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadCfg {
    /// Directory results are saved into.
    pub output_dir: PathBuf,
}

impl ServerCfg {
    pub fn timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

impl ProgressCfg {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Ceiling clamped below 100 so the estimate never signals completion.
    pub fn ceiling(&self) -> u8 {
        self.ceiling.min(99)
    }
}

impl Config {
    /// Load from disk or create defaults when missing, then apply env overrides.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            toml::from_str(&s)?
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            cfg
        };
        cfg.apply_env(std::env::var(BASE_URL_ENV).ok());
        Ok(cfg)
    }

    /// Apply an override for the base URL, ignoring blank values.
    pub fn apply_env(&mut self, base_url: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            tracing::info!("base_url overridden by {}", BASE_URL_ENV);
            self.server.base_url = url.trim().to_string();
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }
}

impl Default for Config {
    /// Defaults match a processing server running locally.
    fn default() -> Self {
        Self {
            server: ServerCfg {
                base_url: "http://127.0.0.1:8000/api".into(),
                upload_field: "videos".into(),
                request_timeout_secs: 0,
            },
            progress: ProgressCfg {
                tick_ms: 1000,
                ceiling: 98,
            },
            download: DownloadCfg {
                output_dir: PathBuf::from("downloads"),
            },
        }
    }
}
