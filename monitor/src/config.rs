//! Dashboard configuration: JSON file plus command-line overrides.
//!
//! Values are resolved in order: built-in defaults, then the config file
//! (an explicit `--config` path, or `~/.traffic_monitor/config.json` when it
//! exists), then any flag given on the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use monitor_shared::parse_date_param;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::poller::SamplingInterval;

/// Backend used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub base_url: String,
    /// Camera to show first; otherwise the first camera the registry lists.
    pub camera: Option<String>,
    pub interval_minutes: SamplingInterval,
    pub auto_follow: bool,
    pub camera_refresh_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            camera: None,
            interval_minutes: SamplingInterval::default(),
            auto_follow: true,
            camera_refresh_secs: 300,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn camera_refresh(&self) -> Duration {
        Duration::from_secs(self.camera_refresh_secs.max(1))
    }
}

/// `~/.traffic_monitor/config.json`, or `None` when HOME is unset.
pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".traffic_monitor").join("config.json"))
}

fn parse_interval(s: &str) -> Result<SamplingInterval, String> {
    let minutes: u16 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid interval: {s}"))?;
    SamplingInterval::new(minutes).map_err(|e| e.to_string())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_date_param(s.trim()).map_err(|_| ConfigError::InvalidDate(s.to_string()).to_string())
}

/// Command-line options shared by dashboard binaries
#[derive(Parser, Debug, Clone, Default)]
pub struct MonitorArgs {
    /// Backend base URL (e.g. "http://localhost:8000")
    #[arg(long)]
    pub base_url: Option<String>,

    /// Camera to show first
    #[arg(long)]
    pub camera: Option<String>,

    /// Sampling interval in minutes; must divide 60 (5, 10, 20, 30)
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<SamplingInterval>,

    /// Keep the selected minute when new samples arrive
    #[arg(long, default_value_t = false)]
    pub no_auto_follow: bool,

    /// Seconds between camera list refreshes
    #[arg(long)]
    pub camera_refresh_secs: Option<u64>,

    /// Day to show (yyyy-MM-dd); only today is polled live
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl MonitorArgs {
    pub fn resolve(&self) -> Result<MonitorConfig, ConfigError> {
        self.resolve_with(default_config_path().as_deref())
    }

    /// Resolve against a specific fallback file instead of the home default.
    pub fn resolve_with(&self, fallback: Option<&Path>) -> Result<MonitorConfig, ConfigError> {
        let mut config = match (&self.config, fallback) {
            (Some(path), _) => MonitorConfig::load(path)?,
            (None, Some(path)) if path.exists() => {
                tracing::info!("Using config file {}", path.display());
                MonitorConfig::load(path)?
            }
            _ => MonitorConfig::default(),
        };

        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(camera) = &self.camera {
            config.camera = Some(camera.clone());
        }
        if let Some(interval) = self.interval {
            config.interval_minutes = interval;
        }
        if self.no_auto_follow {
            config.auto_follow = false;
        }
        if let Some(secs) = self.camera_refresh_secs {
            config.camera_refresh_secs = secs;
        }
        Ok(config)
    }
}
