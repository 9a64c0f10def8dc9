//! Application configuration.

use std::path::Path;

use fra_dashboard::DashboardConfig;
use fra_detector::DetectorConfig;
use fra_executor::TriggerDetectorConfig;
use fra_position::ExitMonitorConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// One venue's REST credentials, read from the environment by
/// [`crate::keystore::EnvKeystore`] rather than stored in this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier, matching the `Venue` the adapter registers
    /// under (e.g. "binance").
    pub name: String,
    /// Symbols this venue is polled for.
    pub symbols: Vec<String>,
}

/// Data-ingestion configuration (spec §4.2-§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Interval between REST funding-rate polls per venue.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// A stream is considered stale after this much time without an
    /// update (spec §4.3 `staleThresholdMs`).
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,
    /// Basis every venue's funding rate is normalized to before the
    /// aggregator compares them (spec §9 Open Question 1).
    #[serde(default = "default_target_basis_hours")]
    pub target_basis_hours: u32,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_stale_threshold_ms() -> u64 {
    90_000
}

fn default_target_basis_hours() -> u32 {
    8
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
            target_basis_hours: default_target_basis_hours(),
        }
    }
}

/// Append-only audit log configuration (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory the daily-rotating audit-log JSON Lines files are
    /// written to.
    #[serde(default = "default_audit_log_dir")]
    pub audit_log_dir: String,
    /// Records buffered before an automatic flush.
    #[serde(default = "default_audit_buffer_size")]
    pub audit_buffer_size: usize,
}

fn default_audit_log_dir() -> String {
    "./data/audit".to_string()
}

fn default_audit_buffer_size() -> usize {
    100
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            audit_log_dir: default_audit_log_dir(),
            audit_buffer_size: default_audit_buffer_size(),
        }
    }
}

/// Maintenance sweep cadence (spec §11: staleness sweep, opportunity
/// expiry sweep).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between opportunity-expiry re-evaluation sweeps.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    30_000
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Application configuration (spec §10.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Venues this deployment polls, and the symbols tracked per venue.
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    /// Users whose webhooks should be evaluated for opportunity events.
    /// Opportunities are not themselves user-owned (spec §4.6), so the
    /// engine fans each detected/expired opportunity out to every
    /// configured user here for notification purposes.
    #[serde(default)]
    pub notify_users: Vec<String>,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub exit_monitor: ExitMonitorConfig,
    #[serde(default)]
    pub trigger_detector: TriggerDetectorConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venues: Vec::new(),
            notify_users: Vec::new(),
            data_source: DataSourceConfig::default(),
            detector: DetectorConfig::default(),
            exit_monitor: ExitMonitorConfig::default(),
            trigger_detector: TriggerDetectorConfig::default(),
            persistence: PersistenceConfig::default(),
            maintenance: MaintenanceConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the `FRA_CONFIG` path, falling back to
    /// `config/default.toml`, falling back to defaults if neither exists.
    pub fn load() -> AppResult<Self> {
        let config_path = std::env::var("FRA_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_venues() {
        let config = AppConfig::default();
        assert!(config.venues.is_empty());
        assert!(config.notify_users.is_empty());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.data_source.poll_interval_ms, config.data_source.poll_interval_ms);
    }
}
