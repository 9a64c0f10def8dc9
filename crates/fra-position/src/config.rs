//! Position Exit Monitor configuration.

use serde::{Deserialize, Serialize};

fn default_debounce_secs() -> i64 {
    60
}

fn default_target_basis_hours() -> u32 {
    8
}

/// Configuration for the Position Exit Monitor (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitMonitorConfig {
    /// Minimum interval between suggestion emissions for the same
    /// position (spec §4.7 step 5).
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: i64,
    /// Basis both legs' current funding rates are normalized to before
    /// computing `currentAPY`.
    #[serde(default = "default_target_basis_hours")]
    pub target_basis_hours: u32,
}

impl Default for ExitMonitorConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            target_basis_hours: default_target_basis_hours(),
        }
    }
}
