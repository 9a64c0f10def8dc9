//! Opportunity Detector configuration.

use std::collections::HashSet;

use fra_core::decimal::Rate;
use serde::{Deserialize, Serialize};

fn default_rate_difference_threshold() -> Rate {
    Rate::new(rust_decimal::Decimal::new(5, 3)) // 0.005
}

fn default_target_basis_hours() -> u32 {
    8
}

/// Configuration for the Opportunity Detector (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum absolute rate difference, at `target_basis_hours`, for a
    /// venue pair to be considered an arbitrage opportunity.
    #[serde(default = "default_rate_difference_threshold")]
    pub rate_difference_threshold: Rate,
    /// Basis the detector normalizes every venue's rate to before
    /// comparing (§9 Open Question 1: detection happens on normalized,
    /// not raw, rates).
    #[serde(default = "default_target_basis_hours")]
    pub target_basis_hours: u32,
    /// Symbols the detector evaluates. `None` means every symbol the
    /// aggregator publishes a snapshot for is eligible.
    #[serde(default)]
    pub eligible_symbols: Option<HashSet<String>>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rate_difference_threshold: default_rate_difference_threshold(),
            target_basis_hours: default_target_basis_hours(),
            eligible_symbols: None,
        }
    }
}

impl DetectorConfig {
    pub fn is_eligible(&self, symbol: &str) -> bool {
        match &self.eligible_symbols {
            Some(set) => set.contains(symbol),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_all_symbols() {
        let config = DetectorConfig::default();
        assert!(config.is_eligible("BTCUSDT"));
    }

    #[test]
    fn restricted_set_excludes_others() {
        let mut config = DetectorConfig::default();
        config.eligible_symbols = Some(["BTCUSDT".to_string()].into_iter().collect());
        assert!(config.is_eligible("BTCUSDT"));
        assert!(!config.is_eligible("ETHUSDT"));
    }
}
