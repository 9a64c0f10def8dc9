//! Rate Normalizer (spec §4.4).
//!
//! Pure function: re-express a funding rate observed at one settlement
//! interval as the equivalent rate at a target basis. No state, no I/O.

use fra_core::decimal::Rate;
use fra_core::error::CoreError;
use fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS;

use crate::error::FeedResult;

/// The only funding intervals a venue may report.
pub const ALLOWED_BASES: [u32; 4] = [1, 4, 8, 24];

pub fn is_allowed_basis(hours: u32) -> bool {
    ALLOWED_BASES.contains(&hours)
}

/// Normalize `rate`, observed at `from_hours`, to `to_basis_hours`.
///
/// Both intervals must be one of `{1, 4, 8, 24}`. A caller that received
/// no interval from the venue should pass
/// [`fra_core::model::DEFAULT_FUNDING_INTERVAL_HOURS`] for `from_hours`
/// rather than calling this with an arbitrary value.
pub fn normalize(rate: Rate, from_hours: u32, to_basis_hours: u32) -> FeedResult<Rate> {
    if !is_allowed_basis(from_hours) {
        return Err(CoreError::Validation(format!(
            "funding interval {from_hours}h is not one of {ALLOWED_BASES:?}"
        )));
    }
    if !is_allowed_basis(to_basis_hours) {
        return Err(CoreError::Validation(format!(
            "target basis {to_basis_hours}h is not one of {ALLOWED_BASES:?}"
        )));
    }
    Ok(rate.normalize_to_basis(from_hours, to_basis_hours))
}

/// `from_hours`, falling back to the default when the venue reported
/// none (spec §4.4 "missing interval").
pub fn interval_or_default(from_hours: Option<u32>) -> u32 {
    from_hours.unwrap_or(DEFAULT_FUNDING_INTERVAL_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_disallowed_interval() {
        let result = normalize(Rate::new(dec!(0.0001)), 6, 8);
        assert!(result.is_err());
    }

    #[test]
    fn normalizes_allowed_interval() {
        let result = normalize(Rate::new(dec!(0.0008)), 8, 1).unwrap();
        assert_eq!(result.inner(), dec!(0.0001));
    }

    #[test]
    fn missing_interval_falls_back_to_default() {
        assert_eq!(interval_or_default(None), 8);
        assert_eq!(interval_or_default(Some(4)), 4);
    }
}
