//! Precision-safe decimal newtypes for funding-rate arbitrage math.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Monetary and rate
//! values are never represented as binary floats once they cross a
//! component boundary — see spec §6 "monetary precision".

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! decimal_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Decimal);

        impl $name {
            pub const ZERO: Self = Self(Decimal::ZERO);
            pub const ONE: Self = Self(Decimal::ONE);

            #[inline]
            pub fn new(value: Decimal) -> Self {
                Self(value)
            }

            #[inline]
            pub fn inner(&self) -> Decimal {
                self.0
            }

            #[inline]
            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            #[inline]
            pub fn is_positive(&self) -> bool {
                self.0.is_sign_positive() && !self.0.is_zero()
            }

            #[inline]
            pub fn is_negative(&self) -> bool {
                self.0.is_sign_negative() && !self.0.is_zero()
            }

            #[inline]
            pub fn abs(&self) -> Self {
                Self(self.0.abs())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Decimal> for $name {
            fn from(d: Decimal) -> Self {
                Self(d)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<Decimal> for $name {
            type Output = Self;
            fn mul(self, rhs: Decimal) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<Decimal> for $name {
            type Output = Self;
            fn div(self, rhs: Decimal) -> Self::Output {
                Self(self.0 / rhs)
            }
        }
    };
}

/// A price quoted by a venue (mark price, index price, ...).
decimal_newtype!(Price);

/// A position or order size, in base-asset units.
decimal_newtype!(Size);

/// A monetary amount, in the account's quote currency.
decimal_newtype!(Money);

/// A funding rate or any other rate expressed as a fraction (0.0001 = 0.01%).
decimal_newtype!(Rate);

impl Price {
    /// Basis-point difference from another price: `(self - other) / other * 10_000`.
    #[inline]
    pub fn bps_from(&self, other: Price) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        Some((self.0 - other.0) / other.0 * Decimal::from(10_000))
    }

    /// Percentage difference from another price.
    #[inline]
    pub fn pct_from(&self, other: Price) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        Some((self.0 - other.0) / other.0 * Decimal::from(100))
    }
}

impl Size {
    /// Notional value: `size * price`.
    #[inline]
    pub fn notional(&self, price: Price) -> Money {
        Money(self.0 * price.0)
    }
}

impl Rate {
    /// Rate as a percentage (0.0001 -> 0.01).
    #[inline]
    pub fn as_percent(&self) -> Decimal {
        self.0 * Decimal::from(100)
    }

    /// Re-express a rate quoted per `from_hours` into an equivalent rate
    /// per `to_hours`, assuming linear scaling across the funding interval.
    ///
    /// This is the normalization used to decide §9 Open Question 1: the
    /// detector always compares rates normalized to a single basis.
    pub fn normalize_to_basis(&self, from_hours: u32, to_hours: u32) -> Rate {
        if from_hours == 0 || to_hours == 0 {
            return *self;
        }
        Rate(self.0 * Decimal::from(to_hours) / Decimal::from(from_hours))
    }

    /// Annualize a rate quoted per `interval_hours` (simple, non-compounding).
    pub fn annualized(&self, interval_hours: u32) -> Rate {
        if interval_hours == 0 {
            return Rate::ZERO;
        }
        let periods_per_year = Decimal::from(24 * 365) / Decimal::from(interval_hours);
        Rate(self.0 * periods_per_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_bps_from() {
        let p1 = Price::new(dec!(100));
        let p2 = Price::new(dec!(101));
        assert_eq!(p2.bps_from(p1).unwrap(), dec!(100));
    }

    #[test]
    fn size_notional() {
        let size = Size::new(dec!(0.5));
        let price = Price::new(dec!(50000));
        assert_eq!(size.notional(price).inner(), dec!(25000));
    }

    #[test]
    fn rate_normalize_to_basis() {
        // 0.01% per 8h normalized to a 1h basis is one eighth.
        let rate = Rate::new(dec!(0.0001));
        let normalized = rate.normalize_to_basis(8, 1);
        assert_eq!(normalized.inner(), dec!(0.0000125));
    }

    #[test]
    fn rate_annualized() {
        let rate = Rate::new(dec!(0.0001));
        let annual = rate.annualized(8);
        // 0.0001 * (24*365/8) = 0.0001 * 1095 = 0.1095
        assert_eq!(annual.inner(), dec!(0.1095));
    }
}
