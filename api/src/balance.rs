use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// Exact fixed-point quantity of the chain's native unit, stored in rao.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many decimal places (max {UNIT_DECIMALS}): {0}")]
    TooPrecise(String),
    #[error("amount overflows: {0}")]
    Overflow(String),
}

impl Balance {
    pub const ZERO: Balance = Balance(0);

    #[inline]
    pub const fn from_rao(rao: u64) -> Self {
        Self(rao)
    }

    #[inline]
    pub const fn rao(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn saturating_add(self, other: Balance) -> Balance {
        Balance(self.0.saturating_add(other.0))
    }

    #[inline]
    pub const fn saturating_sub(self, other: Balance) -> Balance {
        Balance(self.0.saturating_sub(other.0))
    }

    pub fn checked_add(self, other: Balance) -> Option<Balance> {
        self.0.checked_add(other.0).map(Balance)
    }

    /// Whole units, lossy. Only meant for display and metrics.
    pub fn as_units_f64(&self) -> f64 {
        self.0 as f64 / RAO_PER_UNIT as f64
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / RAO_PER_UNIT;
        let frac = self.0 % RAO_PER_UNIT;
        write!(f, "{whole}.{frac:0width$}", width = UNIT_DECIMALS as usize)
    }
}

impl FromStr for Balance {
    type Err = BalanceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BalanceParseError::Empty);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(BalanceParseError::Invalid(s.to_string()));
        }
        if frac.len() > UNIT_DECIMALS as usize {
            return Err(BalanceParseError::TooPrecise(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| BalanceParseError::Overflow(s.to_string()))?
        };

        let mut frac_rao: u64 = 0;
        if !frac.is_empty() {
            let padded = format!("{frac:0<width$}", width = UNIT_DECIMALS as usize);
            frac_rao = padded
                .parse()
                .map_err(|_| BalanceParseError::Invalid(s.to_string()))?;
        }

        whole
            .checked_mul(RAO_PER_UNIT)
            .and_then(|rao| rao.checked_add(frac_rao))
            .map(Balance)
            .ok_or_else(|| BalanceParseError::Overflow(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_fraction() {
        assert_eq!(Balance::from_rao(1).to_string(), "0.000000001");
        assert_eq!(Balance::from_rao(RAO_PER_UNIT).to_string(), "1.000000000");
        assert_eq!(Balance::from_rao(12_500_000_000).to_string(), "12.500000000");
    }

    #[test]
    fn parse_whole_and_fractional() {
        assert_eq!("1".parse::<Balance>().unwrap(), Balance::from_rao(RAO_PER_UNIT));
        assert_eq!("0.5".parse::<Balance>().unwrap(), Balance::from_rao(500_000_000));
        assert_eq!(".25".parse::<Balance>().unwrap(), Balance::from_rao(250_000_000));
        assert_eq!("3.000000001".parse::<Balance>().unwrap(), Balance::from_rao(3_000_000_001));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<Balance>(), Err(BalanceParseError::Empty));
        assert!(matches!("1.2.3".parse::<Balance>(), Err(BalanceParseError::Invalid(_))));
        assert!(matches!("-1".parse::<Balance>(), Err(BalanceParseError::Invalid(_))));
        assert!(matches!("0.0000000001".parse::<Balance>(), Err(BalanceParseError::TooPrecise(_))));
        assert!(matches!("99999999999999999999".parse::<Balance>(), Err(BalanceParseError::Overflow(_))));
    }

    #[test]
    fn saturating_math() {
        let a = Balance::from_rao(5);
        assert_eq!(a.saturating_sub(Balance::from_rao(9)), Balance::ZERO);
        assert_eq!(Balance::from_rao(u64::MAX).saturating_add(a), Balance::from_rao(u64::MAX));
        assert_eq!(Balance::from_rao(u64::MAX).checked_add(a), None);
    }

    #[test]
    fn serializes_as_rao() {
        let json = serde_json::to_string(&Balance::from_rao(42)).unwrap();
        assert_eq!(json, "42");
        let back: Balance = serde_json::from_str("42").unwrap();
        assert_eq!(back.rao(), 42);
    }
}
