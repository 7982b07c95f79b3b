use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer};

/// A monetary amount read from input, kept at four decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const TARGET_DECIMALS: u32 = 4;

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Rounds half to even past four decimal places.
    pub fn from_decimal(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(
            Self::TARGET_DECIMALS,
            RoundingStrategy::MidpointNearestEven,
        ))
    }

    pub fn from_decimal_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        // reject exponents and stray signs the decimal parser would accept
        if !s
            .trim_start_matches('-')
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.')
        {
            return None;
        }
        Decimal::from_str(s).ok().map(Self::from_decimal)
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_decimal_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid amount format: {}", s)))
    }
}
