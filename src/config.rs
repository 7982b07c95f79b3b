//! Settings for the quota manager.
//!
//! Sources are merged in order, later ones overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. an optional YAML file
//! 3. environment variables prefixed with `QUOTA_LEDGER_`
//!
//! ```yaml
//! default_max_limit: 5000001
//! default_reservation_ttl: 10m
//! reservation_retention: 24h
//! sweep_page_size: 100
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Error;
use crate::memory_store::DEFAULT_PAGE_SIZE;

pub const ENV_PREFIX: &str = "QUOTA_LEDGER_";

/// Upper bound for TTL and retention windows.
pub const MAX_WINDOW: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quota given to an account the first time it is touched.
    pub default_max_limit: Decimal,
    /// How long a reservation may stay unresolved before reclaim.
    #[serde(with = "humantime_serde")]
    pub default_reservation_ttl: Duration,
    /// Store-native expiry of reservation rows.
    #[serde(with = "humantime_serde")]
    pub reservation_retention: Duration,
    pub sweep_page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_max_limit: Decimal::from(5_000_001),
            default_reservation_ttl: Duration::from_secs(600),
            reservation_retention: Duration::from_secs(24 * 3600),
            sweep_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Settings {
    /// Loads defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let settings: Self = Self::figment(path).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlays a parameter mapping on the defaults.
    pub fn from_params(params: &HashMap<String, serde_json::Value>) -> Result<Self, Error> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Serialized::globals(params))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Out-of-range values saturate; every timestamp derived from them is
    /// computed with checked arithmetic.
    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.default_reservation_ttl).unwrap_or(chrono::Duration::MAX)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.reservation_retention).unwrap_or(chrono::Duration::MAX)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.default_max_limit <= Decimal::ZERO {
            return Err(figment::Error::from(format!(
                "default_max_limit must be positive, got {}",
                self.default_max_limit
            ))
            .into());
        }
        check_window("default_reservation_ttl", self.default_reservation_ttl)?;
        check_window("reservation_retention", self.reservation_retention)?;
        if self.sweep_page_size == 0 {
            return Err(figment::Error::from("sweep_page_size must be non-zero".to_string()).into());
        }
        Ok(())
    }
}

fn check_window(name: &str, window: Duration) -> Result<(), Error> {
    if window.is_zero() || window > MAX_WINDOW {
        return Err(figment::Error::from(format!(
            "{} must be non-zero and at most {}, got {}",
            name,
            humantime::format_duration(MAX_WINDOW),
            humantime::format_duration(window)
        ))
        .into());
    }
    Ok(())
}
