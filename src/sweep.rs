//! When a reservation becomes eligible for reclaim.
//!
//! A reservation with an explicit `expires_at` is stale once that instant
//! is before the cutoff. One without is stale once it was created more
//! than the default TTL before the cutoff. Both compare against the same
//! cutoff, so a reservation created at `t` with `expires_at = t + ttl`
//! and one created at `t` without expiry go stale together.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Error, Reservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    default_ttl: Duration,
}

impl SweepPolicy {
    pub fn new(default_ttl: Duration) -> Self {
        Self { default_ttl }
    }

    /// Expiry attached to a reservation created at `now`.
    pub fn expiry_for(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
        now.checked_add_signed(self.default_ttl).ok_or_else(|| {
            Error::TimestampOutOfRange(format!("{} + {}", now, self.default_ttl))
        })
    }

    pub fn filter(
        &self,
        now: DateTime<Utc>,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<StaleFilter, Error> {
        let cutoff = cutoff.unwrap_or(now);
        let created_before = cutoff.checked_sub_signed(self.default_ttl).ok_or_else(|| {
            Error::TimestampOutOfRange(format!("{} - {}", cutoff, self.default_ttl))
        })?;
        Ok(StaleFilter {
            cutoff,
            created_before,
        })
    }
}

/// Predicate the store evaluates while scanning a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleFilter {
    pub cutoff: DateTime<Utc>,
    pub created_before: DateTime<Utc>,
}

impl StaleFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        match reservation.expires_at {
            Some(expires_at) => expires_at < self.cutoff,
            None => reservation.created_at < self.created_before,
        }
    }
}
