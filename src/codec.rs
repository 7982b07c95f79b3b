//! Key layout for the ledger table.
//!
//! Rows are partitioned by customer id. Reservations are sorted by their
//! request id, a UUIDv7 in its 32-char lowercase hex form, so request ids
//! order by creation time. The account row lives under
//! [`ACCOUNT_SORT_KEY`], which sorts after every possible request id: a
//! range scan bounded below the sentinel sees only reservations.

use chrono::{DateTime, Duration, Utc};
use uuid::{Uuid, Version};

use crate::domain::Error;

/// `~` is the greatest printable ASCII character and above any hex digit.
pub const ACCOUNT_SORT_KEY: &str = "~account";

const REQUEST_ID_LEN: usize = 32;

/// Generates a fresh, time-ordered request id.
pub fn new_request_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// True when `s` has the exact shape [`new_request_id`] produces.
pub fn is_request_id(s: &str) -> bool {
    if s.len() != REQUEST_ID_LEN
        || !s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }
    matches!(
        Uuid::try_parse(s).map(|u| u.get_version()),
        Ok(Some(Version::SortRand))
    )
}

/// Store-native expiry for a reservation row created at `now`.
pub fn delete_at(now: DateTime<Utc>, retention: Duration) -> Result<i64, Error> {
    now.checked_add_signed(retention)
        .map(|t| t.timestamp())
        .ok_or_else(|| Error::TimestampOutOfRange(format!("{} + {}", now, retention)))
}
