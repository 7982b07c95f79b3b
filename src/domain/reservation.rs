use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// An outstanding hold against a customer's quota. Written once by
/// `request`, then only read and deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub customer_id: String,
    pub request_id: String,
    pub req_amount: Decimal,
    pub expires_at: Option<DateTime<Utc>>, // None: default TTL from created_at
    pub created_at: DateTime<Utc>,
    pub delete_at: i64, // unix seconds, store-native expiry
}

/// One page of a reservation query. `last_evaluated` is set when the
/// partition holds more rows past this page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPage {
    pub items: Vec<Reservation>,
    pub last_evaluated: Option<String>,
}

impl ReservationPage {
    pub fn has_more(&self) -> bool {
        self.last_evaluated.is_some()
    }
}
