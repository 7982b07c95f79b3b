use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Per-customer quota row, stored under the account sentinel sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub customer_id: String,
    pub avail_amount: Decimal, // quota not currently held by reservations
    pub max_amount: Decimal,   // first write wins
    pub updated_at: DateTime<Utc>, // set on creation only
}

impl Account {
    pub fn new(customer_id: &str, max_amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            customer_id: customer_id.to_owned(),
            avail_amount: max_amount,
            max_amount,
            updated_at: now,
        }
    }

    /// Amount currently held by outstanding reservations.
    pub fn held_amount(&self) -> Decimal {
        self.max_amount - self.avail_amount
    }
}

/// Conditional upsert applied atomically to a single account row.
///
/// A missing row is first initialised with `default_max` as both the
/// available and the maximum amount. The update then subtracts `delta`
/// from `avail_amount`, provided the row was missing or its current
/// `avail_amount` is at least `delta`. A negative `delta` credits the
/// account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub customer_id: String,
    pub delta: Decimal,
    pub default_max: Decimal,
    pub now: DateTime<Utc>,
}

impl AccountUpdate {
    pub fn debit(
        customer_id: &str,
        amount: Decimal,
        default_max: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id: customer_id.to_owned(),
            delta: amount,
            default_max,
            now,
        }
    }

    pub fn credit(
        customer_id: &str,
        amount: Decimal,
        default_max: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self::debit(customer_id, -amount, default_max, now)
    }

    /// Applies the update to the current row, or returns `None` when the
    /// floor condition does not hold.
    pub fn apply(&self, current: Option<&Account>) -> Option<Account> {
        match current {
            None => {
                let mut account = Account::new(&self.customer_id, self.default_max, self.now);
                account.avail_amount -= self.delta;
                Some(account)
            }
            Some(account) if account.avail_amount >= self.delta => {
                let mut account = account.clone();
                account.avail_amount -= self.delta;
                Some(account)
            }
            Some(_) => None,
        }
    }
}
