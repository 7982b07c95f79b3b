use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("customer_id is required")]
    MissingCustomerId,

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },

    #[error("Insufficient available amount for customer {customer_id} when requesting {amount}")]
    InsufficientFunds { customer_id: String, amount: Decimal },

    #[error("Reservation {request_id} not found for customer {customer_id}")]
    ReservationNotFound {
        customer_id: String,
        request_id: String,
    },

    #[error("Customer {0} cannot be found")]
    AccountNotFound(String),

    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(String),

    #[error("Ingestion failed with: {0}")]
    Ingestion(String),

    #[error("Configuration failed with: {0}")]
    Config(#[from] figment::Error),
}

impl Error {
    /// Only I/O failures against the store are worth retrying. Business
    /// outcomes are final, and a missing reservation on a retried
    /// confirm/release means the first attempt went through.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

/// Failure reported by a [`LedgerStore`](crate::domain::LedgerStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conditional check failed")]
    ConditionFailed,

    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

/// The first half of a two-step operation landed and the second did not.
/// Nothing compensates for these automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialFailure {
    /// Account debited by `request`, reservation row never written.
    DebitedWithoutReservation {
        customer_id: String,
        amount: Decimal,
    },
    /// Reservation deleted by `release`/`reclaim`, amount never credited back.
    DeletedWithoutCredit {
        customer_id: String,
        request_id: String,
        amount: Decimal,
    },
}

impl core::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PartialFailure::DebitedWithoutReservation {
                customer_id,
                amount,
            } => write!(
                f,
                "customer {} debited {} without a reservation",
                customer_id, amount
            ),
            PartialFailure::DeletedWithoutCredit {
                customer_id,
                request_id,
                amount,
            } => write!(
                f,
                "reservation {} of customer {} deleted without crediting {}",
                request_id, customer_id, amount
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(Error::from(StoreError::Unavailable("timeout".into())).is_retryable());
        assert!(
            !Error::ReservationNotFound {
                customer_id: "c1".into(),
                request_id: "r1".into(),
            }
            .is_retryable()
        );
        assert!(
            !Error::InsufficientFunds {
                customer_id: "c1".into(),
                amount: dec!(1),
            }
            .is_retryable()
        );
    }
}
