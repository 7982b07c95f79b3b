use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::domain::{
    Account, AccountUpdate, Command, Error, PartialFailure, Reservation, ReservationPage,
    StoreError,
};
use crate::sweep::StaleFilter;

/// Key-value store holding account and reservation rows, partitioned by
/// customer id. Every call is atomic and linearizable per row; nothing
/// is atomic across rows.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Point read of the account row.
    async fn get_account(&self, customer_id: &str) -> Result<Option<Account>, StoreError>;

    /// Applies `update` atomically, returning the new row, or
    /// [`StoreError::ConditionFailed`] with no side effect.
    async fn update_account(&self, update: &AccountUpdate) -> Result<Account, StoreError>;

    async fn put_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Deletes a reservation row and returns what it held, if it existed.
    async fn delete_reservation(
        &self,
        customer_id: &str,
        request_id: &str,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Returns one page of the customer's reservations matching `filter`,
    /// starting after `start_after` when given.
    async fn query_reservations(
        &self,
        customer_id: &str,
        filter: &StaleFilter,
        start_after: Option<&str>,
    ) -> Result<ReservationPage, StoreError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Observes two-step operations that stopped halfway.
pub trait PartialFailureHook: Send + Sync {
    fn report(&self, failure: &PartialFailure);
}

pub trait CommandStream {
    type CmdStream: Stream<Item = Result<Command, Error>> + Send + Unpin + 'static;
    fn stream(&mut self) -> Self::CmdStream;
}

pub trait DeadLetterQueue {
    fn report(&self, command: Option<&Command>, error: &Error);
}
