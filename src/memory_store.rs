use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::codec::ACCOUNT_SORT_KEY;
use crate::domain::{
    Account, AccountUpdate, LedgerStore, Reservation, ReservationPage, StoreError,
};
use crate::sweep::StaleFilter;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
enum Row {
    Account(Account),
    Reservation(Reservation),
}

/// In-process ledger table. Each customer partition is a sorted map
/// guarded by its shard lock, so every call is atomic per partition and
/// partitions never contend with each other.
#[derive(Debug)]
pub struct MemoryStore {
    partitions: DashMap<String, BTreeMap<String, Row>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl MemoryStore {
    /// `page_size` bounds how many rows a single query evaluates.
    pub fn new(page_size: usize) -> Self {
        Self {
            partitions: DashMap::new(),
            page_size: page_size.max(1),
        }
    }

    /// All reservation rows of a customer, in request id order.
    pub fn reservations(&self, customer_id: &str) -> Vec<Reservation> {
        self.partitions
            .get(customer_id)
            .map(|partition| {
                partition
                    .range::<str, _>((Bound::Unbounded, Bound::Excluded(ACCOUNT_SORT_KEY)))
                    .filter_map(|(_, row)| match row {
                        Row::Reservation(r) => Some(r.clone()),
                        Row::Account(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops reservation rows whose `delete_at` has passed, the way a
    /// store-native TTL would. Account rows never expire.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let now = now.timestamp();
        let mut purged = 0;
        for mut partition in self.partitions.iter_mut() {
            let before = partition.len();
            partition.retain(|_, row| match row {
                Row::Reservation(r) => r.delete_at > now,
                Row::Account(_) => true,
            });
            purged += before - partition.len();
        }
        if purged > 0 {
            debug!(purged, "purged expired reservation rows");
        }
        purged
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_account(&self, customer_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .partitions
            .get(customer_id)
            .and_then(|partition| match partition.get(ACCOUNT_SORT_KEY) {
                Some(Row::Account(account)) => Some(account.clone()),
                _ => None,
            }))
    }

    async fn update_account(&self, update: &AccountUpdate) -> Result<Account, StoreError> {
        let mut partition = self
            .partitions
            .entry(update.customer_id.clone())
            .or_default();
        let current = match partition.get(ACCOUNT_SORT_KEY) {
            Some(Row::Account(account)) => Some(account),
            _ => None,
        };
        let updated = update.apply(current).ok_or(StoreError::ConditionFailed)?;
        partition.insert(ACCOUNT_SORT_KEY.to_owned(), Row::Account(updated.clone()));
        Ok(updated)
    }

    async fn put_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        if reservation.request_id.as_str() >= ACCOUNT_SORT_KEY {
            return Err(StoreError::Unavailable(format!(
                "sort key {} collides with the account row",
                reservation.request_id
            )));
        }
        self.partitions
            .entry(reservation.customer_id.clone())
            .or_default()
            .insert(
                reservation.request_id.clone(),
                Row::Reservation(reservation.clone()),
            );
        Ok(())
    }

    async fn delete_reservation(
        &self,
        customer_id: &str,
        request_id: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        let Some(mut partition) = self.partitions.get_mut(customer_id) else {
            return Ok(None);
        };
        if !matches!(partition.get(request_id), Some(Row::Reservation(_))) {
            return Ok(None);
        }
        match partition.remove(request_id) {
            Some(Row::Reservation(reservation)) => Ok(Some(reservation)),
            _ => Ok(None),
        }
    }

    async fn query_reservations(
        &self,
        customer_id: &str,
        filter: &StaleFilter,
        start_after: Option<&str>,
    ) -> Result<ReservationPage, StoreError> {
        let Some(partition) = self.partitions.get(customer_id) else {
            return Ok(ReservationPage::default());
        };

        let lower = match start_after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let mut rows = partition
            .range::<str, _>((lower, Bound::Excluded(ACCOUNT_SORT_KEY)))
            .peekable();

        let mut page = ReservationPage::default();
        let mut evaluated = 0;
        while evaluated < self.page_size {
            let Some((key, row)) = rows.next() else {
                break;
            };
            evaluated += 1;
            if let Row::Reservation(reservation) = row {
                if filter.matches(reservation) {
                    page.items.push(reservation.clone());
                }
            }
            if evaluated == self.page_size && rows.peek().is_some() {
                page.last_evaluated = Some(key.clone());
            }
        }
        Ok(page)
    }
}
