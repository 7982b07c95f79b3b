//! Per-customer quota reservations on top of a [`LedgerStore`].
//!
//! Every operation is at most two store calls and relies only on per-row
//! atomicity. `request` debits the account then writes the reservation;
//! `release` and `reclaim` delete the reservation then credit the account.
//! If the second call fails the first is not undone: the customer stays
//! short by the amount, a [`PartialFailure`] is reported to the hook and
//! the store error is returned.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::clock::SystemClock;
use crate::codec;
use crate::config::Settings;
use crate::domain::{
    Account, AccountUpdate, Clock, Error, LedgerStore, PartialFailure, PartialFailureHook,
    Reservation, StoreError,
};
use crate::sweep::SweepPolicy;

/// Reports partial failures through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHook;

impl PartialFailureHook for LogHook {
    fn report(&self, failure: &PartialFailure) {
        error!(partial_failure = %failure, "two-step ledger operation left incomplete");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclaimed {
    pub request_id: String,
    pub amount: Decimal,
}

/// Outcome of one reclaim pass over a single page of reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub reclaimed: Vec<Reclaimed>,
    /// Where the next pass should resume; `None` once the partition has
    /// been scanned to the end.
    pub resume_after: Option<String>,
}

impl ReclaimReport {
    pub fn has_more(&self) -> bool {
        self.resume_after.is_some()
    }

    pub fn total(&self) -> Decimal {
        self.reclaimed.iter().map(|r| r.amount).sum()
    }
}

#[derive(Debug)]
pub struct QuotaManager<S, C = SystemClock, H = LogHook>
where
    S: LedgerStore,
    C: Clock,
    H: PartialFailureHook,
{
    store: S,
    clock: C,
    hook: H,
    default_max: Decimal,
    policy: SweepPolicy,
    retention: Duration,
}

impl<S> QuotaManager<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, settings: &Settings) -> Self {
        Self {
            store,
            clock: SystemClock,
            hook: LogHook,
            default_max: settings.default_max_limit,
            policy: SweepPolicy::new(settings.default_ttl()),
            retention: settings.retention(),
        }
    }
}

impl<S, C, H> QuotaManager<S, C, H>
where
    S: LedgerStore,
    C: Clock,
    H: PartialFailureHook,
{
    pub fn with_clock<C2: Clock>(self, clock: C2) -> QuotaManager<S, C2, H> {
        QuotaManager {
            store: self.store,
            clock,
            hook: self.hook,
            default_max: self.default_max,
            policy: self.policy,
            retention: self.retention,
        }
    }

    pub fn with_hook<H2: PartialFailureHook>(self, hook: H2) -> QuotaManager<S, C, H2> {
        QuotaManager {
            store: self.store,
            clock: self.clock,
            hook,
            default_max: self.default_max,
            policy: self.policy,
            retention: self.retention,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reserves `amount` against the customer's available quota and
    /// returns the new request id. The reservation carries no explicit
    /// expiry and goes stale after the default TTL.
    pub async fn request(&self, customer_id: &str, amount: Decimal) -> Result<String, Error> {
        self.reserve(customer_id, amount, None).await
    }

    /// Like [`request`](Self::request), with an explicit expiry.
    pub async fn request_until(
        &self,
        customer_id: &str,
        amount: Decimal,
        expires_at: DateTime<Utc>,
    ) -> Result<String, Error> {
        self.reserve(customer_id, amount, Some(expires_at)).await
    }

    /// Like [`request`](Self::request), expiring after the default TTL.
    pub async fn request_with_default_expiry(
        &self,
        customer_id: &str,
        amount: Decimal,
    ) -> Result<String, Error> {
        let expires_at = self.policy.expiry_for(self.clock.now())?;
        self.reserve(customer_id, amount, Some(expires_at)).await
    }

    async fn reserve(
        &self,
        customer_id: &str,
        amount: Decimal,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String, Error> {
        require_customer(customer_id)?;
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount {
                amount,
                reason: "must be positive".to_string(),
            });
        }
        if amount > self.default_max {
            return Err(Error::InvalidAmount {
                amount,
                reason: format!("cannot exceed max_amount {}", self.default_max),
            });
        }

        let now = self.clock.now();
        let delete_at = codec::delete_at(now, self.retention)?;
        let update = AccountUpdate::debit(customer_id, amount, self.default_max, now);
        let account = match self.store.update_account(&update).await {
            Ok(account) => account,
            Err(StoreError::ConditionFailed) => {
                info!(customer_id, %amount, "insufficient available amount");
                return Err(Error::InsufficientFunds {
                    customer_id: customer_id.to_owned(),
                    amount,
                });
            }
            Err(e) => {
                info!(customer_id, %amount, error = %e, "account debit failed");
                return Err(e.into());
            }
        };

        let reservation = Reservation {
            customer_id: customer_id.to_owned(),
            request_id: codec::new_request_id(),
            req_amount: amount,
            expires_at,
            created_at: now,
            delete_at,
        };
        if let Err(e) = self.store.put_reservation(&reservation).await {
            self.hook.report(&PartialFailure::DebitedWithoutReservation {
                customer_id: customer_id.to_owned(),
                amount,
            });
            return Err(e.into());
        }

        info!(
            customer_id,
            request_id = %reservation.request_id,
            %amount,
            avail_amount = %account.avail_amount,
            "reservation created"
        );
        Ok(reservation.request_id)
    }

    /// Consumes a reservation for good. The amount stays deducted.
    pub async fn confirm(&self, customer_id: &str, request_id: &str) -> Result<Decimal, Error> {
        let reservation = self.take(customer_id, request_id).await?;
        info!(
            customer_id,
            request_id,
            amount = %reservation.req_amount,
            "reservation confirmed"
        );
        Ok(reservation.req_amount)
    }

    /// Cancels a reservation and gives its amount back.
    pub async fn release(&self, customer_id: &str, request_id: &str) -> Result<Decimal, Error> {
        let reservation = self.take(customer_id, request_id).await?;
        let account = self.credit(&reservation).await?;
        info!(
            customer_id,
            request_id,
            amount = %reservation.req_amount,
            avail_amount = %account.avail_amount,
            "reservation released"
        );
        Ok(reservation.req_amount)
    }

    /// Releases the stale reservations found in the first page of the
    /// customer's partition. `cutoff` defaults to now.
    pub async fn reclaim(
        &self,
        customer_id: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<ReclaimReport, Error> {
        self.reclaim_from(customer_id, cutoff, None).await
    }

    /// One reclaim pass starting after `start_after`, typically the
    /// `resume_after` of the previous pass. A single pass never follows
    /// further pages.
    pub async fn reclaim_from(
        &self,
        customer_id: &str,
        cutoff: Option<DateTime<Utc>>,
        start_after: Option<&str>,
    ) -> Result<ReclaimReport, Error> {
        require_customer(customer_id)?;
        let filter = self.policy.filter(self.clock.now(), cutoff)?;
        info!(
            customer_id,
            cutoff = %filter.cutoff,
            "reclaiming outstanding reservations"
        );

        let page = self
            .store
            .query_reservations(customer_id, &filter, start_after)
            .await?;
        if page.has_more() {
            info!(
                customer_id,
                cutoff = %filter.cutoff,
                "stale reservation query returned more than one page"
            );
        }

        let mut report = ReclaimReport {
            reclaimed: Vec::with_capacity(page.items.len()),
            resume_after: page.last_evaluated,
        };
        for candidate in page.items {
            let reservation = match self.reclaim_one(&candidate).await {
                Ok(Some(reservation)) => reservation,
                Ok(None) => continue,
                Err(e) => {
                    // the caller only sees the error; keep what this pass already did
                    warn!(
                        customer_id,
                        reclaimed = report.reclaimed.len(),
                        reclaimed_amount = %report.total(),
                        reclaimed_ids = ?report
                            .reclaimed
                            .iter()
                            .map(|r| r.request_id.as_str())
                            .collect::<Vec<_>>(),
                        error = %e,
                        "reclaim pass stopped early"
                    );
                    return Err(e);
                }
            };
            info!(
                customer_id,
                request_id = %reservation.request_id,
                amount = %reservation.req_amount,
                "reservation reclaimed"
            );
            report.reclaimed.push(Reclaimed {
                request_id: reservation.request_id,
                amount: reservation.req_amount,
            });
        }
        Ok(report)
    }

    async fn reclaim_one(&self, candidate: &Reservation) -> Result<Option<Reservation>, Error> {
        let Some(reservation) = self
            .store
            .delete_reservation(&candidate.customer_id, &candidate.request_id)
            .await?
        else {
            debug!(
                customer_id = %candidate.customer_id,
                request_id = %candidate.request_id,
                "reservation resolved before reclaim"
            );
            return Ok(None);
        };
        self.credit(&reservation).await?;
        Ok(Some(reservation))
    }

    /// Current quota of a customer that has made at least one request.
    pub async fn load(&self, customer_id: &str) -> Result<Account, Error> {
        require_customer(customer_id)?;
        self.store
            .get_account(customer_id)
            .await?
            .ok_or_else(|| {
                info!(customer_id, "account not found");
                Error::AccountNotFound(customer_id.to_owned())
            })
    }

    async fn take(&self, customer_id: &str, request_id: &str) -> Result<Reservation, Error> {
        require_customer(customer_id)?;
        let not_found = || Error::ReservationNotFound {
            customer_id: customer_id.to_owned(),
            request_id: request_id.to_owned(),
        };
        if !codec::is_request_id(request_id) {
            info!(customer_id, request_id, "malformed request id");
            return Err(not_found());
        }
        match self.store.delete_reservation(customer_id, request_id).await? {
            Some(reservation) => Ok(reservation),
            None => {
                info!(customer_id, request_id, "unable to delete reservation");
                Err(not_found())
            }
        }
    }

    async fn credit(&self, reservation: &Reservation) -> Result<Account, Error> {
        let update = AccountUpdate::credit(
            &reservation.customer_id,
            reservation.req_amount,
            self.default_max,
            self.clock.now(),
        );
        self.store.update_account(&update).await.map_err(|e| {
            self.hook.report(&PartialFailure::DeletedWithoutCredit {
                customer_id: reservation.customer_id.clone(),
                request_id: reservation.request_id.clone(),
                amount: reservation.req_amount,
            });
            Error::from(e)
        })
    }
}

fn require_customer(customer_id: &str) -> Result<(), Error> {
    if customer_id.is_empty() {
        return Err(Error::MissingCustomerId);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory_store::MemoryStore;
    use rust_decimal::dec;

    fn manager(max: Decimal) -> QuotaManager<MemoryStore, ManualClock> {
        let settings = Settings {
            default_max_limit: max,
            ..Settings::default()
        };
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        QuotaManager::new(MemoryStore::default(), &settings).with_clock(ManualClock::new(start))
    }

    #[tokio::test]
    async fn request_and_release_walkthrough() {
        let m = manager(dec!(1000));

        let first = m.request("c1", dec!(700)).await.unwrap();
        assert!(matches!(
            m.request("c1", dec!(500)).await,
            Err(Error::InsufficientFunds { .. })
        ));
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(300));

        assert_eq!(m.release("c1", &first).await.unwrap(), dec!(700));
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(1000));

        m.request("c1", dec!(500)).await.unwrap();
        let account = m.load("c1").await.unwrap();
        assert_eq!(account.avail_amount, dec!(500));
        assert_eq!(account.max_amount, dec!(1000));
    }

    #[tokio::test]
    async fn invalid_amounts_never_touch_the_store() {
        let m = manager(dec!(1000));
        for amount in [dec!(0), dec!(-1), dec!(1000.0001)] {
            assert!(matches!(
                m.request("c1", amount).await,
                Err(Error::InvalidAmount { .. })
            ));
        }
        assert!(matches!(
            m.load("c1").await,
            Err(Error::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn whole_quota_can_be_requested_at_once() {
        let m = manager(dec!(1000));
        m.request("c1", dec!(1000)).await.unwrap();
        assert_eq!(m.load("c1").await.unwrap().avail_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn confirm_keeps_amount_deducted() {
        let m = manager(dec!(1000));
        let id = m.request("c1", dec!(250)).await.unwrap();
        assert_eq!(m.confirm("c1", &id).await.unwrap(), dec!(250));
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(750));
        assert!(m.store().reservations("c1").is_empty());

        let report = m
            .reclaim("c1", Some(Utc::now() + Duration::days(3650)))
            .await
            .unwrap();
        assert!(report.reclaimed.is_empty());
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(750));
    }

    #[tokio::test]
    async fn resolving_twice_fails_without_state_change() {
        let m = manager(dec!(1000));
        let id = m.request("c1", dec!(100)).await.unwrap();
        let other = m.request("c1", dec!(50)).await.unwrap();
        m.confirm("c1", &id).await.unwrap();
        let before = m.load("c1").await.unwrap();

        for result in [m.confirm("c1", &id).await, m.release("c1", &id).await] {
            assert!(matches!(result, Err(Error::ReservationNotFound { .. })));
        }
        assert!(matches!(
            m.release("c1", &other[..other.len() - 1]).await,
            Err(Error::ReservationNotFound { .. })
        ));
        assert!(matches!(
            m.confirm("c1", codec::ACCOUNT_SORT_KEY).await,
            Err(Error::ReservationNotFound { .. })
        ));
        assert_eq!(m.load("c1").await.unwrap(), before);
        assert_eq!(m.store().reservations("c1").len(), 1);
    }

    #[tokio::test]
    async fn reclaim_respects_cutoff() {
        let m = manager(dec!(1000));
        let now = m.clock.now();
        let expires_at = now + Duration::minutes(5);
        m.request_until("c1", dec!(300), expires_at).await.unwrap();

        let report = m
            .reclaim("c1", Some(expires_at - Duration::seconds(1)))
            .await
            .unwrap();
        assert!(report.reclaimed.is_empty());
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(700));

        let report = m
            .reclaim("c1", Some(expires_at + Duration::seconds(1)))
            .await
            .unwrap();
        assert_eq!(report.total(), dec!(300));
        assert!(!report.has_more());
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(1000));
    }

    #[tokio::test]
    async fn undated_reservations_reclaimed_after_default_ttl() {
        let m = manager(dec!(1000));
        m.request("c1", dec!(10)).await.unwrap();
        m.request_with_default_expiry("c1", dec!(20)).await.unwrap();

        m.clock.advance(Duration::minutes(9));
        assert!(m.reclaim("c1", None).await.unwrap().reclaimed.is_empty());

        m.clock.advance(Duration::minutes(2));
        let report = m.reclaim("c1", None).await.unwrap();
        assert_eq!(report.reclaimed.len(), 2);
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(1000));
    }

    #[tokio::test]
    async fn reclaim_single_page_per_pass() {
        let settings = Settings {
            default_max_limit: dec!(1000),
            sweep_page_size: 2,
            ..Settings::default()
        };
        let m = QuotaManager::new(MemoryStore::new(settings.sweep_page_size), &settings);
        for _ in 0..5 {
            m.request("c1", dec!(10)).await.unwrap();
        }
        let cutoff = Some(Utc::now() + Duration::days(1));

        let first = m.reclaim("c1", cutoff).await.unwrap();
        assert_eq!(first.reclaimed.len(), 2);
        assert!(first.has_more());
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(970));

        let mut passes = 1;
        let mut resume = first.resume_after;
        while let Some(after) = resume {
            let report = m.reclaim_from("c1", cutoff, Some(&after)).await.unwrap();
            resume = report.resume_after;
            passes += 1;
        }
        assert_eq!(passes, 3);
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(1000));
    }

    #[tokio::test]
    async fn customer_id_is_required() {
        let m = manager(dec!(1000));
        assert!(matches!(
            m.request("", dec!(1)).await,
            Err(Error::MissingCustomerId)
        ));
        assert!(matches!(m.load("").await, Err(Error::MissingCustomerId)));
    }

    #[tokio::test]
    async fn reservation_rows_carry_store_expiry() {
        let m = manager(dec!(1000));
        let now = m.clock.now();
        m.request("c1", dec!(1)).await.unwrap();
        let rows = m.store().reservations("c1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delete_at, (now + Duration::hours(24)).timestamp());
        assert_eq!(rows[0].expires_at, None);
        assert_eq!(rows[0].created_at, now);
    }

    #[tokio::test]
    async fn oversized_windows_fail_without_touching_quota() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let settings = Settings {
            default_max_limit: dec!(1000),
            reservation_retention: std::time::Duration::from_secs(300_000 * 366 * 24 * 3600),
            ..Settings::default()
        };
        let m = QuotaManager::new(MemoryStore::default(), &settings)
            .with_clock(ManualClock::new(start));
        assert!(matches!(
            m.request("c1", dec!(1)).await,
            Err(Error::TimestampOutOfRange(_))
        ));
        assert!(matches!(m.load("c1").await, Err(Error::AccountNotFound(_))));

        let settings = Settings {
            default_max_limit: dec!(1000),
            default_reservation_ttl: std::time::Duration::from_secs(300_000 * 366 * 24 * 3600),
            ..Settings::default()
        };
        let m = QuotaManager::new(MemoryStore::default(), &settings)
            .with_clock(ManualClock::new(start));
        m.request("c1", dec!(1)).await.unwrap();
        assert!(matches!(
            m.request_with_default_expiry("c1", dec!(1)).await,
            Err(Error::TimestampOutOfRange(_))
        ));
        assert!(matches!(
            m.reclaim("c1", None).await,
            Err(Error::TimestampOutOfRange(_))
        ));
        assert_eq!(m.load("c1").await.unwrap().avail_amount, dec!(999));
    }
}
