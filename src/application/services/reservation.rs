//! Reservation coordinator
//!
//! Books and releases slots so that the slot flag and the balance debit
//! either both happen or neither does. The occupancy store and the balance
//! ledger cannot share a transaction, so a failed slot commit after a
//! successful debit is undone with a reversal credit. When even that fails a
//! reconciliation record is written for an operator.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::application::events::{
    Event, ReconciliationRequiredEvent, SharedEventBus, SlotBookedEvent, SlotReleasedEvent,
};
use crate::application::services::FacilityFeed;
use crate::domain::account::{CreditRequest, DebitRequest, LedgerEntry, LedgerReference};
use crate::domain::facility::{Facility, Slot};
use crate::domain::{DomainError, DomainResult, ReconciliationRecord, RepositoryProvider};
use crate::support::retry::{retry_with_backoff, RetryConfig};

/// Who is asking. An empty `user_id` means the request was not authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::user("")
    }

    pub(crate) fn require_authenticated(&self) -> DomainResult<&str> {
        let id = self.user_id.trim();
        if id.is_empty() {
            Err(DomainError::Unauthenticated)
        } else {
            Ok(id)
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingReceipt {
    pub slot: Slot,
    pub facility: Facility,
    pub new_balance: i64,
    pub entry: LedgerEntry,
}

#[derive(Debug, Clone)]
pub struct ReleaseReceipt {
    pub slot: Slot,
    pub facility: Facility,
    /// Holder whose booking was cleared
    pub released_holder: String,
}

pub struct ReservationCoordinator {
    shared: Arc<Shared>,
}

/// State a booking task needs after the requesting future is gone.
struct Shared {
    repos: Arc<dyn RepositoryProvider>,
    feed: Arc<FacilityFeed>,
    event_bus: SharedEventBus,
    retry: RetryConfig,
    slot_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl ReservationCoordinator {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        feed: Arc<FacilityFeed>,
        event_bus: SharedEventBus,
        retry: RetryConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                repos,
                feed,
                event_bus,
                retry,
                slot_locks: DashMap::new(),
            }),
        }
    }

    /// Book a slot and charge its rate.
    ///
    /// `expected_rate` is the price the caller saw; a mismatch with the
    /// stored rate is rejected as stale.
    pub async fn book(
        &self,
        caller: &Caller,
        facility_id: &str,
        slot_id: &str,
        expected_rate: Option<i64>,
    ) -> DomainResult<BookingReceipt> {
        let started = Instant::now();

        // Debit, slot commit and reversal run on their own task so that a
        // dropped request cannot stop between the debit and the commit.
        let shared = Arc::clone(&self.shared);
        let (owned_caller, fid, sid) = (caller.clone(), facility_id.to_string(), slot_id.to_string());
        let task = tokio::spawn(async move {
            let result = shared.book_inner(&owned_caller, &fid, &sid, expected_rate).await;
            shared.prune_lock(&fid, &sid);
            result
        });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(DomainError::Storage(format!("booking task failed: {}", e))),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        metrics::counter!("parking_bookings_total", "outcome" => outcome).increment(1);
        metrics::histogram!("parking_booking_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => info!(
                facility_id,
                slot_id,
                user_id = %caller.user_id,
                amount = receipt.entry.amount.abs(),
                new_balance = receipt.new_balance,
                available_slots = receipt.facility.available_slots,
                "Slot booked"
            ),
            Err(e @ DomainError::CompensationFailed { .. }) => {
                error!(facility_id, slot_id, user_id = %caller.user_id, error = %e, "Booking left a debit to reconcile")
            }
            Err(e) => debug!(facility_id, slot_id, user_id = %caller.user_id, outcome = e.code(), "Booking rejected"),
        }
        result
    }

    /// Clear a booking. Allowed for the holder and for administrators.
    /// Nothing is refunded.
    pub async fn release(
        &self,
        caller: &Caller,
        facility_id: &str,
        slot_id: &str,
    ) -> DomainResult<ReleaseReceipt> {
        let result = self.shared.release_inner(caller, facility_id, slot_id).await;
        self.shared.prune_lock(facility_id, slot_id);

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.code(),
        };
        metrics::counter!("parking_releases_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(receipt) => info!(
                facility_id,
                slot_id,
                released_by = %caller.user_id,
                holder = %receipt.released_holder,
                available_slots = receipt.facility.available_slots,
                "Slot released"
            ),
            Err(e) => debug!(facility_id, slot_id, user_id = %caller.user_id, outcome = e.code(), "Release rejected"),
        }
        result
    }
}

impl Shared {
    async fn book_inner(
        &self,
        caller: &Caller,
        facility_id: &str,
        slot_id: &str,
        expected_rate: Option<i64>,
    ) -> DomainResult<BookingReceipt> {
        let user_id = caller.require_authenticated()?;

        let occupancy = self.repos.occupancy();
        let ledger = self.repos.ledger();

        // Unknown ids never get a lock entry.
        let facility = occupancy
            .find_facility(facility_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "Facility",
                field: "id",
                value: facility_id.to_string(),
            })?;
        if occupancy.find_slot(facility_id, slot_id).await?.is_none() {
            return Err(DomainError::NotFound {
                entity: "Slot",
                field: "id",
                value: format!("{}/{}", facility_id, slot_id),
            });
        }

        let lock = self.slot_lock(facility_id, slot_id);
        let _guard = lock.lock().await;
        // Re-read under the lock; the first read only proved the slot exists.
        let slot = occupancy
            .find_slot(facility_id, slot_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "Slot",
                field: "id",
                value: format!("{}/{}", facility_id, slot_id),
            })?;

        if slot.is_booked {
            return Err(DomainError::AlreadyBooked {
                facility_id: facility_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }
        if let Some(rate) = expected_rate {
            if rate != slot.rate {
                return Err(DomainError::Validation(format!(
                    "rate changed: expected {}, current {}",
                    rate, slot.rate
                )));
            }
        }

        let debit = DebitRequest {
            user_id: user_id.to_string(),
            amount: slot.rate,
            description: format!("Booking slot {} at {}", slot.number, facility.name),
            reference: LedgerReference::slot(facility_id, slot_id),
            required_balance: None,
        };
        let receipt = retry_with_backoff(
            &self.retry,
            || ledger.debit(&debit),
            DomainError::is_transient,
            "ledger_debit",
        )
        .await?;

        let commit = retry_with_backoff(
            &self.retry,
            || occupancy.try_book(facility_id, slot_id, user_id),
            DomainError::is_transient,
            "occupancy_try_book",
        )
        .await;

        let commit = match commit {
            Ok(commit) => commit,
            Err(book_err) => {
                return Err(self
                    .compensate(user_id, facility_id, slot_id, &debit, &receipt.entry, book_err)
                    .await)
            }
        };

        self.publish_snapshot(facility_id).await;
        self.event_bus.publish(Event::SlotBooked(SlotBookedEvent {
            facility_id: facility_id.to_string(),
            slot_id: slot_id.to_string(),
            user_id: user_id.to_string(),
            amount: debit.amount,
            new_balance: receipt.new_balance,
            available_slots: commit.facility.available_slots,
            revision: commit.facility.revision,
            timestamp: Utc::now(),
        }));

        Ok(BookingReceipt {
            slot: commit.slot,
            facility: commit.facility,
            new_balance: receipt.new_balance,
            entry: receipt.entry,
        })
    }

    /// Undo a debit whose slot commit failed. Returns the error to report.
    async fn compensate(
        &self,
        user_id: &str,
        facility_id: &str,
        slot_id: &str,
        debit: &DebitRequest,
        debit_entry: &LedgerEntry,
        book_err: DomainError,
    ) -> DomainError {
        warn!(
            facility_id,
            slot_id,
            user_id,
            error = %book_err,
            "Slot commit failed after debit, reversing"
        );

        let reversal = CreditRequest {
            user_id: user_id.to_string(),
            amount: debit.amount,
            description: format!("Reversal: {}", debit.description),
            reference: debit.reference.clone(),
        };
        let credited = retry_with_backoff(
            &self.retry,
            || self.repos.ledger().credit(&reversal),
            DomainError::is_transient,
            "ledger_reversal",
        )
        .await;

        let compensation_err = match credited {
            Ok(_) => {
                metrics::counter!("parking_compensations_total", "outcome" => "reversed").increment(1);
                return book_err;
            }
            Err(e) => e,
        };

        metrics::counter!("parking_compensations_total", "outcome" => "failed").increment(1);
        let record = ReconciliationRecord::new(
            user_id,
            facility_id,
            slot_id,
            debit.amount,
            debit_entry.id.clone(),
            book_err.to_string(),
            compensation_err.to_string(),
        );
        let logged = retry_with_backoff(
            &self.retry,
            || self.repos.reconciliation().record(&record),
            DomainError::is_transient,
            "reconciliation_record",
        )
        .await;
        if let Err(e) = logged {
            error!(
                record_id = %record.id,
                user_id,
                amount = debit.amount,
                error = %e,
                "Reconciliation record could not be persisted"
            );
        }

        self.event_bus
            .publish(Event::ReconciliationRequired(ReconciliationRequiredEvent {
                record_id: record.id.to_string(),
                user_id: user_id.to_string(),
                facility_id: facility_id.to_string(),
                slot_id: slot_id.to_string(),
                amount: debit.amount,
                timestamp: Utc::now(),
            }));

        DomainError::CompensationFailed {
            user_id: user_id.to_string(),
            facility_id: facility_id.to_string(),
            slot_id: slot_id.to_string(),
            reason: compensation_err.to_string(),
        }
    }

    async fn release_inner(
        &self,
        caller: &Caller,
        facility_id: &str,
        slot_id: &str,
    ) -> DomainResult<ReleaseReceipt> {
        let user_id = caller.require_authenticated()?;

        let occupancy = self.repos.occupancy();
        if occupancy.find_slot(facility_id, slot_id).await?.is_none() {
            return Err(DomainError::NotFound {
                entity: "Slot",
                field: "id",
                value: format!("{}/{}", facility_id, slot_id),
            });
        }

        let lock = self.slot_lock(facility_id, slot_id);
        let _guard = lock.lock().await;
        let slot = occupancy
            .find_slot(facility_id, slot_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "Slot",
                field: "id",
                value: format!("{}/{}", facility_id, slot_id),
            })?;

        let holder = match slot.booked_by.as_deref() {
            Some(holder) if slot.is_booked => holder.to_string(),
            _ => {
                return Err(DomainError::NotBooked {
                    facility_id: facility_id.to_string(),
                    slot_id: slot_id.to_string(),
                })
            }
        };
        if holder != user_id && !caller.is_admin {
            return Err(DomainError::NotHolder {
                facility_id: facility_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }

        let commit = retry_with_backoff(
            &self.retry,
            || occupancy.release(facility_id, slot_id, &holder),
            DomainError::is_transient,
            "occupancy_release",
        )
        .await?;

        self.publish_snapshot(facility_id).await;
        self.event_bus.publish(Event::SlotReleased(SlotReleasedEvent {
            facility_id: facility_id.to_string(),
            slot_id: slot_id.to_string(),
            user_id: holder.clone(),
            released_by: user_id.to_string(),
            available_slots: commit.facility.available_slots,
            revision: commit.facility.revision,
            timestamp: Utc::now(),
        }));

        Ok(ReleaseReceipt {
            slot: commit.slot,
            facility: commit.facility,
            released_holder: holder,
        })
    }

    /// Push the committed state to live subscribers. The commit already
    /// happened, so a failed read is only logged.
    async fn publish_snapshot(&self, facility_id: &str) {
        match self.repos.occupancy().snapshot(facility_id).await {
            Ok(snapshot) => {
                self.feed.publish(snapshot);
            }
            Err(e) => warn!(facility_id, error = %e, "Snapshot after commit failed"),
        }
    }

    fn slot_lock(&self, facility_id: &str, slot_id: &str) -> Arc<Mutex<()>> {
        self.slot_locks
            .entry((facility_id.to_string(), slot_id.to_string()))
            .or_default()
            .clone()
    }

    /// Drop the lock of a slot nobody is waiting on.
    fn prune_lock(&self, facility_id: &str, slot_id: &str) {
        self.slot_locks
            .remove_if(&(facility_id.to_string(), slot_id.to_string()), |_, lock| {
                Arc::strong_count(lock) == 1
            });
    }
}
