//! In-memory store implementations
//!
//! Each aggregate lives in one `DashMap` entry, and every mutation happens
//! while holding that entry's shard lock. That gives the same atomicity as
//! the SQL stores: a slot flag never changes without its facility counter,
//! and a balance never changes without its ledger entry.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::account::{
    check_debit, validate_amount, BalanceLedger, CreditRequest, DebitRequest, Identity,
    LedgerEntry, LedgerReceipt, ProfileUpdate, UserAccount,
};
use crate::domain::facility::{Facility, FacilitySnapshot, OccupancyStore, Slot, SlotCommit};
use crate::domain::reconciliation::{ReconciliationLog, ReconciliationRecord};
use crate::domain::{DomainError, DomainResult, RepositoryProvider};

fn facility_not_found(facility_id: &str) -> DomainError {
    DomainError::NotFound {
        entity: "Facility",
        field: "id",
        value: facility_id.to_string(),
    }
}

fn slot_not_found(facility_id: &str, slot_id: &str) -> DomainError {
    DomainError::NotFound {
        entity: "Slot",
        field: "id",
        value: format!("{}/{}", facility_id, slot_id),
    }
}

fn account_not_found(user_id: &str) -> DomainError {
    DomainError::NotFound {
        entity: "UserAccount",
        field: "id",
        value: user_id.to_string(),
    }
}

/// Validate a facility and its slots before provisioning and derive the
/// counters. Shared with the SQL store.
pub(crate) fn prepare_provision(
    mut facility: Facility,
    mut slots: Vec<Slot>,
) -> DomainResult<(Facility, Vec<Slot>)> {
    if facility.id.trim().is_empty() || facility.name.trim().is_empty() {
        return Err(DomainError::Validation(
            "facility id and name are required".into(),
        ));
    }
    if facility.base_rate <= 0 {
        return Err(DomainError::Validation("base rate must be positive".into()));
    }
    if let Some(location) = &facility.location {
        if !location.is_valid() {
            return Err(DomainError::Validation("coordinate out of range".into()));
        }
    }

    let mut seen = HashSet::new();
    for slot in &mut slots {
        if slot.id.trim().is_empty() {
            return Err(DomainError::Validation("slot id is required".into()));
        }
        if !seen.insert(slot.id.clone()) {
            return Err(DomainError::Validation(format!(
                "duplicate slot id {}",
                slot.id
            )));
        }
        if slot.rate <= 0 {
            return Err(DomainError::Validation(format!(
                "slot {} rate must be positive",
                slot.id
            )));
        }
        slot.facility_id = facility.id.clone();
    }

    if !slots.is_empty() {
        facility.capacity = slots.len() as u32;
    }
    let booked = slots.iter().filter(|s| s.is_booked).count() as u32;
    facility.available_slots = facility.capacity.saturating_sub(booked);
    Ok((facility, slots))
}

struct FacilityRecord {
    facility: Facility,
    slots: Vec<Slot>,
}

impl FacilityRecord {
    fn snapshot(&self) -> FacilitySnapshot {
        FacilitySnapshot {
            facility: self.facility.clone(),
            slots: self.slots.clone(),
        }
    }
}

/// In-memory occupancy store for development and testing
#[derive(Default)]
pub struct InMemoryOccupancyStore {
    facilities: DashMap<String, FacilityRecord>,
}

impl InMemoryOccupancyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OccupancyStore for InMemoryOccupancyStore {
    async fn provision_facility(&self, facility: Facility, slots: Vec<Slot>) -> DomainResult<Facility> {
        let (facility, slots) = prepare_provision(facility, slots)?;
        match self.facilities.entry(facility.id.clone()) {
            Entry::Occupied(_) => Err(DomainError::Validation(format!(
                "facility {} already exists",
                facility.id
            ))),
            Entry::Vacant(v) => {
                v.insert(FacilityRecord {
                    facility: facility.clone(),
                    slots,
                });
                Ok(facility)
            }
        }
    }

    async fn list_facilities(&self) -> DomainResult<Vec<Facility>> {
        let mut facilities: Vec<Facility> = self
            .facilities
            .iter()
            .map(|r| r.facility.clone())
            .collect();
        facilities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(facilities)
    }

    async fn find_facility(&self, facility_id: &str) -> DomainResult<Option<Facility>> {
        Ok(self.facilities.get(facility_id).map(|r| r.facility.clone()))
    }

    async fn find_slot(&self, facility_id: &str, slot_id: &str) -> DomainResult<Option<Slot>> {
        Ok(self
            .facilities
            .get(facility_id)
            .and_then(|r| r.slots.iter().find(|s| s.id == slot_id).cloned()))
    }

    async fn snapshot(&self, facility_id: &str) -> DomainResult<FacilitySnapshot> {
        self.facilities
            .get(facility_id)
            .map(|r| r.snapshot())
            .ok_or_else(|| facility_not_found(facility_id))
    }

    async fn try_book(&self, facility_id: &str, slot_id: &str, holder: &str) -> DomainResult<SlotCommit> {
        let mut record = self
            .facilities
            .get_mut(facility_id)
            .ok_or_else(|| facility_not_found(facility_id))?;
        let record = &mut *record;

        let slot = record
            .slots
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| slot_not_found(facility_id, slot_id))?;

        if !slot.book(holder, Utc::now()) {
            return Err(DomainError::AlreadyBooked {
                facility_id: facility_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }
        let slot = slot.clone();

        record.facility.available_slots = record.facility.available_slots.saturating_sub(1);
        record.facility.revision += 1;

        Ok(SlotCommit {
            slot,
            facility: record.facility.clone(),
        })
    }

    async fn release(&self, facility_id: &str, slot_id: &str, holder: &str) -> DomainResult<SlotCommit> {
        let mut record = self
            .facilities
            .get_mut(facility_id)
            .ok_or_else(|| facility_not_found(facility_id))?;
        let record = &mut *record;

        let slot = record
            .slots
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| slot_not_found(facility_id, slot_id))?;

        if !slot.is_booked {
            return Err(DomainError::NotBooked {
                facility_id: facility_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }
        if !slot.is_held_by(holder) {
            return Err(DomainError::NotHolder {
                facility_id: facility_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }
        slot.vacate();
        let slot = slot.clone();

        record.facility.available_slots =
            (record.facility.available_slots + 1).min(record.facility.capacity);
        record.facility.revision += 1;

        Ok(SlotCommit {
            slot,
            facility: record.facility.clone(),
        })
    }
}

struct AccountRecord {
    account: UserAccount,
    /// Oldest first
    entries: Vec<LedgerEntry>,
}

/// In-memory balance ledger for development and testing
pub struct InMemoryBalanceLedger {
    accounts: DashMap<String, AccountRecord>,
    floor: i64,
}

impl InMemoryBalanceLedger {
    pub fn new(floor: i64) -> Self {
        Self {
            accounts: DashMap::new(),
            floor,
        }
    }

    /// Overwrite a balance directly. Test fixtures only; no entry is written.
    #[cfg(test)]
    pub fn set_balance(&self, user_id: &str, balance: i64) {
        if let Some(mut record) = self.accounts.get_mut(user_id) {
            record.account.balance = balance;
        }
    }
}

impl Default for InMemoryBalanceLedger {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl BalanceLedger for InMemoryBalanceLedger {
    async fn ensure_account(&self, identity: &Identity) -> DomainResult<UserAccount> {
        if identity.user_id.trim().is_empty() {
            return Err(DomainError::Unauthenticated);
        }
        let mut record = self
            .accounts
            .entry(identity.user_id.clone())
            .or_insert_with(|| AccountRecord {
                account: UserAccount::from_identity(identity),
                entries: Vec::new(),
            });
        record.account.last_login_at = Some(Utc::now());
        Ok(record.account.clone())
    }

    async fn get_account(&self, user_id: &str) -> DomainResult<Option<UserAccount>> {
        Ok(self.accounts.get(user_id).map(|r| r.account.clone()))
    }

    async fn get_balance(&self, user_id: &str) -> DomainResult<i64> {
        self.accounts
            .get(user_id)
            .map(|r| r.account.balance)
            .ok_or_else(|| account_not_found(user_id))
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> DomainResult<UserAccount> {
        let mut record = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| account_not_found(user_id))?;
        record.account.apply_profile(update);
        Ok(record.account.clone())
    }

    async fn debit(&self, request: &DebitRequest) -> DomainResult<LedgerReceipt> {
        validate_amount(request.amount)?;
        let mut record = self
            .accounts
            .get_mut(&request.user_id)
            .ok_or_else(|| account_not_found(&request.user_id))?;

        check_debit(record.account.balance, request, self.floor)?;

        let entry = LedgerEntry::new(
            &request.user_id,
            -request.amount,
            request.description.clone(),
            request.reference.clone(),
        );
        record.account.balance -= request.amount;
        record.entries.push(entry.clone());

        Ok(LedgerReceipt {
            entry,
            new_balance: record.account.balance,
        })
    }

    async fn credit(&self, request: &CreditRequest) -> DomainResult<LedgerReceipt> {
        validate_amount(request.amount)?;
        let mut record = self
            .accounts
            .get_mut(&request.user_id)
            .ok_or_else(|| account_not_found(&request.user_id))?;

        let balance = record
            .account
            .balance
            .checked_add(request.amount)
            .ok_or_else(|| DomainError::Validation("balance overflow".into()))?;

        let entry = LedgerEntry::new(
            &request.user_id,
            request.amount,
            request.description.clone(),
            request.reference.clone(),
        );
        record.account.balance = balance;
        record.entries.push(entry.clone());

        Ok(LedgerReceipt {
            entry,
            new_balance: balance,
        })
    }

    async fn list_transactions(&self, user_id: &str, limit: Option<u64>) -> DomainResult<Vec<LedgerEntry>> {
        let record = self
            .accounts
            .get(user_id)
            .ok_or_else(|| account_not_found(user_id))?;
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        Ok(record.entries.iter().rev().take(limit).cloned().collect())
    }
}

/// In-memory reconciliation log
#[derive(Default)]
pub struct InMemoryReconciliationLog {
    records: DashMap<Uuid, ReconciliationRecord>,
}

impl InMemoryReconciliationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationLog for InMemoryReconciliationLog {
    async fn record(&self, record: &ReconciliationRecord) -> DomainResult<()> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<ReconciliationRecord>> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

/// Repository provider over the in-memory stores.
///
/// `from_parts` lets tests swap a single store for a wrapper.
pub struct InMemoryRepositoryProvider {
    occupancy: Arc<dyn OccupancyStore>,
    ledger: Arc<dyn BalanceLedger>,
    reconciliation: Arc<dyn ReconciliationLog>,
}

impl InMemoryRepositoryProvider {
    pub fn new(ledger_floor: i64) -> Self {
        Self {
            occupancy: Arc::new(InMemoryOccupancyStore::new()),
            ledger: Arc::new(InMemoryBalanceLedger::new(ledger_floor)),
            reconciliation: Arc::new(InMemoryReconciliationLog::new()),
        }
    }

    pub fn from_parts(
        occupancy: Arc<dyn OccupancyStore>,
        ledger: Arc<dyn BalanceLedger>,
        reconciliation: Arc<dyn ReconciliationLog>,
    ) -> Self {
        Self {
            occupancy,
            ledger,
            reconciliation,
        }
    }
}

impl RepositoryProvider for InMemoryRepositoryProvider {
    fn occupancy(&self) -> &dyn OccupancyStore {
        self.occupancy.as_ref()
    }

    fn ledger(&self) -> &dyn BalanceLedger {
        self.ledger.as_ref()
    }

    fn reconciliation(&self) -> &dyn ReconciliationLog {
        self.reconciliation.as_ref()
    }
}
