//! The in-memory ledger.
//!
//! Typed maps per entity plus the named query functions the services
//! consume — each query returns a fixed projection, so what each
//! operation reads is auditable from its signature.
//!
//! ## Locking discipline
//!
//! Every multi-row mutation (payment success, cancellation, exam line
//! transitions, mobile money reconciliation) must run under the owning
//! prescription's lock, obtained from [`Ledger::lock_prescription`].
//! That lock is the row-level serialization point the state machines
//! rely on: whichever caller wins it observes the true prescription
//! status and every loser re-reads state after the winner commits.
//! Unrelated prescriptions use distinct locks and never contend. The
//! inner map locks are held only for individual reads/writes and never
//! across an `.await`.

use crate::domain::{CatalogEntry, ExamLine, MomoTransaction, Patient, Payment, Prescription};
use chrono::{DateTime, Utc};
use examflow_types::{ExamCategory, ExamLineStatus, PrescriptionStatus, TransactionStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Shared in-memory store for all ledger entities.
#[derive(Debug, Default)]
pub struct Ledger {
    patients: RwLock<HashMap<Uuid, Patient>>,
    catalog: RwLock<HashMap<Uuid, CatalogEntry>>,
    prescriptions: RwLock<HashMap<Uuid, Prescription>>,
    prescription_numbers: RwLock<HashMap<String, Uuid>>,
    payments: RwLock<HashMap<Uuid, Payment>>,
    transactions: RwLock<HashMap<Uuid, MomoTransaction>>,
    txn_by_provider_ref: RwLock<HashMap<String, Uuid>>,
    txn_by_payment: RwLock<HashMap<Uuid, Uuid>>,
    row_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the serialization lock for one prescription.
    ///
    /// The guard may be held across adapter round trips; concurrent
    /// callers touching the same prescription queue behind it.
    pub async fn lock_prescription(&self, prescription_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .row_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry(prescription_id)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    // ---- patients -------------------------------------------------------

    pub fn insert_patient(&self, patient: Patient) {
        write(&self.patients).insert(patient.id, patient);
    }

    pub fn patient(&self, id: Uuid) -> Option<Patient> {
        read(&self.patients).get(&id).cloned()
    }

    // ---- exam catalog ---------------------------------------------------

    pub fn insert_catalog_entry(&self, entry: CatalogEntry) {
        write(&self.catalog).insert(entry.id, entry);
    }

    /// Active catalog entries for the given ids, in input order.
    /// Inactive or unknown ids are simply absent from the result.
    pub fn active_catalog_entries(&self, ids: &[Uuid]) -> Vec<CatalogEntry> {
        let catalog = read(&self.catalog);
        ids.iter()
            .filter_map(|id| catalog.get(id))
            .filter(|e| e.active)
            .cloned()
            .collect()
    }

    // ---- prescriptions --------------------------------------------------

    pub fn insert_prescription(&self, prescription: Prescription) {
        write(&self.prescription_numbers).insert(prescription.number.clone(), prescription.id);
        write(&self.prescriptions).insert(prescription.id, prescription);
    }

    pub fn prescription(&self, id: Uuid) -> Option<Prescription> {
        read(&self.prescriptions).get(&id).cloned()
    }

    pub fn prescription_by_number(&self, number: &str) -> Option<Prescription> {
        let id = *read(&self.prescription_numbers).get(number)?;
        self.prescription(id)
    }

    /// Replace a prescription under its existing id.
    ///
    /// Only call while holding the prescription's lock.
    pub fn update_prescription(&self, prescription: Prescription) {
        write(&self.prescriptions).insert(prescription.id, prescription);
    }

    /// Cashier queue: PENDING prescriptions, oldest first.
    pub fn pending_prescriptions(&self) -> Vec<Prescription> {
        let mut pending: Vec<Prescription> = read(&self.prescriptions)
            .values()
            .filter(|p| p.status == PrescriptionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    /// Locate an exam line together with its owning prescription id.
    pub fn find_line(&self, line_id: Uuid) -> Option<(Uuid, ExamLine)> {
        read(&self.prescriptions)
            .values()
            .find_map(|p| p.line(line_id).map(|l| (p.id, l.clone())))
    }

    /// Service desk queue: PAID lines of one category, oldest
    /// prescription first.
    pub fn paid_lines_in_category(&self, category: ExamCategory) -> Vec<(Prescription, ExamLine)> {
        let mut rows: Vec<(Prescription, ExamLine)> = Vec::new();
        for prescription in read(&self.prescriptions).values() {
            for line in &prescription.lines {
                if line.category == category && line.status == ExamLineStatus::Paid {
                    rows.push((prescription.clone(), line.clone()));
                }
            }
        }
        rows.sort_by_key(|(p, _)| p.created_at);
        rows
    }

    /// Lines a performer has picked up, optionally filtered by status.
    pub fn lines_by_performer(
        &self,
        performer_id: Uuid,
        status: Option<ExamLineStatus>,
    ) -> Vec<(Prescription, ExamLine)> {
        let mut rows: Vec<(Prescription, ExamLine)> = Vec::new();
        for prescription in read(&self.prescriptions).values() {
            for line in &prescription.lines {
                if line.performed_by == Some(performer_id)
                    && status.map_or(true, |s| line.status == s)
                {
                    rows.push((prescription.clone(), line.clone()));
                }
            }
        }
        rows.sort_by_key(|(p, _)| p.created_at);
        rows
    }

    // ---- payments -------------------------------------------------------

    pub fn insert_payment(&self, payment: Payment) {
        write(&self.payments).insert(payment.id, payment);
    }

    pub fn payment(&self, id: Uuid) -> Option<Payment> {
        read(&self.payments).get(&id).cloned()
    }

    /// Only call while holding the owning prescription's lock.
    pub fn update_payment(&self, payment: Payment) {
        write(&self.payments).insert(payment.id, payment);
    }

    /// Audit trail: every payment attempt against a prescription.
    pub fn payments_for_prescription(&self, prescription_id: Uuid) -> Vec<Payment> {
        let mut rows: Vec<Payment> = read(&self.payments)
            .values()
            .filter(|p| p.prescription_id == prescription_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        rows
    }

    // ---- mobile money transactions --------------------------------------

    pub fn insert_transaction(&self, txn: MomoTransaction) {
        write(&self.txn_by_payment).insert(txn.payment_id, txn.id);
        write(&self.transactions).insert(txn.id, txn);
    }

    pub fn transaction(&self, id: Uuid) -> Option<MomoTransaction> {
        read(&self.transactions).get(&id).cloned()
    }

    pub fn transaction_for_payment(&self, payment_id: Uuid) -> Option<MomoTransaction> {
        let id = *read(&self.txn_by_payment).get(&payment_id)?;
        self.transaction(id)
    }

    pub fn transaction_by_provider_ref(&self, provider_txn_id: &str) -> Option<MomoTransaction> {
        let id = *read(&self.txn_by_provider_ref).get(provider_txn_id)?;
        self.transaction(id)
    }

    /// Only call while holding the owning prescription's lock. Keeps the
    /// provider reference index in step.
    pub fn update_transaction(&self, txn: MomoTransaction) {
        if let Some(provider_ref) = &txn.provider_txn_id {
            write(&self.txn_by_provider_ref).insert(provider_ref.clone(), txn.id);
        }
        write(&self.transactions).insert(txn.id, txn);
    }

    /// Operational alert query: transactions still PROCESSING older than
    /// `cutoff`. These are never auto-failed.
    pub fn stuck_transactions(&self, cutoff: DateTime<Utc>) -> Vec<MomoTransaction> {
        let mut rows: Vec<MomoTransaction> = read(&self.transactions)
            .values()
            .filter(|t| t.status == TransactionStatus::Processing && t.created_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.created_at);
        rows
    }
}
