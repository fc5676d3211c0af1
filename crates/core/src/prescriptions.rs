//! Prescription ledger operations.
//!
//! Creation snapshots catalog prices into exam lines and mints the
//! display number from the injected sequence generator; cancellation is
//! a PENDING-only transition restricted to the ordering doctor or an
//! administrator.

use crate::domain::Prescription;
use crate::error::{CoreError, CoreResult};
use crate::sequence::SequenceGenerator;
use crate::store::Ledger;
use chrono::Utc;
use examflow_types::{Actor, ExamLineStatus, PrescriptionStatus, Role};
use std::sync::Arc;
use uuid::Uuid;

/// Service for authoring and querying prescriptions.
#[derive(Clone)]
pub struct PrescriptionService {
    ledger: Arc<Ledger>,
    sequences: Arc<dyn SequenceGenerator>,
}

impl PrescriptionService {
    pub fn new(ledger: Arc<Ledger>, sequences: Arc<dyn SequenceGenerator>) -> Self {
        Self { ledger, sequences }
    }

    /// Create a new PENDING prescription for `patient_id`.
    ///
    /// Exam prices are snapshotted from the catalog at this moment; the
    /// prescription total is their sum and never changes afterwards.
    ///
    /// # Errors
    /// - `Forbidden` if the actor is not a doctor (or admin)
    /// - `NotFound` if the patient is unknown
    /// - `InvalidInput` if no exam ids are given, or any id is unknown
    ///   or inactive
    pub fn create(
        &self,
        patient_id: Uuid,
        exam_ids: &[Uuid],
        notes: Option<String>,
        actor: Actor,
    ) -> CoreResult<Prescription> {
        if !matches!(actor.role, Role::Doctor | Role::Admin) {
            return Err(CoreError::Forbidden(
                "only doctors can create prescriptions".into(),
            ));
        }

        if self.ledger.patient(patient_id).is_none() {
            return Err(CoreError::not_found("patient", patient_id));
        }

        if exam_ids.is_empty() {
            return Err(CoreError::InvalidInput("no exams selected".into()));
        }

        let entries = self.ledger.active_catalog_entries(exam_ids);
        if entries.len() != exam_ids.len() {
            return Err(CoreError::InvalidInput(
                "one or more exams are unknown or inactive".into(),
            ));
        }

        let now = Utc::now();
        let number = self.sequences.prescription_number(now);
        let prescription = Prescription::new(number, patient_id, actor.id, &entries, notes, now);

        tracing::info!(
            prescription_id = %prescription.id,
            number = %prescription.number,
            doctor_id = %actor.id,
            total = prescription.total_amount,
            "prescription created"
        );

        self.ledger.insert_prescription(prescription.clone());
        Ok(prescription)
    }

    /// Cancel a PENDING prescription.
    ///
    /// Only the ordering doctor or an administrator may cancel. Exam
    /// lines revert to PENDING; they were never billed.
    pub async fn cancel(&self, prescription_id: Uuid, actor: Actor) -> CoreResult<Prescription> {
        let _guard = self.ledger.lock_prescription(prescription_id).await;

        let mut prescription = self
            .ledger
            .prescription(prescription_id)
            .ok_or_else(|| CoreError::not_found("prescription", prescription_id))?;

        if prescription.status != PrescriptionStatus::Pending {
            return Err(CoreError::invalid_state(
                "prescription",
                "PENDING",
                prescription.status,
            ));
        }

        if actor.role != Role::Admin && prescription.doctor_id != actor.id {
            return Err(CoreError::Forbidden(
                "only the ordering doctor or an administrator can cancel".into(),
            ));
        }

        prescription.status = PrescriptionStatus::Cancelled;
        prescription.updated_at = Utc::now();
        for line in &mut prescription.lines {
            line.status = ExamLineStatus::Pending;
        }

        self.ledger.update_prescription(prescription.clone());
        tracing::info!(prescription_id = %prescription_id, "prescription cancelled");
        Ok(prescription)
    }

    pub fn get(&self, prescription_id: Uuid) -> CoreResult<Prescription> {
        self.ledger
            .prescription(prescription_id)
            .ok_or_else(|| CoreError::not_found("prescription", prescription_id))
    }

    pub fn get_by_number(&self, number: &str) -> CoreResult<Prescription> {
        self.ledger
            .prescription_by_number(number)
            .ok_or_else(|| CoreError::not_found("prescription", number))
    }

    /// Cashier queue: prescriptions awaiting payment, oldest first.
    pub fn pending(&self) -> Vec<Prescription> {
        self.ledger.pending_prescriptions()
    }
}
