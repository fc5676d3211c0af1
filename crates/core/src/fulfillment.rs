//! Exam fulfillment at the service desks.
//!
//! Radiology and laboratory staff scan a printed receipt, verify the
//! payment against live state, and walk each exam line through
//! PAID -> IN_PROGRESS -> COMPLETED. The scanned token itself is never
//! trusted for status: it only names the payment, and everything else is
//! re-read from the ledger.

use crate::domain::{ExamLine, Patient, Prescription};
use crate::error::{CoreError, CoreResult};
use crate::store::Ledger;
use chrono::Utc;
use examflow_types::{
    Actor, ExamCategory, ExamLineStatus, PaymentStatus, PrescriptionStatus, Role,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Live verification result handed to a service desk after a scan.
#[derive(Clone, Debug, Serialize)]
pub struct ScanResult {
    pub payment_id: Uuid,
    pub payment_number: String,
    pub prescription_id: Uuid,
    pub prescription_number: String,
    pub patient: Patient,
    /// The scanning desk's exams only, with their live statuses.
    pub exams: Vec<ExamLine>,
}

/// Outcome of completing an exam line.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionResult {
    pub line: ExamLine,
    /// True when this completion finished the whole prescription.
    pub prescription_completed: bool,
}

/// Service for receipt verification and exam line transitions.
#[derive(Clone)]
pub struct FulfillmentService {
    ledger: Arc<Ledger>,
}

impl FulfillmentService {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Decode a scanned receipt and verify it against live state.
    ///
    /// The embedded statuses are ignored; the payment named by the token
    /// must exist and be SUCCESS, and the result carries only the exam
    /// lines of the scanning desk's category, read fresh from storage.
    pub fn scan_and_verify(&self, raw_token: &str, actor: Actor) -> CoreResult<ScanResult> {
        let category = self.desk_category(actor)?;

        let token = examflow_qr::decode(raw_token)
            .map_err(|e| CoreError::MalformedToken(e.to_string()))?;

        let payment = self
            .ledger
            .payment(token.payment_id)
            .ok_or(CoreError::PaymentNotFound(token.payment_id))?;
        if payment.status != PaymentStatus::Success {
            return Err(CoreError::PaymentNotSuccessful {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        let prescription = self
            .ledger
            .prescription(payment.prescription_id)
            .ok_or_else(|| CoreError::not_found("prescription", payment.prescription_id))?;
        let patient = self
            .ledger
            .patient(prescription.patient_id)
            .ok_or_else(|| CoreError::not_found("patient", prescription.patient_id))?;

        let exams: Vec<ExamLine> = prescription
            .lines
            .iter()
            .filter(|l| l.category == category)
            .cloned()
            .collect();
        if exams.is_empty() {
            return Err(CoreError::NoRelevantExams(category));
        }

        tracing::info!(
            payment_id = %payment.id,
            prescription_id = %prescription.id,
            category = %category,
            exams = exams.len(),
            "receipt verified at service desk"
        );

        Ok(ScanResult {
            payment_id: payment.id,
            payment_number: payment.number,
            prescription_id: prescription.id,
            prescription_number: prescription.number,
            patient,
            exams,
        })
    }

    /// Take a PAID exam line into IN_PROGRESS, claiming it for the actor.
    ///
    /// The first line started moves the whole prescription to
    /// IN_PROGRESS.
    pub async fn start_exam(&self, line_id: Uuid, actor: Actor) -> CoreResult<ExamLine> {
        let category = self.desk_category(actor)?;

        let (prescription_id, _) = self
            .ledger
            .find_line(line_id)
            .ok_or_else(|| CoreError::not_found("exam line", line_id))?;
        let _guard = self.ledger.lock_prescription(prescription_id).await;

        let mut prescription = self
            .ledger
            .prescription(prescription_id)
            .ok_or_else(|| CoreError::not_found("prescription", prescription_id))?;
        let line = prescription
            .line_mut(line_id)
            .ok_or_else(|| CoreError::not_found("exam line", line_id))?;

        if line.category != category {
            return Err(CoreError::Forbidden(format!(
                "exam belongs to the {} desk",
                line.category
            )));
        }
        if line.status != ExamLineStatus::Paid {
            return Err(CoreError::invalid_state("exam line", "PAID", line.status));
        }

        line.status = ExamLineStatus::InProgress;
        line.performed_by = Some(actor.id);
        let started = line.clone();

        if prescription.status == PrescriptionStatus::Paid {
            prescription.status = PrescriptionStatus::InProgress;
        }
        prescription.updated_at = Utc::now();
        self.ledger.update_prescription(prescription);

        tracing::info!(line_id = %line_id, performer = %actor.id, "exam started");
        Ok(started)
    }

    /// Complete an IN_PROGRESS exam line.
    ///
    /// Only the performer who started it (or an administrator) may
    /// complete it. Completing the last open line finishes the
    /// prescription.
    pub async fn complete_exam(
        &self,
        line_id: Uuid,
        notes: Option<String>,
        actor: Actor,
    ) -> CoreResult<CompletionResult> {
        let (prescription_id, _) = self
            .ledger
            .find_line(line_id)
            .ok_or_else(|| CoreError::not_found("exam line", line_id))?;
        let _guard = self.ledger.lock_prescription(prescription_id).await;

        let mut prescription = self
            .ledger
            .prescription(prescription_id)
            .ok_or_else(|| CoreError::not_found("prescription", prescription_id))?;
        let line = prescription
            .line_mut(line_id)
            .ok_or_else(|| CoreError::not_found("exam line", line_id))?;

        if line.status != ExamLineStatus::InProgress {
            return Err(CoreError::invalid_state(
                "exam line",
                "IN_PROGRESS",
                line.status,
            ));
        }
        if actor.role != Role::Admin && line.performed_by != Some(actor.id) {
            return Err(CoreError::Forbidden(
                "only the performer who started this exam can complete it".into(),
            ));
        }

        let now = Utc::now();
        line.status = ExamLineStatus::Completed;
        line.performed_at = Some(now);
        if notes.is_some() {
            line.notes = notes;
        }
        let completed = line.clone();

        let prescription_completed = prescription.all_lines_completed();
        if prescription_completed {
            prescription.status = PrescriptionStatus::Completed;
        }
        prescription.updated_at = now;
        self.ledger.update_prescription(prescription);

        tracing::info!(
            line_id = %line_id,
            prescription_completed,
            "exam completed"
        );
        Ok(CompletionResult {
            line: completed,
            prescription_completed,
        })
    }

    /// The desk's work queue: PAID lines of the actor's category, oldest
    /// prescription first.
    pub fn pending_queue(&self, actor: Actor) -> CoreResult<Vec<(Prescription, ExamLine)>> {
        let category = self.desk_category(actor)?;
        Ok(self.ledger.paid_lines_in_category(category))
    }

    /// Every line the actor has claimed, any status.
    pub fn my_exams(&self, actor: Actor) -> Vec<(Prescription, ExamLine)> {
        self.ledger.lines_by_performer(actor.id, None)
    }

    /// Lines the actor currently has open.
    pub fn in_progress(&self, actor: Actor) -> Vec<(Prescription, ExamLine)> {
        self.ledger
            .lines_by_performer(actor.id, Some(ExamLineStatus::InProgress))
    }

    fn desk_category(&self, actor: Actor) -> CoreResult<ExamCategory> {
        actor.role.service_category().ok_or_else(|| {
            CoreError::Forbidden("only radiology and laboratory staff can fulfill exams".into())
        })
    }
}
