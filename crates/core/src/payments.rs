//! Cashier-side payment recording.
//!
//! Cash and card settle synchronously at the desk: one call takes the
//! prescription from PENDING to PAID and attaches the QR receipt. Mobile
//! money goes through the reconciliation service instead.

use crate::domain::{Payment, Prescription};
use crate::error::{CoreError, CoreResult};
use crate::sequence::SequenceGenerator;
use crate::store::Ledger;
use chrono::{DateTime, Utc};
use examflow_qr::{ReceiptToken, TokenExamLine, TokenPatient, TOKEN_TYPE, TOKEN_VERSION};
use examflow_types::{Actor, PaymentMethod, PaymentStatus, PrescriptionStatus, Role};
use std::sync::Arc;
use uuid::Uuid;

/// Build and attach the QR receipt for a successful payment.
///
/// Call after the prescription has been marked PAID so the embedded line
/// statuses reflect what the scanner will see. Sets `qr_token`,
/// `qr_image`, and `paid_at` on the payment.
pub(crate) fn attach_receipt(
    ledger: &Ledger,
    payment: &mut Payment,
    prescription: &Prescription,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let patient = ledger
        .patient(prescription.patient_id)
        .ok_or_else(|| CoreError::not_found("patient", prescription.patient_id))?;

    let token = ReceiptToken {
        token_type: TOKEN_TYPE.to_string(),
        version: TOKEN_VERSION.to_string(),
        payment_id: payment.id,
        payment_number: payment.number.clone(),
        prescription_id: prescription.id,
        prescription_number: prescription.number.clone(),
        patient: TokenPatient {
            id: patient.id,
            number: patient.number.clone(),
            name: patient.display_name(),
        },
        amount: payment.amount,
        exams: prescription
            .lines
            .iter()
            .map(|line| TokenExamLine {
                id: line.id,
                code: line.code.clone(),
                name: line.name.clone(),
                category: line.category,
                status: line.status,
            })
            .collect(),
        paid_at: now,
        generated_at: now,
    };

    let canonical = token.encode()?;
    payment.qr_image = Some(examflow_qr::render_svg(&canonical)?);
    payment.qr_token = Some(canonical);
    payment.paid_at = Some(now);
    Ok(())
}

/// Service for desk payments and payment reads.
#[derive(Clone)]
pub struct PaymentService {
    ledger: Arc<Ledger>,
    sequences: Arc<dyn SequenceGenerator>,
}

impl PaymentService {
    pub fn new(ledger: Arc<Ledger>, sequences: Arc<dyn SequenceGenerator>) -> Self {
        Self { ledger, sequences }
    }

    /// Record a synchronous cash or card payment for a prescription.
    ///
    /// Runs under the prescription lock: exactly one caller can take the
    /// prescription from PENDING to PAID. The payment always covers the
    /// full prescription total.
    ///
    /// # Errors
    /// - `Forbidden` if the actor is not a cashier (or admin)
    /// - `InvalidInput` for `MOBILE_MONEY` (use the reconciliation flow)
    /// - `NotFound` if the prescription is unknown
    /// - `InvalidState` if the prescription is not PENDING
    pub async fn record(
        &self,
        prescription_id: Uuid,
        method: PaymentMethod,
        actor: Actor,
    ) -> CoreResult<Payment> {
        if !matches!(actor.role, Role::Cashier | Role::Admin) {
            return Err(CoreError::Forbidden(
                "only cashiers can record payments".into(),
            ));
        }
        if method == PaymentMethod::MobileMoney {
            return Err(CoreError::InvalidInput(
                "mobile money payments must be initiated through the reconciliation flow".into(),
            ));
        }

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

        let now = Utc::now();
        let mut payment = Payment::new(
            self.sequences.payment_number(now),
            prescription.id,
            prescription.total_amount,
            method,
            PaymentStatus::Success,
            actor.id,
            now,
        );

        prescription.mark_paid(now);
        attach_receipt(&self.ledger, &mut payment, &prescription, now)?;

        self.ledger.update_prescription(prescription);
        self.ledger.insert_payment(payment.clone());

        tracing::info!(
            payment_id = %payment.id,
            number = %payment.number,
            prescription_id = %prescription_id,
            amount = payment.amount,
            method = ?method,
            "payment recorded"
        );
        Ok(payment)
    }

    pub fn get(&self, payment_id: Uuid) -> CoreResult<Payment> {
        self.ledger
            .payment(payment_id)
            .ok_or_else(|| CoreError::not_found("payment", payment_id))
    }

    /// The printable SVG receipt for a successful payment.
    pub fn qr_image(&self, payment_id: Uuid) -> CoreResult<String> {
        let payment = self.get(payment_id)?;
        payment.qr_image.ok_or_else(|| {
            CoreError::invalid_state("payment", "SUCCESS with receipt", payment.status)
        })
    }

    pub fn for_prescription(&self, prescription_id: Uuid) -> Vec<Payment> {
        self.ledger.payments_for_prescription(prescription_id)
    }
}
