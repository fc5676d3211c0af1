//! Domain records for the prescription, payment, and mobile money
//! ledgers.
//!
//! A [`Prescription`] owns its [`ExamLine`]s; line prices are immutable
//! snapshots taken from the catalog at creation, which insulates the
//! prescription total from later catalog price edits. [`Payment`] and
//! [`MomoTransaction`] are append-only audit records and are never
//! deleted once created.

use chrono::{DateTime, Utc};
use examflow_types::{
    Amount, ExamCategory, ExamLineStatus, PaymentMethod, PaymentStatus, PrescriptionStatus,
    Provider, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billable exam as listed in the (external) exam catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: ExamCategory,
    pub price: Amount,
    pub active: bool,
}

/// Patient read model, as consumed by receipts and scan responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// Human-readable patient number shown at desks.
    pub number: String,
    pub first_name: String,
    pub last_name: String,
}

impl Patient {
    /// Display form used on receipts: `"LASTNAME Firstname"`.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.last_name.to_uppercase(), self.first_name)
    }
}

/// One ordered exam on a prescription, with its price snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExamLine {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub exam_id: Uuid,
    pub code: String,
    pub name: String,
    pub category: ExamCategory,
    pub quantity: u32,
    /// Unit price at prescription time; never re-read from the catalog.
    pub price: Amount,
    pub status: ExamLineStatus,
    pub performed_by: Option<Uuid>,
    pub performed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl ExamLine {
    fn from_catalog(prescription_id: Uuid, entry: &CatalogEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            prescription_id,
            exam_id: entry.id,
            code: entry.code.clone(),
            name: entry.name.clone(),
            category: entry.category,
            quantity: 1,
            price: entry.price,
            status: ExamLineStatus::Pending,
            performed_by: None,
            performed_at: None,
            notes: None,
        }
    }
}

/// An ordered set of exams for one patient by one doctor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    /// Display sequence number, `PRE-YYYYMM-NNNN`.
    pub number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub lines: Vec<ExamLine>,
    /// Always the sum of line price snapshots at creation.
    pub total_amount: Amount,
    pub status: PrescriptionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    /// Build a new PENDING prescription, snapshotting catalog prices.
    pub fn new(
        number: String,
        patient_id: Uuid,
        doctor_id: Uuid,
        entries: &[CatalogEntry],
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        let lines: Vec<ExamLine> = entries
            .iter()
            .map(|e| ExamLine::from_catalog(id, e))
            .collect();
        let total_amount = lines.iter().map(|l| l.price * Amount::from(l.quantity)).sum();

        Self {
            id,
            number,
            patient_id,
            doctor_id,
            lines,
            total_amount,
            status: PrescriptionStatus::Pending,
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn line(&self, line_id: Uuid) -> Option<&ExamLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn line_mut(&mut self, line_id: Uuid) -> Option<&mut ExamLine> {
        self.lines.iter_mut().find(|l| l.id == line_id)
    }

    /// Flip the prescription and every line to PAID. Caller has already
    /// verified the PENDING precondition under the prescription lock.
    pub(crate) fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.status = PrescriptionStatus::Paid;
        self.updated_at = now;
        for line in &mut self.lines {
            line.status = ExamLineStatus::Paid;
        }
    }

    pub fn all_lines_completed(&self) -> bool {
        !self.lines.is_empty()
            && self
                .lines
                .iter()
                .all(|l| l.status == ExamLineStatus::Completed)
    }
}

/// One payment attempt against a prescription.
///
/// The amount is always the full prescription total; multiple records per
/// prescription exist only because failed attempts are kept for audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Display sequence number, `PAY-YYYYMMDD-NNNN`.
    pub number: String,
    pub prescription_id: Uuid,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub cashier_id: Uuid,
    /// Provider transaction reference for mobile money / card terminals.
    pub transaction_reference: Option<String>,
    /// Canonical serialized receipt token, set when the payment succeeds.
    pub qr_token: Option<String>,
    /// SVG rendering of the receipt token, for printing.
    pub qr_image: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        number: String,
        prescription_id: Uuid,
        amount: Amount,
        method: PaymentMethod,
        status: PaymentStatus,
        cashier_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            prescription_id,
            amount,
            method,
            status,
            cashier_id,
            transaction_reference: None,
            qr_token: None,
            qr_image: None,
            paid_at: None,
            created_at: now,
        }
    }
}

/// Asynchronous mobile money payment attempt, one-to-one with its
/// owning [`Payment`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MomoTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub provider: Provider,
    pub phone_number: String,
    pub amount: Amount,
    /// Provider-issued id, set once the provider acknowledges initiation.
    pub provider_txn_id: Option<String>,
    pub status: TransactionStatus,
    pub error_message: Option<String>,
    pub callback_received: bool,
    /// Raw callback body, kept verbatim for audit.
    pub callback_payload: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MomoTransaction {
    pub fn new(
        payment_id: Uuid,
        provider: Provider,
        phone_number: String,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            provider,
            phone_number,
            amount,
            provider_txn_id: None,
            status: TransactionStatus::Pending,
            error_message: None,
            callback_received: false,
            callback_payload: None,
            completed_at: None,
            created_at: now,
        }
    }
}
