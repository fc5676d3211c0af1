//! Wire DTOs for the REST surface.
//!
//! All request and response bodies use camelCase JSON, matching what the
//! hospital frontend consumes. Each response type converts from its core
//! domain counterpart so handlers never serialize domain structs
//! directly.

use chrono::{DateTime, Utc};
use examflow_core::{
    CompletionResult, ExamLine, MomoTransaction, Patient, Payment, PaymentStatusView,
    Prescription, ScanResult,
};
use examflow_momo::ProviderPaymentStatus;
use examflow_types::{
    Amount, ExamCategory, ExamLineStatus, PaymentMethod, PaymentStatus, PrescriptionStatus,
    Provider, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Uniform error body for every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

// ---- prescriptions ------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrescriptionReq {
    pub patient_id: Uuid,
    pub exam_ids: Vec<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExamLineRes {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: ExamCategory,
    pub quantity: u32,
    pub price: Amount,
    pub status: ExamLineStatus,
    pub performed_by: Option<Uuid>,
    pub performed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl From<ExamLine> for ExamLineRes {
    fn from(line: ExamLine) -> Self {
        Self {
            id: line.id,
            code: line.code,
            name: line.name,
            category: line.category,
            quantity: line.quantity,
            price: line.price,
            status: line.status,
            performed_by: line.performed_by,
            performed_at: line.performed_at,
            notes: line.notes,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRes {
    pub id: Uuid,
    pub number: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: PrescriptionStatus,
    pub total_amount: Amount,
    pub exams: Vec<ExamLineRes>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Prescription> for PrescriptionRes {
    fn from(p: Prescription) -> Self {
        Self {
            id: p.id,
            number: p.number,
            patient_id: p.patient_id,
            doctor_id: p.doctor_id,
            status: p.status,
            total_amount: p.total_amount,
            exams: p.lines.into_iter().map(ExamLineRes::from).collect(),
            notes: p.notes,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingPrescriptionsRes {
    pub prescriptions: Vec<PrescriptionRes>,
}

// ---- payments -----------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentReq {
    pub prescription_id: Uuid,
    pub method: PaymentMethod,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRes {
    pub id: Uuid,
    pub number: String,
    pub prescription_id: Uuid,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_reference: Option<String>,
    pub qr_token: Option<String>,
    pub qr_image: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentRes {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            number: p.number,
            prescription_id: p.prescription_id,
            amount: p.amount,
            method: p.method,
            status: p.status,
            transaction_reference: p.transaction_reference,
            qr_token: p.qr_token,
            qr_image: p.qr_image,
            paid_at: p.paid_at,
            created_at: p.created_at,
        }
    }
}

// ---- mobile money -------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateMomoReq {
    pub prescription_id: Uuid,
    pub provider: Provider,
    pub phone_number: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRes {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub provider: Provider,
    pub status: TransactionStatus,
    pub provider_txn_id: Option<String>,
    pub callback_received: bool,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<MomoTransaction> for TransactionRes {
    fn from(t: MomoTransaction) -> Self {
        Self {
            id: t.id,
            payment_id: t.payment_id,
            provider: t.provider,
            status: t.status,
            provider_txn_id: t.provider_txn_id,
            callback_received: t.callback_received,
            error_message: t.error_message,
            completed_at: t.completed_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiateMomoRes {
    pub payment: PaymentRes,
    pub transaction: TransactionRes,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRes {
    pub payment_id: Uuid,
    pub payment_status: PaymentStatus,
    pub transaction_status: TransactionStatus,
    pub callback_received: bool,
    pub qr_token: Option<String>,
    pub qr_image: Option<String>,
    pub error_message: Option<String>,
}

impl From<PaymentStatusView> for PaymentStatusRes {
    fn from(v: PaymentStatusView) -> Self {
        Self {
            payment_id: v.payment_id,
            payment_status: v.payment_status,
            transaction_status: v.transaction_status,
            callback_received: v.callback_received,
            qr_token: v.qr_token,
            qr_image: v.qr_image,
            error_message: v.error_message,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackAckRes {
    pub message: String,
    pub status: TransactionStatus,
}

/// Terminal outcome a sandbox operator can inject.
///
/// Deliberately narrower than the provider status set: a simulated
/// callback always settles the transaction.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulatedOutcome {
    Success,
    Failed,
    Cancelled,
}

impl From<SimulatedOutcome> for ProviderPaymentStatus {
    fn from(o: SimulatedOutcome) -> Self {
        match o {
            SimulatedOutcome::Success => Self::Success,
            SimulatedOutcome::Failed => Self::Failed,
            SimulatedOutcome::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SimulateCallbackReq {
    pub outcome: SimulatedOutcome,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StuckTransactionsRes {
    pub transactions: Vec<TransactionRes>,
}

// ---- fulfillment --------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQrReq {
    pub qr_data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientRes {
    pub id: Uuid,
    pub number: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<Patient> for PatientRes {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            number: p.number,
            first_name: p.first_name,
            last_name: p.last_name,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQrRes {
    pub payment_id: Uuid,
    pub payment_number: String,
    pub prescription_id: Uuid,
    pub prescription_number: String,
    pub patient: PatientRes,
    pub exams: Vec<ExamLineRes>,
}

impl From<ScanResult> for VerifyQrRes {
    fn from(r: ScanResult) -> Self {
        Self {
            payment_id: r.payment_id,
            payment_number: r.payment_number,
            prescription_id: r.prescription_id,
            prescription_number: r.prescription_number,
            patient: r.patient.into(),
            exams: r.exams.into_iter().map(ExamLineRes::from).collect(),
        }
    }
}

/// One entry in a service desk work queue.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRes {
    pub prescription_id: Uuid,
    pub prescription_number: String,
    pub patient_id: Uuid,
    pub exam: ExamLineRes,
}

impl From<(Prescription, ExamLine)> for WorkItemRes {
    fn from((prescription, line): (Prescription, ExamLine)) -> Self {
        Self {
            prescription_id: prescription.id,
            prescription_number: prescription.number,
            patient_id: prescription.patient_id,
            exam: line.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkQueueRes {
    pub exams: Vec<WorkItemRes>,
}

impl From<Vec<(Prescription, ExamLine)>> for WorkQueueRes {
    fn from(rows: Vec<(Prescription, ExamLine)>) -> Self {
        Self {
            exams: rows.into_iter().map(WorkItemRes::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteExamReq {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRes {
    pub exam: ExamLineRes,
    pub prescription_completed: bool,
}

impl From<CompletionResult> for CompletionRes {
    fn from(r: CompletionResult) -> Self {
        Self {
            exam: r.line.into(),
            prescription_completed: r.prescription_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_bodies_use_camel_case() {
        let req: CreatePrescriptionReq = serde_json::from_str(
            r#"{"patientId":"8c2f04a5-95cc-4c12-8b6a-111111111111","examIds":[]}"#,
        )
        .unwrap();
        assert!(req.exam_ids.is_empty());
        assert!(req.notes.is_none());

        let req: InitiateMomoReq = serde_json::from_str(
            r#"{"prescriptionId":"8c2f04a5-95cc-4c12-8b6a-111111111111","provider":"PROVIDER_A","phoneNumber":"90112233"}"#,
        )
        .unwrap();
        assert_eq!(req.provider, Provider::ProviderA);
    }

    #[test]
    fn test_simulated_outcome_maps_to_provider_status() {
        let req: SimulateCallbackReq =
            serde_json::from_str(r#"{"outcome":"SUCCESS"}"#).unwrap();
        assert_eq!(
            ProviderPaymentStatus::from(req.outcome),
            ProviderPaymentStatus::Success
        );
        // PENDING is not an injectable outcome.
        assert!(serde_json::from_str::<SimulateCallbackReq>(r#"{"outcome":"PENDING"}"#).is_err());
    }
}
