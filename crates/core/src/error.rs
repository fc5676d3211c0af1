//! Core error taxonomy.
//!
//! One variant per failure class the ledger operations can surface.
//! `InvalidState` always names the state that was expected and the state
//! that was observed, so callers can report what actually went wrong
//! instead of a bare rejection.

use examflow_types::{ExamCategory, PaymentStatus};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} is {actual}, operation requires {expected}")]
    InvalidState {
        entity: &'static str,
        expected: String,
        actual: String,
    },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("malformed QR token: {0}")]
    MalformedToken(String),

    #[error("invalid mobile money callback: {0}")]
    InvalidCallback(String),

    #[error("mobile money provider error: {0}")]
    Adapter(#[from] examflow_momo::AdapterError),

    #[error("failed to generate payment receipt: {0}")]
    Receipt(#[from] examflow_qr::QrError),

    #[error("payment referenced by token not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("payment {payment_id} is {status:?}, receipt requires SUCCESS")]
    PaymentNotSuccessful {
        payment_id: Uuid,
        status: PaymentStatus,
    },

    #[error("no {0} exams on this receipt")]
    NoRelevantExams(ExamCategory),
}

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_state(
        entity: &'static str,
        expected: impl ToString,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::InvalidState {
            entity,
            expected: expected.to_string(),
            actual: format!("{actual:?}"),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
