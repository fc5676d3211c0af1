//! # Examflow QR
//!
//! The QR verification codec: a compact, versioned token binding a
//! successful payment to its prescription, patient, and the exam lines it
//! authorizes.
//!
//! The token carries **no signature**. Its authority comes from the server
//! re-querying live state by the embedded payment id when a receipt is
//! scanned; the embedded line statuses are client-display conveniences
//! only. [`decode`] is a pure parse with no business validation, which is
//! the verifier's job.
//!
//! A printable SVG rendering is derived from the canonical serialization
//! via [`render_svg`]. The image is not a compatibility surface — only the
//! serialized token schema is.

use chrono::{DateTime, Utc};
use examflow_types::{Amount, ExamCategory, ExamLineStatus};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type discriminator carried in every token.
pub const TOKEN_TYPE: &str = "EXAMFLOW_PAYMENT";

/// Current token schema version.
pub const TOKEN_VERSION: &str = "1.0";

/// Errors that can occur in the QR codec.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("malformed QR token: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("QR token has unexpected type tag: {0}")]
    WrongTokenType(String),
    #[error("failed to build QR image: {0}")]
    Render(#[from] qrcode::types::QrError),
}

pub type QrResult<T> = std::result::Result<T, QrError>;

/// Patient identity as embedded in a receipt token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPatient {
    pub id: Uuid,
    /// Human-readable patient number shown at service desks.
    pub number: String,
    /// Display name, `"LASTNAME Firstname"`.
    pub name: String,
}

/// One billed exam line as embedded in a receipt token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExamLine {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub category: ExamCategory,
    /// Line status at generation time. Display-only; scanners must
    /// re-fetch live state by `payment_id`.
    pub status: ExamLineStatus,
}

/// The decoded form of a payment receipt token.
///
/// Field set is the schema compatibility surface: `token_type` and
/// `version` tags plus the payment/prescription/patient binding and the
/// authorized exam lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptToken {
    #[serde(rename = "type")]
    pub token_type: String,
    pub version: String,
    pub payment_id: Uuid,
    pub payment_number: String,
    pub prescription_id: Uuid,
    pub prescription_number: String,
    pub patient: TokenPatient,
    pub amount: Amount,
    pub exams: Vec<TokenExamLine>,
    pub paid_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

impl ReceiptToken {
    /// Canonical serialized form of the token: compact JSON.
    ///
    /// This is what gets stored alongside the payment and rendered into
    /// the printed QR image.
    pub fn encode(&self) -> QrResult<String> {
        let data = serde_json::to_string(self)?;
        tracing::debug!(payment_id = %self.payment_id, len = data.len(), "receipt token encoded");
        Ok(data)
    }
}

/// Parse a scanned token back into its structured form.
///
/// Pure and stateless: fails with [`QrError::Malformed`] when the data is
/// not valid token JSON and [`QrError::WrongTokenType`] when the type tag
/// does not match. Never consults storage or validates business state.
pub fn decode(data: &str) -> QrResult<ReceiptToken> {
    let token: ReceiptToken = serde_json::from_str(data)?;
    if token.token_type != TOKEN_TYPE {
        return Err(QrError::WrongTokenType(token.token_type));
    }
    Ok(token)
}

/// Render the canonical serialization as an SVG QR image for printing.
///
/// Derived data only: the serialized token remains the single source of
/// truth for what a receipt says.
pub fn render_svg(canonical: &str) -> QrResult<String> {
    let code = QrCode::new(canonical.as_bytes())?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(300, 300)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_token() -> ReceiptToken {
        ReceiptToken {
            token_type: TOKEN_TYPE.to_string(),
            version: TOKEN_VERSION.to_string(),
            payment_id: Uuid::new_v4(),
            payment_number: "PAY-20260829-0001".to_string(),
            prescription_id: Uuid::new_v4(),
            prescription_number: "PRE-202608-0001".to_string(),
            patient: TokenPatient {
                id: Uuid::new_v4(),
                number: "PAT-0042".to_string(),
                name: "KODJO Afi".to_string(),
            },
            amount: 20000,
            exams: vec![
                TokenExamLine {
                    id: Uuid::new_v4(),
                    code: "RX-THORAX".to_string(),
                    name: "Radiographie du thorax".to_string(),
                    category: ExamCategory::Radiology,
                    status: ExamLineStatus::Paid,
                },
                TokenExamLine {
                    id: Uuid::new_v4(),
                    code: "NFS".to_string(),
                    name: "Numeration formule sanguine".to_string(),
                    category: ExamCategory::Laboratory,
                    status: ExamLineStatus::Paid,
                },
            ],
            paid_at: Utc.with_ymd_and_hms(2026, 8, 29, 10, 30, 0).unwrap(),
            generated_at: Utc.with_ymd_and_hms(2026, 8, 29, 10, 30, 1).unwrap(),
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let token = sample_token();
        let canonical = token.encode().unwrap();
        let decoded = decode(&canonical).unwrap();

        assert_eq!(decoded, token);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode("not valid json at all");
        assert!(matches!(result, Err(QrError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_token() {
        let token = sample_token();
        let canonical = token.encode().unwrap();
        let truncated = &canonical[..canonical.len() / 2];

        assert!(matches!(decode(truncated), Err(QrError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_type_tag() {
        let mut token = sample_token();
        token.token_type = "SOMETHING_ELSE".to_string();
        let canonical = serde_json::to_string(&token).unwrap();

        match decode(&canonical) {
            Err(QrError::WrongTokenType(tag)) => assert_eq!(tag, "SOMETHING_ELSE"),
            other => panic!("expected WrongTokenType, got {other:?}"),
        }
    }

    #[test]
    fn test_wire_form_uses_type_and_version_tags() {
        let canonical = sample_token().encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&canonical).unwrap();

        assert_eq!(value["type"], TOKEN_TYPE);
        assert_eq!(value["version"], TOKEN_VERSION);
        assert_eq!(value["exams"].as_array().unwrap().len(), 2);
        assert_eq!(value["exams"][0]["category"], "RADIOLOGY");
    }

    #[test]
    fn test_render_svg_produces_image() {
        let canonical = sample_token().encode().unwrap();
        let image = render_svg(&canonical).unwrap();

        assert!(image.starts_with("<?xml") || image.starts_with("<svg"));
        assert!(image.contains("svg"));
    }
}
