//! # Examflow Types
//!
//! Shared domain vocabulary for the examflow workspace.
//!
//! Contains the status enums that drive the prescription/payment state
//! machines, staff roles and exam categories, the authenticated `Actor`,
//! and small validated value types. Everything here is plain data with
//! serde wire forms matching the persisted SCREAMING_SNAKE_CASE values;
//! no business rules live in this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Monetary amount in XOF francs (no minor unit).
pub type Amount = u64;

/// Lifecycle of a prescription as a whole.
///
/// `Pending → {Paid, Cancelled}`, `Paid → InProgress → Completed`.
/// `Cancelled` and `Completed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionStatus {
    Pending,
    Paid,
    InProgress,
    Completed,
    Cancelled,
}

/// Lifecycle of a single exam line on a prescription.
///
/// `Pending` is the pre-payment placeholder; service staff drive
/// `Paid → InProgress → Completed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamLineStatus {
    Pending,
    Paid,
    InProgress,
    Completed,
}

/// How a payment was taken at the cashier desk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    Card,
}

/// Payment outcome. `Success` is immutable once reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// Mobile money transaction state.
///
/// `Pending → Processing → {Success, Failed, Cancelled}`; the three
/// terminal states are immutable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Whether this state permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

/// Supported mobile money providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    ProviderA,
    ProviderB,
}

impl Provider {
    /// Stable uppercase code used in merchant references and URLs.
    pub fn code(self) -> &'static str {
        match self {
            Self::ProviderA => "PROVIDER_A",
            Self::ProviderB => "PROVIDER_B",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Provider {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROVIDER_A" => Ok(Self::ProviderA),
            "PROVIDER_B" => Ok(Self::ProviderB),
            other => Err(TypeError::UnknownProvider(other.to_string())),
        }
    }
}

/// Exam service category, used to route exam lines to the right desk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamCategory {
    Radiology,
    Laboratory,
}

impl fmt::Display for ExamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radiology => f.write_str("RADIOLOGY"),
            Self::Laboratory => f.write_str("LABORATORY"),
        }
    }
}

/// Role yielded by the identity service for an authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Doctor,
    Cashier,
    Radiologist,
    LabTechnician,
    Admin,
}

impl Role {
    /// The exam category this role is allowed to service, if any.
    pub fn service_category(self) -> Option<ExamCategory> {
        match self {
            Self::Radiologist => Some(ExamCategory::Radiology),
            Self::LabTechnician => Some(ExamCategory::Laboratory),
            Self::Doctor | Self::Cashier | Self::Admin => None,
        }
    }
}

impl FromStr for Role {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DOCTOR" => Ok(Self::Doctor),
            "CASHIER" => Ok(Self::Cashier),
            "RADIOLOGIST" => Ok(Self::Radiologist),
            "LAB_TECHNICIAN" => Ok(Self::LabTechnician),
            "ADMIN" => Ok(Self::Admin),
            other => Err(TypeError::UnknownRole(other.to_string())),
        }
    }
}

/// An already-authenticated caller, as handed to every core operation.
///
/// Authentication itself is an external collaborator; by the time a
/// request reaches the core it carries an `Actor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Errors that can occur when parsing shared value types.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("text must not be blank")]
    Empty,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// A trimmed string with at least one non-whitespace character.
///
/// Payer phone numbers and other free-text inputs cross the API boundary
/// as `NonEmptyText`, so downstream code never has to re-check for blank
/// values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Trims `input` and wraps it, rejecting blank text with
    /// [`TypeError::Empty`].
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypeError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypeError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}
