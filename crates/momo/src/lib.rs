//! # Examflow Momo
//!
//! Mobile Money Gateway Adapter: talks to the external telco payment
//! providers and normalizes their asynchronous initiate/callback/poll
//! protocols into one internal contract.
//!
//! The contract is the [`ProviderGateway`] trait, with two
//! implementations selected by configuration at the composition root:
//!
//! - [`HttpGateway`] — the real per-provider HTTP client
//! - [`SandboxGateway`] — a deterministic fake for development and tests
//!
//! Business logic never branches on environment; it only sees the trait.
//! Callback authenticity is verified in [`signature`] with a
//! constant-time HMAC-SHA256 comparison.

pub mod client;
pub mod sandbox;
pub mod signature;

pub use client::HttpGateway;
pub use sandbox::SandboxGateway;

use chrono::{DateTime, Utc};
use examflow_types::Amount;
pub use examflow_types::Provider;
use serde::{Deserialize, Serialize};

/// Errors surfaced by provider adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("provider not configured: {0}")]
    UnsupportedProvider(Provider),
    #[error("network error talking to provider: {0}")]
    Network(#[from] reqwest::Error),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error("provider returned an unreadable response: {0}")]
    BadResponse(String),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Outbound initiation request, provider-agnostic.
#[derive(Clone, Debug)]
pub struct InitiateRequest {
    pub provider: Provider,
    pub amount: Amount,
    /// Payer phone number in national format.
    pub phone_number: String,
    /// Unique merchant reference derived from the payment number.
    pub merchant_reference: String,
    pub description: String,
    /// Where the provider should deliver its asynchronous callback.
    pub callback_url: String,
}

/// Provider acknowledgment of a successful initiation.
#[derive(Clone, Debug)]
pub struct InitiateAck {
    /// Provider-issued transaction id, used for callbacks and polling.
    pub provider_txn_id: String,
    pub message: String,
}

/// Payment status as reported by a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderPaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

/// Result of polling a provider for live transaction status.
#[derive(Clone, Debug)]
pub struct StatusReport {
    pub provider_txn_id: String,
    pub status: ProviderPaymentStatus,
    pub amount: Amount,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The normalized provider contract.
///
/// One adapter instance serves all configured providers; the provider is
/// named per call so the reconciliation core stays provider-agnostic.
#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Ask the provider to start a payment; the customer confirms on
    /// their handset and the provider later calls back or answers polls.
    async fn initiate(&self, req: InitiateRequest) -> AdapterResult<InitiateAck>;

    /// Query the provider for the live status of a transaction.
    async fn poll_status(
        &self,
        provider: Provider,
        provider_txn_id: &str,
    ) -> AdapterResult<StatusReport>;

    /// Shared secret for verifying inbound callbacks from `provider`.
    fn callback_secret(&self, provider: Provider) -> AdapterResult<&str>;

    /// Whether this gateway is the deterministic sandbox. Simulated
    /// callbacks are only honoured against a sandbox gateway.
    fn is_sandbox(&self) -> bool {
        false
    }
}

/// The body a provider POSTs to the callback URL.
///
/// Both supported providers share this shape; the HMAC signature over the
/// raw body travels in the `x-signature` header, not in the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Merchant reference echoed back from initiation.
    pub reference: String,
    /// Provider-issued transaction id.
    pub transaction_id: String,
    pub status: ProviderPaymentStatus,
    pub amount: Amount,
    #[serde(default)]
    pub message: Option<String>,
}

impl CallbackPayload {
    /// Parse a raw callback body. The raw bytes must be kept for the
    /// signature check and the audit record; parsing never reorders them.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Static configuration for one provider, resolved at startup.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub base_url: String,
    pub merchant_id: String,
    pub api_key: String,
    pub secret_key: String,
}

/// Per-provider configuration for the HTTP gateway.
#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    pub provider_a: Option<ProviderConfig>,
    pub provider_b: Option<ProviderConfig>,
}

impl GatewayConfig {
    /// Look up the configuration for `provider`.
    pub fn provider(&self, provider: Provider) -> AdapterResult<&ProviderConfig> {
        let cfg = match provider {
            Provider::ProviderA => self.provider_a.as_ref(),
            Provider::ProviderB => self.provider_b.as_ref(),
        };
        cfg.ok_or(AdapterError::UnsupportedProvider(provider))
    }
}
