//! Deterministic sandbox gateway.
//!
//! Stands in for the telco APIs in development and tests: initiation
//! always acknowledges with a generated transaction id (unless scripted
//! to fail), and polls report a configurable outcome. No network, no
//! environment branching — the composition root decides whether this or
//! [`crate::HttpGateway`] is wired in.

use crate::{
    AdapterError, AdapterResult, InitiateAck, InitiateRequest, Provider, ProviderGateway,
    ProviderPaymentStatus, StatusReport,
};
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory fake provider gateway.
#[derive(Debug)]
pub struct SandboxGateway {
    secret: String,
    poll_outcome: ProviderPaymentStatus,
    reject_initiate: Option<String>,
    /// Every initiation request received, for test assertions.
    initiated: Mutex<Vec<InitiateRequest>>,
}

impl SandboxGateway {
    /// Sandbox that acknowledges initiations and reports `PENDING` on
    /// polls (the customer has not confirmed yet).
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            poll_outcome: ProviderPaymentStatus::Pending,
            reject_initiate: None,
            initiated: Mutex::new(Vec::new()),
        }
    }

    /// Script the outcome reported by `poll_status`.
    pub fn with_poll_outcome(mut self, outcome: ProviderPaymentStatus) -> Self {
        self.poll_outcome = outcome;
        self
    }

    /// Script initiation to be rejected with `message`.
    pub fn rejecting_initiate(mut self, message: impl Into<String>) -> Self {
        self.reject_initiate = Some(message.into());
        self
    }

    /// Initiation requests seen so far.
    pub fn initiated_requests(&self) -> Vec<InitiateRequest> {
        self.initiated
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ProviderGateway for SandboxGateway {
    async fn initiate(&self, req: InitiateRequest) -> AdapterResult<InitiateAck> {
        if let Some(message) = &self.reject_initiate {
            tracing::info!(provider = %req.provider, "sandbox rejecting initiation");
            return Err(AdapterError::Rejected(message.clone()));
        }

        let provider_txn_id = format!("{}_{}", req.provider.code(), Uuid::new_v4());
        tracing::info!(
            provider = %req.provider,
            reference = %req.merchant_reference,
            txn = %provider_txn_id,
            "sandbox acknowledged initiation"
        );

        if let Ok(mut log) = self.initiated.lock() {
            log.push(req);
        }

        Ok(InitiateAck {
            provider_txn_id,
            message: "payment initiated (sandbox)".into(),
        })
    }

    async fn poll_status(
        &self,
        _provider: Provider,
        provider_txn_id: &str,
    ) -> AdapterResult<StatusReport> {
        let completed_at = match self.poll_outcome {
            ProviderPaymentStatus::Pending => None,
            _ => Some(Utc::now()),
        };

        Ok(StatusReport {
            provider_txn_id: provider_txn_id.to_string(),
            status: self.poll_outcome,
            amount: 0,
            completed_at,
        })
    }

    fn callback_secret(&self, _provider: Provider) -> AdapterResult<&str> {
        Ok(&self.secret)
    }

    fn is_sandbox(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InitiateRequest {
        InitiateRequest {
            provider: Provider::ProviderA,
            amount: 20000,
            phone_number: "90112233".into(),
            merchant_reference: "EXF-PAY-20260829-0001".into(),
            description: "Paiement prescription PRE-202608-0001".into(),
            callback_url: "http://localhost:5000/api/payments/mobile-money/callback/provider_a"
                .into(),
        }
    }

    #[tokio::test]
    async fn test_initiate_acknowledges_with_txn_id() {
        let gateway = SandboxGateway::new("secret");
        let ack = gateway.initiate(request()).await.unwrap();

        assert!(ack.provider_txn_id.starts_with("PROVIDER_A_"));
        assert_eq!(gateway.initiated_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_rejection() {
        let gateway = SandboxGateway::new("secret").rejecting_initiate("insufficient funds");
        let err = gateway.initiate(request()).await.unwrap_err();

        assert!(matches!(err, AdapterError::Rejected(m) if m == "insufficient funds"));
        assert!(gateway.initiated_requests().is_empty());
    }

    #[tokio::test]
    async fn test_poll_defaults_to_pending() {
        let gateway = SandboxGateway::new("secret");
        let report = gateway.poll_status(Provider::ProviderB, "txn-1").await.unwrap();

        assert_eq!(report.status, ProviderPaymentStatus::Pending);
        assert!(report.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_poll_scripted_success() {
        let gateway =
            SandboxGateway::new("secret").with_poll_outcome(ProviderPaymentStatus::Success);
        let report = gateway.poll_status(Provider::ProviderA, "txn-2").await.unwrap();

        assert_eq!(report.status, ProviderPaymentStatus::Success);
        assert!(report.completed_at.is_some());
    }

    #[test]
    fn test_is_sandbox() {
        assert!(SandboxGateway::new("s").is_sandbox());
    }
}
