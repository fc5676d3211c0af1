//! Core runtime configuration.
//!
//! Resolved once at process startup and passed into services. Request
//! handling never reads process-wide environment variables; that keeps
//! behaviour consistent across multi-threaded runtimes and test
//! harnesses.

use crate::error::{CoreError, CoreResult};
use examflow_types::Provider;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Public base URL of this service, used to build the per-provider
    /// callback URLs handed to the mobile money gateways.
    public_base_url: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(public_base_url: impl Into<String>) -> CoreResult<Self> {
        let public_base_url = public_base_url.into().trim_end_matches('/').to_string();
        if public_base_url.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "public_base_url cannot be empty".into(),
            ));
        }

        Ok(Self { public_base_url })
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    /// Callback URL the provider should deliver webhooks to.
    pub fn callback_url(&self, provider: Provider) -> String {
        format!(
            "{}/api/payments/mobile-money/callback/{}",
            self.public_base_url,
            provider.code().to_ascii_lowercase()
        )
    }
}
