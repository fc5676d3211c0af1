//! Real HTTP client for the telco provider APIs.
//!
//! Each provider exposes `POST {base}/payment/initiate` and
//! `GET {base}/payment/status/{txn}`, authenticated with a bearer API key
//! and an HMAC signature over the initiation fields.

use crate::signature;
use crate::{
    AdapterError, AdapterResult, GatewayConfig, InitiateAck, InitiateRequest, Provider,
    ProviderGateway, ProviderPaymentStatus, StatusReport,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// HTTP gateway to the live provider APIs.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    http: reqwest::Client,
    cfg: GatewayConfig,
}

#[derive(Serialize)]
struct InitiateBody<'a> {
    #[serde(rename = "merchantId")]
    merchant_id: &'a str,
    amount: u64,
    currency: &'a str,
    #[serde(rename = "phoneNumber")]
    phone_number: &'a str,
    reference: &'a str,
    description: &'a str,
    #[serde(rename = "callbackUrl")]
    callback_url: &'a str,
    timestamp: i64,
    signature: String,
}

#[derive(Deserialize)]
struct InitiateResponse {
    #[serde(rename = "transactionId")]
    transaction_id: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "transactionId")]
    transaction_id: String,
    status: ProviderPaymentStatus,
    #[serde(default)]
    amount: u64,
    #[serde(rename = "completedAt", default)]
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

impl HttpGateway {
    /// Build a gateway from resolved provider configuration.
    pub fn new(cfg: GatewayConfig) -> AdapterResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, cfg })
    }

    async fn rejection(response: reqwest::Response) -> AdapterError {
        let status = response.status();
        let detail = match response.json::<ErrorResponse>().await {
            Ok(body) => body.message.unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        AdapterError::Rejected(detail)
    }
}

#[async_trait::async_trait]
impl ProviderGateway for HttpGateway {
    async fn initiate(&self, req: InitiateRequest) -> AdapterResult<InitiateAck> {
        let provider_cfg = self.cfg.provider(req.provider)?;
        let timestamp = Utc::now().timestamp_millis();
        let signature = signature::sign(
            &provider_cfg.secret_key,
            &signature::initiation_message(
                &provider_cfg.merchant_id,
                req.amount,
                &req.merchant_reference,
                timestamp,
            ),
        );

        let body = InitiateBody {
            merchant_id: &provider_cfg.merchant_id,
            amount: req.amount,
            currency: "XOF",
            phone_number: &req.phone_number,
            reference: &req.merchant_reference,
            description: &req.description,
            callback_url: &req.callback_url,
            timestamp,
            signature,
        };

        tracing::info!(
            provider = %req.provider,
            reference = %req.merchant_reference,
            amount = req.amount,
            "initiating mobile money payment"
        );

        let response = self
            .http
            .post(format!("{}/payment/initiate", provider_cfg.base_url))
            .bearer_auth(&provider_cfg.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let ack: InitiateResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::BadResponse(e.to_string()))?;

        Ok(InitiateAck {
            provider_txn_id: ack.transaction_id,
            message: ack.message.unwrap_or_else(|| "payment initiated".into()),
        })
    }

    async fn poll_status(
        &self,
        provider: Provider,
        provider_txn_id: &str,
    ) -> AdapterResult<StatusReport> {
        let provider_cfg = self.cfg.provider(provider)?;

        let response = self
            .http
            .get(format!(
                "{}/payment/status/{provider_txn_id}",
                provider_cfg.base_url
            ))
            .bearer_auth(&provider_cfg.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::BadResponse(e.to_string()))?;

        Ok(StatusReport {
            provider_txn_id: status.transaction_id,
            status: status.status,
            amount: status.amount,
            completed_at: status.completed_at,
        })
    }

    fn callback_secret(&self, provider: Provider) -> AdapterResult<&str> {
        Ok(&self.cfg.provider(provider)?.secret_key)
    }
}
