//! Mobile money reconciliation.
//!
//! A mobile money payment is asynchronous: the cashier initiates it, the
//! customer confirms on their handset, and the outcome arrives either as
//! a signed provider callback or through explicit status polling. Both
//! paths converge here, and both apply their terminal transition under
//! the owning prescription's lock so a callback and a poll racing each
//! other commit exactly once.

use crate::domain::{MomoTransaction, Payment, Prescription};
use crate::error::{CoreError, CoreResult};
use crate::payments::attach_receipt;
use crate::sequence::SequenceGenerator;
use crate::store::Ledger;
use crate::CoreConfig;
use chrono::{DateTime, Duration, Utc};
use examflow_momo::{
    signature, CallbackPayload, InitiateRequest, ProviderGateway, ProviderPaymentStatus,
};
use examflow_types::{
    Actor, NonEmptyText, PaymentMethod, PaymentStatus, PrescriptionStatus, Provider, Role,
    TransactionStatus,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What the frontend sees when it asks where a mobile money payment
/// stands.
#[derive(Clone, Debug, Serialize)]
pub struct PaymentStatusView {
    pub payment_id: Uuid,
    pub payment_status: PaymentStatus,
    pub transaction_status: TransactionStatus,
    pub callback_received: bool,
    /// Receipt token, present once the payment has succeeded.
    pub qr_token: Option<String>,
    pub qr_image: Option<String>,
    pub error_message: Option<String>,
}

/// Service driving the initiate / callback / poll lifecycle.
#[derive(Clone)]
pub struct ReconciliationService {
    ledger: Arc<Ledger>,
    sequences: Arc<dyn SequenceGenerator>,
    gateway: Arc<dyn ProviderGateway>,
    config: CoreConfig,
}

impl ReconciliationService {
    pub fn new(
        ledger: Arc<Ledger>,
        sequences: Arc<dyn SequenceGenerator>,
        gateway: Arc<dyn ProviderGateway>,
        config: CoreConfig,
    ) -> Self {
        Self {
            ledger,
            sequences,
            gateway,
            config,
        }
    }

    /// Start a mobile money payment for a PENDING prescription.
    ///
    /// On provider acknowledgment the payment stays PENDING and the
    /// transaction moves to PROCESSING, waiting for the callback. A
    /// provider rejection is recorded as a FAILED payment and the error
    /// is surfaced to the caller; the prescription stays PENDING so the
    /// patient can retry.
    pub async fn initiate(
        &self,
        prescription_id: Uuid,
        provider: Provider,
        phone_number: NonEmptyText,
        actor: Actor,
    ) -> CoreResult<(Payment, MomoTransaction)> {
        if !matches!(actor.role, Role::Cashier | Role::Admin) {
            return Err(CoreError::Forbidden(
                "only cashiers can initiate payments".into(),
            ));
        }

        let _guard = self.ledger.lock_prescription(prescription_id).await;

        let prescription = self
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
            PaymentMethod::MobileMoney,
            PaymentStatus::Pending,
            actor.id,
            now,
        );
        let mut txn = MomoTransaction::new(
            payment.id,
            provider,
            phone_number.to_string(),
            payment.amount,
            now,
        );
        self.ledger.insert_payment(payment.clone());
        self.ledger.insert_transaction(txn.clone());

        let request = InitiateRequest {
            provider,
            amount: payment.amount,
            phone_number: txn.phone_number.clone(),
            merchant_reference: format!("EXF-{}", payment.number),
            description: format!("Paiement prescription {}", prescription.number),
            callback_url: self.config.callback_url(provider),
        };

        match self.gateway.initiate(request).await {
            Ok(ack) => {
                txn.provider_txn_id = Some(ack.provider_txn_id.clone());
                txn.status = TransactionStatus::Processing;
                payment.transaction_reference = Some(ack.provider_txn_id);
                self.ledger.update_transaction(txn.clone());
                self.ledger.update_payment(payment.clone());

                tracing::info!(
                    payment_id = %payment.id,
                    provider = %provider,
                    txn = ?txn.provider_txn_id,
                    "mobile money payment initiated"
                );
                Ok((payment, txn))
            }
            Err(err) => {
                txn.status = TransactionStatus::Failed;
                txn.error_message = Some(err.to_string());
                txn.completed_at = Some(Utc::now());
                payment.status = PaymentStatus::Failed;
                self.ledger.update_transaction(txn);
                self.ledger.update_payment(payment);

                tracing::warn!(
                    prescription_id = %prescription_id,
                    provider = %provider,
                    error = %err,
                    "mobile money initiation failed"
                );
                Err(CoreError::Adapter(err))
            }
        }
    }

    /// Apply a provider callback.
    ///
    /// The raw body is verified against the provider's shared secret
    /// before anything is parsed or touched; an unverifiable or unknown
    /// callback mutates nothing. A callback for an already-terminal
    /// transaction is a duplicate and is acknowledged without effect.
    pub async fn process_callback(
        &self,
        provider: Provider,
        raw_body: &str,
        signature_header: Option<&str>,
    ) -> CoreResult<MomoTransaction> {
        let secret = self.gateway.callback_secret(provider)?;
        let signature_hex = signature_header
            .ok_or_else(|| CoreError::InvalidCallback("missing x-signature header".into()))?;
        if !signature::verify(secret, raw_body, signature_hex) {
            tracing::warn!(provider = %provider, "callback signature verification failed");
            return Err(CoreError::InvalidCallback("signature mismatch".into()));
        }

        let payload = CallbackPayload::parse(raw_body)
            .map_err(|e| CoreError::InvalidCallback(format!("unreadable payload: {e}")))?;

        let txn = self
            .ledger
            .transaction_by_provider_ref(&payload.transaction_id)
            .ok_or_else(|| CoreError::not_found("transaction", &payload.transaction_id))?;
        let payment = self
            .ledger
            .payment(txn.payment_id)
            .ok_or_else(|| CoreError::not_found("payment", txn.payment_id))?;

        let _guard = self.ledger.lock_prescription(payment.prescription_id).await;

        // Re-read under the lock; a racing poll may have settled it.
        let mut txn = self
            .ledger
            .transaction(txn.id)
            .ok_or_else(|| CoreError::not_found("transaction", txn.id))?;
        if txn.status.is_terminal() {
            tracing::info!(txn_id = %txn.id, status = ?txn.status, "duplicate callback ignored");
            return Ok(txn);
        }

        txn.callback_received = true;
        txn.callback_payload = Some(raw_body.to_string());

        match payload.status {
            ProviderPaymentStatus::Pending => {
                // Interim notification; keep waiting.
                self.ledger.update_transaction(txn.clone());
                Ok(txn)
            }
            terminal => {
                self.settle(txn, terminal, payload.message).await
            }
        }
    }

    /// Poll the provider for a transaction that has not called back yet.
    ///
    /// Returns the stored state untouched when the callback already
    /// arrived or the transaction is settled; only a live PROCESSING
    /// transaction without a callback triggers a provider round trip.
    pub async fn check_status(&self, payment_id: Uuid) -> CoreResult<PaymentStatusView> {
        let payment = self
            .ledger
            .payment(payment_id)
            .ok_or_else(|| CoreError::not_found("payment", payment_id))?;
        let txn = self
            .ledger
            .transaction_for_payment(payment_id)
            .ok_or_else(|| CoreError::not_found("transaction", payment_id))?;

        if txn.status == TransactionStatus::Processing && !txn.callback_received {
            let provider_txn_id = txn.provider_txn_id.clone().ok_or_else(|| {
                CoreError::invalid_state("transaction", "acknowledged", "no provider txn id")
            })?;
            let report = self
                .gateway
                .poll_status(txn.provider, &provider_txn_id)
                .await?;

            if report.status != ProviderPaymentStatus::Pending {
                let _guard = self.ledger.lock_prescription(payment.prescription_id).await;

                // Re-read: the callback may have landed while we polled.
                let mut txn = self
                    .ledger
                    .transaction(txn.id)
                    .ok_or_else(|| CoreError::not_found("transaction", txn.id))?;
                if !txn.status.is_terminal() {
                    // Settling via poll closes the callback window too.
                    txn.callback_received = true;
                    self.settle(txn, report.status, None).await?;
                }
            }
        }

        self.status_view(payment_id)
    }

    /// Current reconciliation state of a payment, from storage only.
    pub fn status_view(&self, payment_id: Uuid) -> CoreResult<PaymentStatusView> {
        let payment = self
            .ledger
            .payment(payment_id)
            .ok_or_else(|| CoreError::not_found("payment", payment_id))?;
        let txn = self
            .ledger
            .transaction_for_payment(payment_id)
            .ok_or_else(|| CoreError::not_found("transaction", payment_id))?;

        Ok(PaymentStatusView {
            payment_id: payment.id,
            payment_status: payment.status,
            transaction_status: txn.status,
            callback_received: txn.callback_received,
            qr_token: payment.qr_token,
            qr_image: payment.qr_image,
            error_message: txn.error_message,
        })
    }

    /// Forge a signed provider callback against the sandbox gateway.
    ///
    /// Refused outright when the wired gateway is a real one; simulated
    /// outcomes must never reach production state.
    pub async fn simulate_callback(
        &self,
        payment_id: Uuid,
        outcome: ProviderPaymentStatus,
        actor: Actor,
    ) -> CoreResult<MomoTransaction> {
        if !self.gateway.is_sandbox() {
            return Err(CoreError::Forbidden(
                "simulated callbacks are only available against the sandbox gateway".into(),
            ));
        }
        if !matches!(actor.role, Role::Cashier | Role::Admin) {
            return Err(CoreError::Forbidden(
                "only cashiers can simulate callbacks".into(),
            ));
        }

        let payment = self
            .ledger
            .payment(payment_id)
            .ok_or_else(|| CoreError::not_found("payment", payment_id))?;
        let txn = self
            .ledger
            .transaction_for_payment(payment_id)
            .ok_or_else(|| CoreError::not_found("transaction", payment_id))?;
        let provider_txn_id = txn.provider_txn_id.clone().ok_or_else(|| {
            CoreError::invalid_state("transaction", "acknowledged", "no provider txn id")
        })?;

        let payload = CallbackPayload {
            reference: format!("EXF-{}", payment.number),
            transaction_id: provider_txn_id,
            status: outcome,
            amount: payment.amount,
            message: Some("simulated callback".into()),
        };
        let raw = serde_json::to_string(&payload)
            .map_err(|e| CoreError::InvalidInput(e.to_string()))?;
        let secret = self.gateway.callback_secret(txn.provider)?;
        let signature_hex = signature::sign(secret, &raw);

        self.process_callback(txn.provider, &raw, Some(&signature_hex))
            .await
    }

    /// Transactions still PROCESSING after `older_than`, for operator
    /// review. Nothing is auto-failed.
    pub fn stuck_transactions(&self, older_than: Duration) -> Vec<MomoTransaction> {
        self.ledger.stuck_transactions(Utc::now() - older_than)
    }

    /// Commit a terminal provider outcome. Caller holds the prescription
    /// lock and has verified the transaction is not already terminal.
    async fn settle(
        &self,
        mut txn: MomoTransaction,
        outcome: ProviderPaymentStatus,
        message: Option<String>,
    ) -> CoreResult<MomoTransaction> {
        let now = Utc::now();
        let mut payment = self
            .ledger
            .payment(txn.payment_id)
            .ok_or_else(|| CoreError::not_found("payment", txn.payment_id))?;

        match outcome {
            ProviderPaymentStatus::Success => {
                let mut prescription = match self.settled_prescription(&payment) {
                    Ok(p) => p,
                    Err(err) => {
                        // Money moved at the provider but the prescription
                        // was settled another way in the meantime. Keep the
                        // full callback trace on the terminal transaction so
                        // the operator can reconcile and refund.
                        txn.status = TransactionStatus::Failed;
                        txn.error_message = Some(format!(
                            "success reported for already-settled prescription: {err}"
                        ));
                        txn.completed_at = Some(now);
                        payment.status = PaymentStatus::Failed;
                        self.ledger.update_payment(payment.clone());
                        self.ledger.update_transaction(txn);
                        tracing::error!(
                            payment_id = %payment.id,
                            "provider success for a prescription no longer payable; flagged for refund"
                        );
                        return Err(err);
                    }
                };
                txn.status = TransactionStatus::Success;
                txn.completed_at = Some(now);
                payment.status = PaymentStatus::Success;
                prescription.mark_paid(now);
                attach_receipt(&self.ledger, &mut payment, &prescription, now)?;
                self.ledger.update_prescription(prescription);
                tracing::info!(payment_id = %payment.id, "mobile money payment settled");
            }
            ProviderPaymentStatus::Failed => {
                txn.status = TransactionStatus::Failed;
                txn.error_message = message;
                txn.completed_at = Some(now);
                payment.status = PaymentStatus::Failed;
                tracing::warn!(payment_id = %payment.id, "mobile money payment failed");
            }
            ProviderPaymentStatus::Cancelled => {
                txn.status = TransactionStatus::Cancelled;
                txn.error_message = message;
                txn.completed_at = Some(now);
                payment.status = PaymentStatus::Failed;
                tracing::info!(payment_id = %payment.id, "mobile money payment cancelled by customer");
            }
            ProviderPaymentStatus::Pending => {
                // Not terminal; callers filter this out.
            }
        }

        self.ledger.update_payment(payment);
        self.ledger.update_transaction(txn.clone());
        Ok(txn)
    }

    fn settled_prescription(&self, payment: &Payment) -> CoreResult<Prescription> {
        let prescription = self
            .ledger
            .prescription(payment.prescription_id)
            .ok_or_else(|| CoreError::not_found("prescription", payment.prescription_id))?;
        if prescription.status != PrescriptionStatus::Pending {
            return Err(CoreError::invalid_state(
                "prescription",
                "PENDING",
                prescription.status,
            ));
        }
        Ok(prescription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::PaymentService;
    use crate::prescriptions::PrescriptionService;
    use crate::sequence::CountingSequences;
    use crate::testing;
    use examflow_momo::{AdapterResult, InitiateAck, SandboxGateway, StatusReport};

    const SECRET: &str = "sandbox-secret";

    struct Harness {
        ledger: Arc<Ledger>,
        prescriptions: PrescriptionService,
        payments: PaymentService,
        reconciliation: ReconciliationService,
    }

    fn harness(gateway: SandboxGateway) -> Harness {
        harness_with(gateway)
    }

    fn harness_with<G: ProviderGateway + 'static>(gateway: G) -> Harness {
        let ledger = Arc::new(Ledger::new());
        let sequences: Arc<dyn SequenceGenerator> = Arc::new(CountingSequences::new());
        let prescriptions =
            PrescriptionService::new(Arc::clone(&ledger), Arc::clone(&sequences));
        let payments = PaymentService::new(Arc::clone(&ledger), Arc::clone(&sequences));
        let reconciliation = ReconciliationService::new(
            Arc::clone(&ledger),
            sequences,
            Arc::new(gateway),
            CoreConfig::new("http://localhost:5000").unwrap(),
        );
        Harness {
            ledger,
            prescriptions,
            payments,
            reconciliation,
        }
    }

    /// Gateway whose status poll parks on a gate, so a callback can be
    /// delivered while the poll round trip is still in flight.
    struct GatedPollGateway {
        inner: SandboxGateway,
        entered: Arc<tokio::sync::Semaphore>,
        release: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait::async_trait]
    impl ProviderGateway for GatedPollGateway {
        async fn initiate(&self, req: InitiateRequest) -> AdapterResult<InitiateAck> {
            self.inner.initiate(req).await
        }

        async fn poll_status(
            &self,
            provider: Provider,
            provider_txn_id: &str,
        ) -> AdapterResult<StatusReport> {
            self.entered.add_permits(1);
            let _permit = self.release.acquire().await.expect("gate closed");
            self.inner.poll_status(provider, provider_txn_id).await
        }

        fn callback_secret(&self, provider: Provider) -> AdapterResult<&str> {
            self.inner.callback_secret(provider)
        }

        fn is_sandbox(&self) -> bool {
            true
        }
    }

    fn signed_callback(txn: &MomoTransaction, payment: &Payment, status: ProviderPaymentStatus) -> (String, String) {
        let payload = CallbackPayload {
            reference: format!("EXF-{}", payment.number),
            transaction_id: txn.provider_txn_id.clone().unwrap(),
            status,
            amount: payment.amount,
            message: None,
        };
        let raw = serde_json::to_string(&payload).unwrap();
        let sig = signature::sign(SECRET, &raw);
        (raw, sig)
    }

    async fn initiated(h: &Harness) -> (Payment, MomoTransaction) {
        let prescription =
            testing::seed_prescription(&h.ledger, &h.prescriptions, testing::doctor());
        h.reconciliation
            .initiate(
                prescription.id,
                Provider::ProviderA,
                NonEmptyText::new("90112233").unwrap(),
                testing::cashier(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_moves_transaction_to_processing() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, txn) = initiated(&h).await;

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(txn.status, TransactionStatus::Processing);
        assert!(txn.provider_txn_id.is_some());
        assert_eq!(payment.transaction_reference, txn.provider_txn_id);

        // The prescription is untouched until money actually moves.
        let p = h.ledger.prescription(payment.prescription_id).unwrap();
        assert_eq!(p.status, PrescriptionStatus::Pending);
    }

    #[tokio::test]
    async fn test_initiate_rejection_records_failed_attempt() {
        let h = harness(SandboxGateway::new(SECRET).rejecting_initiate("insufficient funds"));
        let prescription =
            testing::seed_prescription(&h.ledger, &h.prescriptions, testing::doctor());

        let err = h
            .reconciliation
            .initiate(
                prescription.id,
                Provider::ProviderA,
                NonEmptyText::new("90112233").unwrap(),
                testing::cashier(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Adapter(_)));

        // Failed attempt is kept for audit; prescription can be retried.
        let attempts = h.ledger.payments_for_prescription(prescription.id);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, PaymentStatus::Failed);
        let p = h.ledger.prescription(prescription.id).unwrap();
        assert_eq!(p.status, PrescriptionStatus::Pending);
    }

    #[tokio::test]
    async fn test_success_callback_settles_payment() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, txn) = initiated(&h).await;
        let (raw, sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Success);

        let settled = h
            .reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Success);
        assert!(settled.callback_received);

        let payment = h.ledger.payment(payment.id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert!(payment.qr_token.is_some());

        let p = h.ledger.prescription(payment.prescription_id).unwrap();
        assert_eq!(p.status, PrescriptionStatus::Paid);
    }

    #[tokio::test]
    async fn test_failed_callback_keeps_prescription_payable() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, txn) = initiated(&h).await;
        let (raw, sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Failed);

        h.reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap();

        let payment = h.ledger.payment(payment.id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert!(payment.qr_token.is_none());
        let p = h.ledger.prescription(payment.prescription_id).unwrap();
        assert_eq!(p.status, PrescriptionStatus::Pending);
    }

    #[tokio::test]
    async fn test_callback_with_bad_signature_mutates_nothing() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, txn) = initiated(&h).await;
        let (raw, _) = signed_callback(&txn, &payment, ProviderPaymentStatus::Success);

        let err = h
            .reconciliation
            .process_callback(Provider::ProviderA, &raw, Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCallback(_)));

        let missing = h
            .reconciliation
            .process_callback(Provider::ProviderA, &raw, None)
            .await
            .unwrap_err();
        assert!(matches!(missing, CoreError::InvalidCallback(_)));

        let stored = h.ledger.transaction(txn.id).unwrap();
        assert_eq!(stored.status, TransactionStatus::Processing);
        assert!(!stored.callback_received);
    }

    #[tokio::test]
    async fn test_callback_for_unknown_transaction_is_not_found() {
        let h = harness(SandboxGateway::new(SECRET));
        let raw = r#"{"reference":"EXF-X","transaction_id":"PROVIDER_A_nope","status":"SUCCESS","amount":5000}"#;
        let sig = signature::sign(SECRET, raw);

        let err = h
            .reconciliation
            .process_callback(Provider::ProviderA, raw, Some(&sig))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_callback_is_a_no_op() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, txn) = initiated(&h).await;
        let (raw, sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Success);

        h.reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap();
        let first_payload = h.ledger.transaction(txn.id).unwrap().callback_payload;

        // A replay with a FAILED outcome must not flip anything back.
        let (replay, replay_sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Failed);
        let settled = h
            .reconciliation
            .process_callback(Provider::ProviderA, &replay, Some(&replay_sig))
            .await
            .unwrap();

        assert_eq!(settled.status, TransactionStatus::Success);
        let stored = h.ledger.transaction(txn.id).unwrap();
        assert_eq!(stored.callback_payload, first_payload);
        assert_eq!(
            h.ledger.payment(payment.id).unwrap().status,
            PaymentStatus::Success
        );
    }

    #[tokio::test]
    async fn test_success_callback_after_cash_settlement_keeps_audit_trail() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, txn) = initiated(&h).await;

        // Cash settles the prescription while the customer is still
        // confirming on their handset.
        h.payments
            .record(payment.prescription_id, PaymentMethod::Cash, testing::cashier())
            .await
            .unwrap();

        let (raw, sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Success);
        let err = h
            .reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));

        // The callback lost, but its trace must survive for the refund.
        let stored = h.ledger.transaction(txn.id).unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert!(stored.callback_received);
        assert_eq!(stored.callback_payload.as_deref(), Some(raw.as_str()));
        assert!(stored.error_message.is_some());

        // Momo attempt failed; the cash settlement stands untouched.
        assert_eq!(
            h.ledger.payment(payment.id).unwrap().status,
            PaymentStatus::Failed
        );
        let p = h.ledger.prescription(payment.prescription_id).unwrap();
        assert_eq!(p.status, PrescriptionStatus::Paid);

        // The transaction is now terminal, so a redelivery is a no-op.
        let replay = h
            .reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap();
        assert_eq!(replay.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_callback_landing_mid_poll_commits_once() {
        let entered = Arc::new(tokio::sync::Semaphore::new(0));
        let release = Arc::new(tokio::sync::Semaphore::new(0));
        // The poll would report FAILED; if it applied after the success
        // callback it would contradict the settled state.
        let h = harness_with(GatedPollGateway {
            inner: SandboxGateway::new(SECRET)
                .with_poll_outcome(ProviderPaymentStatus::Failed),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        let (payment, txn) = initiated(&h).await;

        let reconciliation = h.reconciliation.clone();
        let payment_id = payment.id;
        let poll = tokio::spawn(async move { reconciliation.check_status(payment_id).await });

        // Park the poll inside the provider round trip, deliver the
        // success callback, then let the poll resume and lose the race.
        let _entered = entered.acquire().await.unwrap();
        let (raw, sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Success);
        h.reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap();
        release.add_permits(1);

        let view = poll.await.unwrap().unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Success);
        assert_eq!(view.transaction_status, TransactionStatus::Success);

        let stored = h.ledger.transaction(txn.id).unwrap();
        assert_eq!(stored.status, TransactionStatus::Success);
        assert!(stored.callback_received);
        assert_eq!(
            h.ledger.prescription(payment.prescription_id).unwrap().status,
            PrescriptionStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_poll_settles_when_no_callback_arrived() {
        let h = harness(SandboxGateway::new(SECRET).with_poll_outcome(ProviderPaymentStatus::Success));
        let (payment, _txn) = initiated(&h).await;

        let view = h.reconciliation.check_status(payment.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Success);
        assert_eq!(view.transaction_status, TransactionStatus::Success);
        assert!(view.callback_received);
        assert!(view.qr_token.is_some());
    }

    #[tokio::test]
    async fn test_poll_after_callback_does_not_hit_provider() {
        // Poll outcome is scripted to FAILED; if the poll ran after the
        // success callback it would contradict the stored state.
        let h = harness(SandboxGateway::new(SECRET).with_poll_outcome(ProviderPaymentStatus::Failed));
        let (payment, txn) = initiated(&h).await;
        let (raw, sig) = signed_callback(&txn, &payment, ProviderPaymentStatus::Success);
        h.reconciliation
            .process_callback(Provider::ProviderA, &raw, Some(&sig))
            .await
            .unwrap();

        let view = h.reconciliation.check_status(payment.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Success);
        assert_eq!(view.transaction_status, TransactionStatus::Success);
    }

    #[tokio::test]
    async fn test_poll_still_pending_is_a_no_op() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, _txn) = initiated(&h).await;

        let view = h.reconciliation.check_status(payment.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Pending);
        assert_eq!(view.transaction_status, TransactionStatus::Processing);
        assert!(!view.callback_received);
    }

    #[tokio::test]
    async fn test_simulate_callback_settles_via_signed_path() {
        let h = harness(SandboxGateway::new(SECRET));
        let (payment, _txn) = initiated(&h).await;

        let settled = h
            .reconciliation
            .simulate_callback(payment.id, ProviderPaymentStatus::Success, testing::cashier())
            .await
            .unwrap();
        assert_eq!(settled.status, TransactionStatus::Success);
        assert_eq!(
            h.ledger.payment(payment.id).unwrap().status,
            PaymentStatus::Success
        );
    }

    #[tokio::test]
    async fn test_stuck_transactions_reports_old_processing() {
        let h = harness(SandboxGateway::new(SECRET));
        let (_payment, txn) = initiated(&h).await;

        assert!(h
            .reconciliation
            .stuck_transactions(Duration::minutes(30))
            .is_empty());
        let mut aged = h.ledger.transaction(txn.id).unwrap();
        aged.created_at = Utc::now() - Duration::hours(2);
        h.ledger.update_transaction(aged);

        let stuck = h.reconciliation.stuck_transactions(Duration::minutes(30));
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].id, txn.id);
    }
}
