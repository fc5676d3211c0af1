//! # Examflow Core
//!
//! The payment and fulfillment ledger for hospital medical exams: four
//! services over one shared in-memory [`store::Ledger`].
//!
//! - [`PrescriptionService`] — ordering and cancelling exam
//!   prescriptions, price snapshots included
//! - [`PaymentService`] — synchronous cash/card settlement and QR
//!   receipt generation
//! - [`ReconciliationService`] — the asynchronous mobile money
//!   initiate / callback / poll lifecycle
//! - [`FulfillmentService`] — receipt verification and exam line
//!   tracking at the radiology and laboratory desks
//!
//! Every multi-row state transition runs under a per-prescription lock,
//! so concurrent payments, callbacks, and polls against the same
//! prescription serialize instead of double-committing.

pub mod config;
pub mod domain;
pub mod error;
pub mod fulfillment;
pub mod payments;
pub mod prescriptions;
pub mod reconciliation;
pub mod sequence;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::CoreConfig;
pub use domain::{CatalogEntry, ExamLine, MomoTransaction, Patient, Payment, Prescription};
pub use error::{CoreError, CoreResult};
pub use fulfillment::{CompletionResult, FulfillmentService, ScanResult};
pub use payments::PaymentService;
pub use prescriptions::PrescriptionService;
pub use reconciliation::{PaymentStatusView, ReconciliationService};
pub use sequence::{CountingSequences, SequenceGenerator};
pub use store::Ledger;

#[cfg(test)]
mod tests {
    use super::*;
    use examflow_momo::{ProviderGateway, ProviderPaymentStatus, SandboxGateway};
    use examflow_types::{
        ExamCategory, NonEmptyText, PaymentMethod, PaymentStatus, PrescriptionStatus, Provider,
    };
    use std::sync::Arc;

    struct App {
        ledger: Arc<Ledger>,
        prescriptions: PrescriptionService,
        payments: PaymentService,
        reconciliation: ReconciliationService,
        fulfillment: FulfillmentService,
    }

    fn app() -> App {
        let ledger = Arc::new(Ledger::new());
        let sequences: Arc<dyn SequenceGenerator> = Arc::new(CountingSequences::new());
        let gateway: Arc<dyn ProviderGateway> =
            Arc::new(SandboxGateway::new("it-secret").with_poll_outcome(ProviderPaymentStatus::Success));
        App {
            prescriptions: PrescriptionService::new(Arc::clone(&ledger), Arc::clone(&sequences)),
            payments: PaymentService::new(Arc::clone(&ledger), Arc::clone(&sequences)),
            reconciliation: ReconciliationService::new(
                Arc::clone(&ledger),
                sequences,
                gateway,
                CoreConfig::new("http://localhost:5000").unwrap(),
            ),
            fulfillment: FulfillmentService::new(Arc::clone(&ledger)),
            ledger,
        }
    }

    /// End to end across the desks: order, pay mobile money, scan,
    /// fulfill both lines.
    #[tokio::test]
    async fn test_order_to_completed_via_mobile_money() {
        let app = app();
        let doctor = testing::doctor();
        let prescription =
            testing::seed_mixed_prescription(&app.ledger, &app.prescriptions, doctor);

        let (payment, _txn) = app
            .reconciliation
            .initiate(
                prescription.id,
                Provider::ProviderB,
                NonEmptyText::new("91223344").unwrap(),
                testing::cashier(),
            )
            .await
            .unwrap();

        // No callback arrives; the cashier's status poll settles it.
        let view = app.reconciliation.check_status(payment.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Success);
        let token = view.qr_token.unwrap();

        let radiologist = testing::radiologist();
        let scan = app.fulfillment.scan_and_verify(&token, radiologist).unwrap();
        let radio_line = scan.exams[0].id;
        app.fulfillment.start_exam(radio_line, radiologist).await.unwrap();
        app.fulfillment
            .complete_exam(radio_line, None, radiologist)
            .await
            .unwrap();

        let technician = testing::lab_technician();
        let scan = app.fulfillment.scan_and_verify(&token, technician).unwrap();
        let lab_line = scan.exams[0].id;
        app.fulfillment.start_exam(lab_line, technician).await.unwrap();
        let last = app
            .fulfillment
            .complete_exam(lab_line, None, technician)
            .await
            .unwrap();

        assert!(last.prescription_completed);
        assert_eq!(
            app.ledger.prescription(prescription.id).unwrap().status,
            PrescriptionStatus::Completed
        );
    }

    /// A desk rescan reflects live line state, not the printed statuses.
    #[tokio::test]
    async fn test_rescan_shows_live_statuses() {
        let app = app();
        let prescription =
            testing::seed_mixed_prescription(&app.ledger, &app.prescriptions, testing::doctor());
        let payment = app
            .payments
            .record(prescription.id, PaymentMethod::Cash, testing::cashier())
            .await
            .unwrap();
        let token = payment.qr_token.unwrap();

        let radiologist = testing::radiologist();
        let scan = app.fulfillment.scan_and_verify(&token, radiologist).unwrap();
        app.fulfillment
            .start_exam(scan.exams[0].id, radiologist)
            .await
            .unwrap();

        let rescan = app.fulfillment.scan_and_verify(&token, radiologist).unwrap();
        assert_eq!(
            rescan.exams[0].status,
            examflow_types::ExamLineStatus::InProgress
        );
    }

    /// Cancellation is closed off the moment payment settles.
    #[tokio::test]
    async fn test_paid_prescription_cannot_be_cancelled() {
        let app = app();
        let doctor = testing::doctor();
        let prescription = testing::seed_prescription(&app.ledger, &app.prescriptions, doctor);

        app.payments
            .record(prescription.id, PaymentMethod::Cash, testing::cashier())
            .await
            .unwrap();

        let result = app.prescriptions.cancel(prescription.id, doctor).await;
        assert!(matches!(result, Err(CoreError::InvalidState { .. })));
    }

    /// Service desk category routing is by role, end to end.
    #[tokio::test]
    async fn test_category_routing_is_disjoint() {
        let app = app();
        let prescription =
            testing::seed_mixed_prescription(&app.ledger, &app.prescriptions, testing::doctor());
        app.payments
            .record(prescription.id, PaymentMethod::Cash, testing::cashier())
            .await
            .unwrap();

        let radio_queue = app.fulfillment.pending_queue(testing::radiologist()).unwrap();
        let lab_queue = app.fulfillment.pending_queue(testing::lab_technician()).unwrap();

        assert_eq!(radio_queue.len(), 1);
        assert_eq!(lab_queue.len(), 1);
        assert_eq!(radio_queue[0].1.category, ExamCategory::Radiology);
        assert_eq!(lab_queue[0].1.category, ExamCategory::Laboratory);
        assert_ne!(radio_queue[0].1.id, lab_queue[0].1.id);
    }
}
