//! Examflow server binary.
//!
//! Composition root: reads configuration from the environment, wires the
//! core services over one shared ledger, picks the mobile money gateway
//! (sandbox or real HTTP), seeds demo data when asked, and serves the
//! REST API.

use std::sync::Arc;

use api_rest::AppState;
use examflow_core::{
    CatalogEntry, CoreConfig, CountingSequences, FulfillmentService, Ledger, Patient,
    PaymentService, PrescriptionService, ReconciliationService, SequenceGenerator,
};
use examflow_momo::{GatewayConfig, HttpGateway, ProviderConfig, ProviderGateway, SandboxGateway};
use examflow_types::ExamCategory;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Main entry point for the examflow server
///
/// Starts the REST API server on the configured address (default:
/// 0.0.0.0:5000), with OpenAPI docs under `/swagger-ui`.
///
/// # Environment Variables
/// - `EXAMFLOW_REST_ADDR`: server address (default: "0.0.0.0:5000")
/// - `EXAMFLOW_PUBLIC_URL`: public base URL handed to providers for
///   callbacks (default: "http://localhost:5000")
/// - `EXAMFLOW_GATEWAY`: "sandbox" (default) or "http"
/// - `EXAMFLOW_SANDBOX_SECRET`: callback secret for the sandbox gateway
/// - `PROVIDER_A_BASE_URL` / `PROVIDER_A_MERCHANT_ID` /
///   `PROVIDER_A_API_KEY` / `PROVIDER_A_SECRET_KEY`: provider A
///   credentials for the HTTP gateway (same pattern for `PROVIDER_B_*`)
/// - `EXAMFLOW_SEED_DEMO`: seed demo patients and catalog when "1"
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the gateway or public URL configuration is invalid, or
/// - the server address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examflow=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("EXAMFLOW_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".into());
    let public_url =
        std::env::var("EXAMFLOW_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:5000".into());

    tracing::info!("++ Starting examflow REST on {}", addr);

    let gateway = build_gateway()?;
    let config = CoreConfig::new(public_url)?;

    let ledger = Arc::new(Ledger::new());
    if std::env::var("EXAMFLOW_SEED_DEMO").as_deref() == Ok("1") {
        seed_demo_data(&ledger);
    }

    let sequences: Arc<dyn SequenceGenerator> = Arc::new(CountingSequences::new());
    let state = AppState {
        prescriptions: PrescriptionService::new(Arc::clone(&ledger), Arc::clone(&sequences)),
        payments: PaymentService::new(Arc::clone(&ledger), Arc::clone(&sequences)),
        reconciliation: ReconciliationService::new(
            Arc::clone(&ledger),
            sequences,
            gateway,
            config,
        ),
        fulfillment: FulfillmentService::new(ledger),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api_rest::router(state)).await?;

    Ok(())
}

/// Select and configure the mobile money gateway from the environment.
fn build_gateway() -> anyhow::Result<Arc<dyn ProviderGateway>> {
    let kind = std::env::var("EXAMFLOW_GATEWAY").unwrap_or_else(|_| "sandbox".into());
    match kind.as_str() {
        "sandbox" => {
            let secret = std::env::var("EXAMFLOW_SANDBOX_SECRET")
                .unwrap_or_else(|_| "sandbox-secret".into());
            tracing::info!("using sandbox mobile money gateway");
            Ok(Arc::new(SandboxGateway::new(secret)))
        }
        "http" => {
            let cfg = GatewayConfig {
                provider_a: provider_config_from_env("PROVIDER_A"),
                provider_b: provider_config_from_env("PROVIDER_B"),
            };
            if cfg.provider_a.is_none() && cfg.provider_b.is_none() {
                anyhow::bail!("EXAMFLOW_GATEWAY=http but no provider credentials are set");
            }
            tracing::info!(
                provider_a = cfg.provider_a.is_some(),
                provider_b = cfg.provider_b.is_some(),
                "using HTTP mobile money gateway"
            );
            Ok(Arc::new(HttpGateway::new(cfg)?))
        }
        other => anyhow::bail!("unknown EXAMFLOW_GATEWAY value: {other}"),
    }
}

/// Read one provider's credentials; all four variables must be present.
fn provider_config_from_env(prefix: &str) -> Option<ProviderConfig> {
    Some(ProviderConfig {
        base_url: std::env::var(format!("{prefix}_BASE_URL")).ok()?,
        merchant_id: std::env::var(format!("{prefix}_MERCHANT_ID")).ok()?,
        api_key: std::env::var(format!("{prefix}_API_KEY")).ok()?,
        secret_key: std::env::var(format!("{prefix}_SECRET_KEY")).ok()?,
    })
}

/// A small demo dataset so the API is usable straight after boot.
fn seed_demo_data(ledger: &Ledger) {
    let patients = [
        ("PAT-0001", "Ama", "Koffi"),
        ("PAT-0002", "Kodjo", "Mensah"),
    ];
    for (number, first, last) in patients {
        ledger.insert_patient(Patient {
            id: Uuid::new_v4(),
            number: number.into(),
            first_name: first.into(),
            last_name: last.into(),
        });
    }

    let catalog = [
        ("RX-THORAX", "Radiographie du thorax", ExamCategory::Radiology, 15000),
        ("ECHO-ABD", "Echographie abdominale", ExamCategory::Radiology, 25000),
        ("NFS", "Numeration formule sanguine", ExamCategory::Laboratory, 5000),
        ("GLY", "Glycemie a jeun", ExamCategory::Laboratory, 3000),
    ];
    for (code, name, category, price) in catalog {
        ledger.insert_catalog_entry(CatalogEntry {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            category,
            price,
            active: true,
        });
    }

    tracing::info!("seeded demo patients and exam catalog");
}
