//! # API REST
//!
//! REST API implementation for examflow.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status mapping)
//!
//! Uses `api-shared` for DTOs, health, and caller identity extraction.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use api_shared::auth::actor_from_headers;
use api_shared::dto::{
    CallbackAckRes, CompleteExamReq, CompletionRes, CreatePrescriptionReq, ErrorRes, ExamLineRes,
    HealthRes, InitiateMomoReq, InitiateMomoRes, PatientRes, PaymentRes, PaymentStatusRes,
    PendingPrescriptionsRes, PrescriptionRes, RecordPaymentReq, SimulateCallbackReq,
    SimulatedOutcome, StuckTransactionsRes, TransactionRes, VerifyQrReq, VerifyQrRes,
    WorkItemRes, WorkQueueRes,
};
use api_shared::HealthService;
use examflow_core::{
    CoreError, FulfillmentService, PaymentService, PrescriptionService, ReconciliationService,
};
use examflow_types::{NonEmptyText, Provider};

/// Application state shared across REST API handlers
///
/// Holds one clone of each core service; the services share the ledger
/// and sequence generator internally.
#[derive(Clone)]
pub struct AppState {
    pub prescriptions: PrescriptionService,
    pub payments: PaymentService,
    pub reconciliation: ReconciliationService,
    pub fulfillment: FulfillmentService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_prescription,
        pending_prescriptions,
        get_prescription,
        cancel_prescription,
        record_payment,
        get_payment,
        payment_qrcode,
        initiate_momo,
        momo_callback,
        momo_status,
        simulate_callback,
        stuck_transactions,
        verify_qr,
        services_pending,
        start_exam,
        complete_exam,
        my_exams,
        in_progress_exams,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        CreatePrescriptionReq,
        PrescriptionRes,
        PendingPrescriptionsRes,
        ExamLineRes,
        RecordPaymentReq,
        PaymentRes,
        InitiateMomoReq,
        InitiateMomoRes,
        TransactionRes,
        PaymentStatusRes,
        CallbackAckRes,
        SimulateCallbackReq,
        SimulatedOutcome,
        StuckTransactionsRes,
        VerifyQrReq,
        VerifyQrRes,
        PatientRes,
        WorkItemRes,
        WorkQueueRes,
        CompleteExamReq,
        CompletionRes,
    ))
)]
struct ApiDoc;

/// Build the REST router with all routes, Swagger UI, and CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/prescriptions", post(create_prescription))
        .route("/api/prescriptions/pending", get(pending_prescriptions))
        .route("/api/prescriptions/:id", get(get_prescription))
        .route("/api/prescriptions/:id/cancel", patch(cancel_prescription))
        .route("/api/payments", post(record_payment))
        .route("/api/payments/mobile-money/initiate", post(initiate_momo))
        .route(
            "/api/payments/mobile-money/callback/:provider",
            post(momo_callback),
        )
        .route("/api/payments/mobile-money/stuck", get(stuck_transactions))
        .route("/api/payments/mobile-money/:id/status", get(momo_status))
        .route(
            "/api/payments/mobile-money/:id/simulate-callback",
            post(simulate_callback),
        )
        .route("/api/payments/:id", get(get_payment))
        .route("/api/payments/:id/qrcode", get(payment_qrcode))
        .route("/api/services/verify-qr", post(verify_qr))
        .route("/api/services/pending", get(services_pending))
        .route("/api/services/exams/:id/start", patch(start_exam))
        .route("/api/services/exams/:id/complete", patch(complete_exam))
        .route("/api/services/my-exams", get(my_exams))
        .route("/api/services/in-progress", get(in_progress_exams))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorRes>);

/// Map a core error onto its HTTP status and uniform error body.
fn core_error(err: CoreError) -> ApiError {
    let status = match &err {
        CoreError::NotFound { .. } | CoreError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::InvalidState { .. } => StatusCode::CONFLICT,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::InvalidInput(_)
        | CoreError::MalformedToken(_)
        | CoreError::InvalidCallback(_)
        | CoreError::PaymentNotSuccessful { .. }
        | CoreError::NoRelevantExams(_) => StatusCode::BAD_REQUEST,
        CoreError::Adapter(_) => StatusCode::BAD_GATEWAY,
        CoreError::Receipt(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("request failed: {err}");
    }
    (
        status,
        Json(ErrorRes {
            error: err.to_string(),
        }),
    )
}

fn auth_error((status, message): (StatusCode, &'static str)) -> ApiError {
    (
        status,
        Json(ErrorRes {
            error: message.to_string(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/api/prescriptions",
    request_body = CreatePrescriptionReq,
    responses(
        (status = 200, description = "Prescription created", body = PrescriptionRes),
        (status = 400, description = "Unknown or inactive exams", body = ErrorRes),
        (status = 403, description = "Caller is not a doctor", body = ErrorRes)
    )
)]
/// Create a new exam prescription
///
/// Snapshots exam prices from the catalog and opens the prescription in
/// PENDING, awaiting payment at the cashier desk.
///
/// # Errors
/// Returns `400` when an exam id is unknown or inactive, `403` when the
/// caller is not a doctor, `404` when the patient does not exist.
#[axum::debug_handler]
async fn create_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePrescriptionReq>,
) -> Result<Json<PrescriptionRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let prescription = state
        .prescriptions
        .create(req.patient_id, &req.exam_ids, req.notes, actor)
        .map_err(core_error)?;
    Ok(Json(prescription.into()))
}

#[utoipa::path(
    get,
    path = "/api/prescriptions/pending",
    responses(
        (status = 200, description = "Prescriptions awaiting payment", body = PendingPrescriptionsRes)
    )
)]
/// Cashier queue: prescriptions awaiting payment, oldest first
#[axum::debug_handler]
async fn pending_prescriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PendingPrescriptionsRes>, ApiError> {
    actor_from_headers(&headers).map_err(auth_error)?;
    let prescriptions = state
        .prescriptions
        .pending()
        .into_iter()
        .map(PrescriptionRes::from)
        .collect();
    Ok(Json(PendingPrescriptionsRes { prescriptions }))
}

#[utoipa::path(
    get,
    path = "/api/prescriptions/{id}",
    responses(
        (status = 200, description = "Prescription detail", body = PrescriptionRes),
        (status = 404, description = "Unknown prescription", body = ErrorRes)
    )
)]
/// Fetch one prescription with its exam lines
#[axum::debug_handler]
async fn get_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Json<PrescriptionRes>, ApiError> {
    actor_from_headers(&headers).map_err(auth_error)?;
    let prescription = state.prescriptions.get(id).map_err(core_error)?;
    Ok(Json(prescription.into()))
}

#[utoipa::path(
    patch,
    path = "/api/prescriptions/{id}/cancel",
    responses(
        (status = 200, description = "Prescription cancelled", body = PrescriptionRes),
        (status = 403, description = "Not the ordering doctor", body = ErrorRes),
        (status = 409, description = "Prescription is not PENDING", body = ErrorRes)
    )
)]
/// Cancel a PENDING prescription
///
/// Only the ordering doctor or an administrator may cancel; anything
/// already paid is immutable here.
#[axum::debug_handler]
async fn cancel_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Json<PrescriptionRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let prescription = state
        .prescriptions
        .cancel(id, actor)
        .await
        .map_err(core_error)?;
    Ok(Json(prescription.into()))
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = RecordPaymentReq,
    responses(
        (status = 200, description = "Payment recorded with QR receipt", body = PaymentRes),
        (status = 400, description = "Mobile money not accepted here", body = ErrorRes),
        (status = 409, description = "Prescription already settled", body = ErrorRes)
    )
)]
/// Record a synchronous cash or card payment
///
/// Settles the full prescription total in one step and returns the
/// payment with its QR receipt token and printable image.
///
/// # Errors
/// Returns `409` when a concurrent payment already settled the
/// prescription; `400` when the method is `MOBILE_MONEY`.
#[axum::debug_handler]
async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecordPaymentReq>,
) -> Result<Json<PaymentRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let payment = state
        .payments
        .record(req.prescription_id, req.method, actor)
        .await
        .map_err(core_error)?;
    Ok(Json(payment.into()))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}",
    responses(
        (status = 200, description = "Payment detail", body = PaymentRes),
        (status = 404, description = "Unknown payment", body = ErrorRes)
    )
)]
/// Fetch one payment
#[axum::debug_handler]
async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Json<PaymentRes>, ApiError> {
    actor_from_headers(&headers).map_err(auth_error)?;
    let payment = state.payments.get(id).map_err(core_error)?;
    Ok(Json(payment.into()))
}

#[utoipa::path(
    get,
    path = "/api/payments/{id}/qrcode",
    responses(
        (status = 200, description = "QR receipt as SVG", content_type = "image/svg+xml", body = String),
        (status = 404, description = "Unknown payment", body = ErrorRes),
        (status = 409, description = "Payment has no receipt yet", body = ErrorRes)
    )
)]
/// The printable QR receipt image for a successful payment
#[axum::debug_handler]
async fn payment_qrcode(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Response, ApiError> {
    actor_from_headers(&headers).map_err(auth_error)?;
    let svg = state.payments.qr_image(id).map_err(core_error)?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

#[utoipa::path(
    post,
    path = "/api/payments/mobile-money/initiate",
    request_body = InitiateMomoReq,
    responses(
        (status = 200, description = "Payment initiated, awaiting provider callback", body = InitiateMomoRes),
        (status = 502, description = "Provider rejected or unreachable", body = ErrorRes)
    )
)]
/// Initiate an asynchronous mobile money payment
///
/// The provider acknowledges and the customer confirms on their handset;
/// the outcome arrives via the signed callback or status polling.
///
/// # Errors
/// Returns `502` when the provider rejects or cannot be reached; the
/// failed attempt is kept and the prescription stays payable.
#[axum::debug_handler]
async fn initiate_momo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitiateMomoReq>,
) -> Result<Json<InitiateMomoRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let phone = NonEmptyText::new(&req.phone_number)
        .map_err(|_| core_error(CoreError::InvalidInput("phone number is required".into())))?;
    let (payment, transaction) = state
        .reconciliation
        .initiate(req.prescription_id, req.provider, phone, actor)
        .await
        .map_err(core_error)?;
    Ok(Json(InitiateMomoRes {
        payment: payment.into(),
        transaction: transaction.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/payments/mobile-money/callback/{provider}",
    responses(
        (status = 200, description = "Callback processed", body = CallbackAckRes),
        (status = 400, description = "Bad or unverifiable callback", body = ErrorRes),
        (status = 404, description = "Unknown transaction", body = ErrorRes)
    )
)]
/// Inbound provider callback
///
/// Unauthenticated: the provider proves itself with an HMAC signature
/// over the raw body in the `x-signature` header. The body must be read
/// verbatim, so this handler takes it as a raw string.
#[axum::debug_handler]
async fn momo_callback(
    State(state): State<AppState>,
    AxumPath(provider): AxumPath<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<CallbackAckRes>, ApiError> {
    let provider: Provider = provider.parse().map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorRes {
                error: format!("unknown provider: {provider}"),
            }),
        )
    })?;
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());

    let txn = state
        .reconciliation
        .process_callback(provider, &body, signature)
        .await
        .map_err(core_error)?;
    Ok(Json(CallbackAckRes {
        message: "Callback processed".into(),
        status: txn.status,
    }))
}

#[utoipa::path(
    get,
    path = "/api/payments/mobile-money/{id}/status",
    responses(
        (status = 200, description = "Live reconciliation status", body = PaymentStatusRes),
        (status = 404, description = "Unknown payment", body = ErrorRes)
    )
)]
/// Where a mobile money payment stands
///
/// Polls the provider when the transaction is still live and no callback
/// has arrived; otherwise answers from storage.
#[axum::debug_handler]
async fn momo_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Json<PaymentStatusRes>, ApiError> {
    actor_from_headers(&headers).map_err(auth_error)?;
    let view = state
        .reconciliation
        .check_status(id)
        .await
        .map_err(core_error)?;
    Ok(Json(view.into()))
}

#[utoipa::path(
    post,
    path = "/api/payments/mobile-money/{id}/simulate-callback",
    request_body = SimulateCallbackReq,
    responses(
        (status = 200, description = "Simulated callback applied", body = TransactionRes),
        (status = 403, description = "Not available outside the sandbox", body = ErrorRes)
    )
)]
/// Inject a provider outcome against the sandbox gateway
///
/// Development aid: forges a correctly signed callback. Refused when the
/// wired gateway is a real one.
#[axum::debug_handler]
async fn simulate_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
    Json(req): Json<SimulateCallbackReq>,
) -> Result<Json<TransactionRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let txn = state
        .reconciliation
        .simulate_callback(id, req.outcome.into(), actor)
        .await
        .map_err(core_error)?;
    Ok(Json(txn.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StuckQuery {
    older_than_minutes: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/payments/mobile-money/stuck",
    responses(
        (status = 200, description = "Transactions still processing past the cutoff", body = StuckTransactionsRes)
    )
)]
/// Operational view of transactions stuck in PROCESSING
#[axum::debug_handler]
async fn stuck_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StuckQuery>,
) -> Result<Json<StuckTransactionsRes>, ApiError> {
    actor_from_headers(&headers).map_err(auth_error)?;
    let cutoff = chrono::Duration::minutes(query.older_than_minutes.unwrap_or(30));
    let transactions = state
        .reconciliation
        .stuck_transactions(cutoff)
        .into_iter()
        .map(TransactionRes::from)
        .collect();
    Ok(Json(StuckTransactionsRes { transactions }))
}

#[utoipa::path(
    post,
    path = "/api/services/verify-qr",
    request_body = VerifyQrReq,
    responses(
        (status = 200, description = "Receipt verified against live state", body = VerifyQrRes),
        (status = 400, description = "Malformed token or unpaid receipt", body = ErrorRes),
        (status = 404, description = "Payment named by the token not found", body = ErrorRes)
    )
)]
/// Verify a scanned QR receipt at a service desk
///
/// Decodes the token, re-checks the payment against live state, and
/// returns only the exams of the scanning desk's category.
#[axum::debug_handler]
async fn verify_qr(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyQrReq>,
) -> Result<Json<VerifyQrRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let result = state
        .fulfillment
        .scan_and_verify(&req.qr_data, actor)
        .map_err(core_error)?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/api/services/pending",
    responses(
        (status = 200, description = "Paid exams awaiting this desk", body = WorkQueueRes),
        (status = 403, description = "Caller has no service desk", body = ErrorRes)
    )
)]
/// The desk's work queue of paid, unstarted exams
#[axum::debug_handler]
async fn services_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WorkQueueRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let rows = state.fulfillment.pending_queue(actor).map_err(core_error)?;
    Ok(Json(rows.into()))
}

#[utoipa::path(
    patch,
    path = "/api/services/exams/{id}/start",
    responses(
        (status = 200, description = "Exam taken into progress", body = ExamLineRes),
        (status = 409, description = "Exam is not PAID", body = ErrorRes)
    )
)]
/// Start a paid exam, claiming it for the caller
#[axum::debug_handler]
async fn start_exam(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Json<ExamLineRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let line = state
        .fulfillment
        .start_exam(id, actor)
        .await
        .map_err(core_error)?;
    Ok(Json(line.into()))
}

#[utoipa::path(
    patch,
    path = "/api/services/exams/{id}/complete",
    request_body = CompleteExamReq,
    responses(
        (status = 200, description = "Exam completed", body = CompletionRes),
        (status = 403, description = "Caller did not start this exam", body = ErrorRes),
        (status = 409, description = "Exam is not IN_PROGRESS", body = ErrorRes)
    )
)]
/// Complete an exam the caller started
#[axum::debug_handler]
async fn complete_exam(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<uuid::Uuid>,
    Json(req): Json<CompleteExamReq>,
) -> Result<Json<CompletionRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let result = state
        .fulfillment
        .complete_exam(id, req.notes, actor)
        .await
        .map_err(core_error)?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/api/services/my-exams",
    responses(
        (status = 200, description = "Every exam the caller has claimed", body = WorkQueueRes)
    )
)]
/// Every exam the caller has claimed, any status
#[axum::debug_handler]
async fn my_exams(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WorkQueueRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    let rows: Vec<WorkItemRes> = state
        .fulfillment
        .my_exams(actor)
        .into_iter()
        .map(WorkItemRes::from)
        .collect();
    Ok(Json(WorkQueueRes { exams: rows }))
}

#[utoipa::path(
    get,
    path = "/api/services/in-progress",
    responses(
        (status = 200, description = "Exams the caller currently has open", body = WorkQueueRes)
    )
)]
/// Exams the caller currently has open
#[axum::debug_handler]
async fn in_progress_exams(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WorkQueueRes>, ApiError> {
    let actor = actor_from_headers(&headers).map_err(auth_error)?;
    Ok(Json(state.fulfillment.in_progress(actor).into()))
}
