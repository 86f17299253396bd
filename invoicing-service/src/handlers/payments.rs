use axum::extract::{Path, Query, State};
use service_core::error::AppError;
use service_core::response::ApiResponse;

use crate::dtos::{CapturedPayment, PaymentListParams};
use crate::middleware::{AuthUser, ADMIN_OR_INVOICING};
use crate::models::PaymentRecord;
use crate::services::WorkflowReport;
use crate::startup::AppState;
use crate::utils::JsonBody;

/// Run the post-payment workflow. Only a failure to record the payment is an
/// error; later steps report their outcome in the body.
pub async fn process_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(captured): JsonBody<CapturedPayment>,
) -> Result<ApiResponse<WorkflowReport>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let report = state
        .payment_workflow
        .process(auth.org_id(), captured)
        .await?;

    let message = if report.is_complete() {
        "Payment processed"
    } else {
        "Payment recorded; some follow-up steps failed"
    };
    Ok(ApiResponse::ok(message, report))
}

pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<PaymentListParams>,
) -> Result<ApiResponse<Vec<PaymentRecord>>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let payments = state
        .repo
        .list_payments(auth.org_id(), params.contact_id)
        .await?;
    Ok(ApiResponse::ok("Payments retrieved", payments))
}

pub async fn get_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(payment_id): Path<String>,
) -> Result<ApiResponse<PaymentRecord>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let payment = state
        .repo
        .find_payment(auth.org_id(), &payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;
    Ok(ApiResponse::ok("Payment retrieved", payment))
}
