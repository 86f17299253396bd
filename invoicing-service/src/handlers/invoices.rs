use axum::extract::{Path, Query, State};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

use super::parse_id;
use crate::dtos::{CreateInvoiceRequest, InvoiceListParams, UpdateInvoiceStatusRequest};
use crate::middleware::{AuthUser, ADMIN_OR_INVOICING};
use crate::models::{Invoice, InvoiceFilter, StoredFile};
use crate::startup::AppState;
use crate::utils::JsonBody;

/// Validation runs inside the builder so that field and date errors are
/// reported together.
pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    JsonBody(req): JsonBody<CreateInvoiceRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let invoice = state.invoice_builder.create(auth.org_id(), req).await?;
    Ok(ApiResponse::created("Invoice created", invoice))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<InvoiceListParams>,
) -> Result<ApiResponse<Vec<Invoice>>, AppError> {
    let filter: InvoiceFilter = params.into();
    let invoices = state.repo.list_invoices(auth.org_id(), &filter).await?;
    Ok(ApiResponse::ok("Invoices retrieved", invoices))
}

async fn load(state: &AppState, org_id: Uuid, raw_id: &str) -> Result<Invoice, AppError> {
    let id = parse_id(raw_id, "invoice")?;
    state
        .repo
        .find_invoice(org_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Invoice>, AppError> {
    let invoice = load(&state, auth.org_id(), &id).await?;
    Ok(ApiResponse::ok("Invoice retrieved", invoice))
}

pub async fn update_invoice_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateInvoiceStatusRequest>,
) -> Result<ApiResponse<Invoice>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let invoice = load(&state, auth.org_id(), &id).await?;
    if invoice.status.is_terminal() {
        return Err(AppError::invalid_field(
            "status",
            format!("Invoice is {} and its status can no longer change", invoice.status),
        ));
    }
    if !invoice.status.can_transition_to(req.status) {
        return Err(AppError::invalid_field(
            "status",
            format!(
                "Cannot change invoice status from {} to {}",
                invoice.status, req.status
            ),
        ));
    }

    state
        .repo
        .update_invoice_status(auth.org_id(), invoice.id, req.status, None)
        .await?;
    tracing::info!(
        invoice_id = %invoice.id,
        from = %invoice.status,
        to = %req.status,
        "Invoice status changed"
    );

    let invoice = load(&state, auth.org_id(), &id).await?;
    Ok(ApiResponse::ok("Invoice status updated", invoice))
}

pub async fn generate_invoice_pdf(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<StoredFile>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let invoice_id = parse_id(&id, "invoice")?;
    let file = state
        .documents
        .generate_invoice_pdf(auth.org_id(), invoice_id)
        .await?;
    Ok(ApiResponse::created("Invoice PDF generated", file))
}
