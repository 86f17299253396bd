use axum::extract::{Path, Query, State};
use service_core::error::AppError;
use service_core::response::ApiResponse;

use super::parse_id;
use crate::dtos::DateRangeParams;
use crate::middleware::{AuthUser, ADMIN_OR_INVOICING};
use crate::services::reports::{BalanceSheet, PartnerLedger, ProfitAndLoss, SalesSummary};
use crate::startup::AppState;

pub async fn sales_summary(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<SalesSummary>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let summary = state.reports.sales_summary(auth.org_id()).await?;
    Ok(ApiResponse::ok("Sales summary", summary))
}

pub async fn balance_sheet(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<DateRangeParams>,
) -> Result<ApiResponse<BalanceSheet>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let sheet = state
        .reports
        .balance_sheet(auth.org_id(), params.into())
        .await?;
    Ok(ApiResponse::ok("Balance sheet", sheet))
}

pub async fn profit_and_loss(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<DateRangeParams>,
) -> Result<ApiResponse<ProfitAndLoss>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let report = state
        .reports
        .profit_and_loss(auth.org_id(), params.into())
        .await?;
    Ok(ApiResponse::ok("Profit and loss", report))
}

pub async fn partner_ledger(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(contact_id): Path<String>,
    Query(params): Query<DateRangeParams>,
) -> Result<ApiResponse<PartnerLedger>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let contact_id = parse_id(&contact_id, "contact")?;
    let ledger = state
        .reports
        .partner_ledger(auth.org_id(), contact_id, params.into())
        .await?;
    Ok(ApiResponse::ok("Partner ledger", ledger))
}
