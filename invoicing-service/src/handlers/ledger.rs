use axum::extract::{Query, State};
use chrono::Utc;
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

use crate::dtos::{CreateLedgerTransactionRequest, DateRangeParams};
use crate::middleware::{AuthUser, ADMIN_ONLY, ADMIN_OR_INVOICING};
use crate::models::LedgerTransaction;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Post a manual journal line.
pub async fn create_transaction(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateLedgerTransactionRequest>,
) -> Result<ApiResponse<LedgerTransaction>, AppError> {
    auth.require(ADMIN_ONLY)?;

    if let Some(contact_id) = req.contact_id {
        if state.repo.find_contact(auth.org_id(), contact_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Contact {} not found",
                contact_id
            )));
        }
    }

    let txn = LedgerTransaction {
        id: Uuid::new_v4(),
        org_id: auth.org_id(),
        date: req.date,
        account_type: req.account_type,
        category: req.category.trim().to_string(),
        description: req.description,
        amount: req.amount,
        reference: req.reference,
        contact_id: req.contact_id,
        created_at: Utc::now(),
    };
    state.repo.insert_ledger_transaction(&txn).await?;

    tracing::info!(
        transaction_id = %txn.id,
        account_type = txn.account_type.as_str(),
        amount = %txn.amount,
        "Ledger transaction posted"
    );
    Ok(ApiResponse::created("Ledger transaction created", txn))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<DateRangeParams>,
) -> Result<ApiResponse<Vec<LedgerTransaction>>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let txns = state
        .repo
        .list_ledger_transactions(auth.org_id(), &params.into())
        .await?;
    Ok(ApiResponse::ok("Ledger transactions retrieved", txns))
}
