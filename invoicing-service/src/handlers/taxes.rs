use axum::extract::{Path, State};
use chrono::Utc;
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

use super::parse_id;
use crate::dtos::{check_tax_rate, CreateTaxRequest, UpdateTaxRequest};
use crate::middleware::{AuthUser, ADMIN_ONLY};
use crate::models::{Tax, TaxChanges};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_tax(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateTaxRequest>,
) -> Result<ApiResponse<Tax>, AppError> {
    auth.require(ADMIN_ONLY)?;
    check_tax_rate(req.computation, req.rate)?;

    let now = Utc::now();
    let tax = Tax {
        id: Uuid::new_v4(),
        org_id: auth.org_id(),
        name: req.name,
        computation: req.computation,
        rate: req.rate,
        applicability: req.applicability,
        created_at: now,
        updated_at: now,
    };
    state.repo.insert_tax(&tax).await?;

    tracing::info!(tax_id = %tax.id, "Tax created");
    Ok(ApiResponse::created("Tax created", tax))
}

pub async fn list_taxes(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<Tax>>, AppError> {
    let taxes = state.repo.list_taxes(auth.org_id()).await?;
    Ok(ApiResponse::ok("Taxes retrieved", taxes))
}

async fn load(state: &AppState, org_id: Uuid, raw_id: &str) -> Result<Tax, AppError> {
    let id = parse_id(raw_id, "tax")?;
    state
        .repo
        .find_tax(org_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tax not found")))
}

pub async fn get_tax(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Tax>, AppError> {
    let tax = load(&state, auth.org_id(), &id).await?;
    Ok(ApiResponse::ok("Tax retrieved", tax))
}

pub async fn update_tax(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateTaxRequest>,
) -> Result<ApiResponse<Tax>, AppError> {
    auth.require(ADMIN_ONLY)?;

    let mut tax = load(&state, auth.org_id(), &id).await?;
    TaxChanges::from(req).apply_to(&mut tax);
    check_tax_rate(tax.computation, tax.rate)?;
    state.repo.update_tax(&tax).await?;

    Ok(ApiResponse::ok("Tax updated", tax))
}

pub async fn delete_tax(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(ADMIN_ONLY)?;

    let id = parse_id(&id, "tax")?;
    if !state.repo.delete_tax(auth.org_id(), id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Tax not found")));
    }

    tracing::info!(tax_id = %id, "Tax deleted");
    Ok(ApiResponse::message("Tax deleted"))
}
