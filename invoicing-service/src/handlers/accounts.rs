use axum::extract::{Path, Query, State};
use chrono::Utc;
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

use super::parse_id;
use crate::dtos::{AccountListParams, CreateAccountRequest, UpdateAccountRequest};
use crate::middleware::{AuthUser, ADMIN_ONLY};
use crate::models::{AccountChanges, ChartOfAccount};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_account(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> Result<ApiResponse<ChartOfAccount>, AppError> {
    auth.require(ADMIN_ONLY)?;

    let now = Utc::now();
    let account = ChartOfAccount {
        id: Uuid::new_v4(),
        org_id: auth.org_id(),
        name: req.name,
        account_type: req.account_type,
        description: req.description,
        active: req.active,
        created_at: now,
        updated_at: now,
    };
    state.repo.insert_account(&account).await?;

    Ok(ApiResponse::created("Account created", account))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<AccountListParams>,
) -> Result<ApiResponse<Vec<ChartOfAccount>>, AppError> {
    let accounts = state
        .repo
        .list_accounts(auth.org_id(), params.include_inactive)
        .await?;
    Ok(ApiResponse::ok("Accounts retrieved", accounts))
}

async fn load(state: &AppState, org_id: Uuid, raw_id: &str) -> Result<ChartOfAccount, AppError> {
    let id = parse_id(raw_id, "account")?;
    state
        .repo
        .find_account(org_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))
}

pub async fn get_account(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<ChartOfAccount>, AppError> {
    let account = load(&state, auth.org_id(), &id).await?;
    Ok(ApiResponse::ok("Account retrieved", account))
}

pub async fn update_account(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateAccountRequest>,
) -> Result<ApiResponse<ChartOfAccount>, AppError> {
    auth.require(ADMIN_ONLY)?;

    let mut account = load(&state, auth.org_id(), &id).await?;
    AccountChanges::from(req).apply_to(&mut account);
    state.repo.update_account(&account).await?;

    Ok(ApiResponse::ok("Account updated", account))
}

pub async fn delete_account(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    auth.require(ADMIN_ONLY)?;

    let id = parse_id(&id, "account")?;
    if !state.repo.delete_account(auth.org_id(), id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Account not found")));
    }
    Ok(ApiResponse::message("Account deleted"))
}
