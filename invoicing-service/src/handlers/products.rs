use axum::extract::{Path, Query, State};
use chrono::Utc;
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

use super::parse_id;
use crate::dtos::{CreateProductRequest, ProductListParams, UpdateProductRequest};
use crate::middleware::{AuthUser, ADMIN_OR_INVOICING};
use crate::models::{Product, ProductChanges};
use crate::services::money::round2;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Linked taxes must exist in the caller's organization.
async fn ensure_taxes_exist(
    state: &AppState,
    org_id: Uuid,
    ids: [Option<Uuid>; 2],
) -> Result<(), AppError> {
    for id in ids.into_iter().flatten() {
        if state.repo.find_tax(org_id, id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Tax {} not found", id)));
        }
    }
    Ok(())
}

pub async fn create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;
    ensure_taxes_exist(&state, auth.org_id(), [req.sales_tax_id, req.purchase_tax_id]).await?;

    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4(),
        org_id: auth.org_id(),
        name: req.name,
        kind: req.kind,
        sales_price: round2(req.sales_price),
        purchase_price: round2(req.purchase_price),
        hsn_code: req.hsn_code,
        category: req.category,
        sales_tax_id: req.sales_tax_id,
        purchase_tax_id: req.purchase_tax_id,
        archived: false,
        created_at: now,
        updated_at: now,
    };
    state.repo.insert_product(&product).await?;

    tracing::info!(product_id = %product.id, "Product created");
    Ok(ApiResponse::created("Product created", product))
}

pub async fn list_products(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ProductListParams>,
) -> Result<ApiResponse<Vec<Product>>, AppError> {
    let products = state
        .repo
        .list_products(auth.org_id(), params.include_archived)
        .await?;
    Ok(ApiResponse::ok("Products retrieved", products))
}

async fn load(state: &AppState, org_id: Uuid, raw_id: &str) -> Result<Product, AppError> {
    let id = parse_id(raw_id, "product")?;
    state
        .repo
        .find_product(org_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))
}

pub async fn get_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Product>, AppError> {
    let product = load(&state, auth.org_id(), &id).await?;
    Ok(ApiResponse::ok("Product retrieved", product))
}

pub async fn update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateProductRequest>,
) -> Result<ApiResponse<Product>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;
    ensure_taxes_exist(&state, auth.org_id(), [req.sales_tax_id, req.purchase_tax_id]).await?;

    let mut product = load(&state, auth.org_id(), &id).await?;
    ProductChanges::from(req).apply_to(&mut product);
    state.repo.update_product(&product).await?;

    Ok(ApiResponse::ok("Product updated", product))
}

async fn set_archived(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
    archived: bool,
) -> Result<Product, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let mut product = load(state, auth.org_id(), raw_id).await?;
    if product.archived != archived {
        product.archived = archived;
        product.updated_at = Utc::now();
        state.repo.update_product(&product).await?;
    }
    Ok(product)
}

pub async fn archive_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Product>, AppError> {
    let product = set_archived(&state, &auth, &id, true).await?;
    Ok(ApiResponse::ok("Product archived", product))
}

pub async fn unarchive_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Product>, AppError> {
    let product = set_archived(&state, &auth, &id, false).await?;
    Ok(ApiResponse::ok("Product restored", product))
}
