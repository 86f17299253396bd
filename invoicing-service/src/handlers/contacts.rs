use axum::extract::{Path, Query, State};
use chrono::Utc;
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

use super::parse_id;
use crate::dtos::{ContactListParams, CreateContactRequest, UpdateContactRequest};
use crate::middleware::{AuthUser, ADMIN_OR_INVOICING};
use crate::models::{Contact, ContactChanges, ContactFilter};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateContactRequest>,
) -> Result<ApiResponse<Contact>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let now = Utc::now();
    let contact = Contact {
        id: Uuid::new_v4(),
        org_id: auth.org_id(),
        roles: req.normalized_roles(),
        name: req.name,
        email: req.email,
        phone: req.phone,
        address: req.address,
        vendor_reference: req.vendor_reference,
        archived: false,
        created_at: now,
        updated_at: now,
    };
    state.repo.insert_contact(&contact).await?;

    tracing::info!(contact_id = %contact.id, "Contact created");
    Ok(ApiResponse::created("Contact created", contact))
}

pub async fn list_contacts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<ContactListParams>,
) -> Result<ApiResponse<Vec<Contact>>, AppError> {
    let filter: ContactFilter = params.into();
    let contacts = state.repo.list_contacts(auth.org_id(), &filter).await?;
    Ok(ApiResponse::ok("Contacts retrieved", contacts))
}

async fn load(state: &AppState, org_id: Uuid, raw_id: &str) -> Result<Contact, AppError> {
    let id = parse_id(raw_id, "contact")?;
    state
        .repo
        .find_contact(org_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Contact not found")))
}

pub async fn get_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Contact>, AppError> {
    let contact = load(&state, auth.org_id(), &id).await?;
    Ok(ApiResponse::ok("Contact retrieved", contact))
}

pub async fn update_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateContactRequest>,
) -> Result<ApiResponse<Contact>, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let mut contact = load(&state, auth.org_id(), &id).await?;
    ContactChanges::from(req).apply_to(&mut contact);
    state.repo.update_contact(&contact).await?;

    Ok(ApiResponse::ok("Contact updated", contact))
}

async fn set_archived(
    state: &AppState,
    auth: &AuthUser,
    raw_id: &str,
    archived: bool,
) -> Result<Contact, AppError> {
    auth.require(ADMIN_OR_INVOICING)?;

    let mut contact = load(state, auth.org_id(), raw_id).await?;
    if contact.archived != archived {
        contact.archived = archived;
        contact.updated_at = Utc::now();
        state.repo.update_contact(&contact).await?;
    }
    Ok(contact)
}

pub async fn archive_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Contact>, AppError> {
    let contact = set_archived(&state, &auth, &id, true).await?;
    Ok(ApiResponse::ok("Contact archived", contact))
}

pub async fn unarchive_contact(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Contact>, AppError> {
    let contact = set_archived(&state, &auth, &id, false).await?;
    Ok(ApiResponse::ok("Contact restored", contact))
}
