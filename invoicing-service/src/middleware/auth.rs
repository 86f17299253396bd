use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::services::{Claims, Role};
use crate::startup::AppState;

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const ADMIN_OR_INVOICING: &[Role] = &[Role::Admin, Role::InvoicingUser];

/// Middleware to require a valid bearer token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!(
                "Missing or invalid Authorization header"
            ))
        })?;

    let claims = state.jwt.validate(token)?;

    tracing::Span::current().record("org_id", tracing::field::display(claims.org_id));
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Authenticated caller, taken from the claims the middleware stored.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn org_id(&self) -> Uuid {
        self.0.org_id
    }

    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Role '{}' may not perform this action",
                self.0.role.as_str()
            )))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<Claims>().ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
        })?;
        Ok(AuthUser(claims.clone()))
    }
}
