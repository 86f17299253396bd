pub mod accounts;
pub mod contacts;
pub mod files;
pub mod health;
pub mod invoices;
pub mod ledger;
pub mod payments;
pub mod products;
pub mod reports;
pub mod taxes;

use service_core::error::AppError;
use uuid::Uuid;

/// Parse a path id, answering 400 in the usual envelope when malformed.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid {} id '{}'", what, raw)))
}
