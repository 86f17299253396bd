pub mod catalog;
pub mod contacts;
pub mod invoices;
pub mod ledger;
pub mod payments;

pub use catalog::*;
pub use contacts::*;
pub use invoices::*;
pub use ledger::*;
pub use payments::*;

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::services::money::{has_at_most_two_places, MAX_AMOUNT, MAX_QUANTITY};

pub(crate) fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO || *value >= MAX_AMOUNT || !has_at_most_two_places(value) {
        return Err(ValidationError::new("positive_amount"));
    }
    Ok(())
}

pub(crate) fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || *value >= MAX_AMOUNT || !has_at_most_two_places(value) {
        return Err(ValidationError::new("non_negative_amount"));
    }
    Ok(())
}

/// Quantities may be fractional (hours, kilograms) up to four places.
pub(crate) fn positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO || *value >= MAX_QUANTITY || value.normalize().scale() > 4 {
        return Err(ValidationError::new("positive_quantity"));
    }
    Ok(())
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
