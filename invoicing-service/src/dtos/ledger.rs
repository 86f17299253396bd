use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{not_blank, positive_amount};
use crate::models::AccountType;
use crate::services::repository::DateRange;

/// Manual journal line.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLedgerTransactionRequest {
    pub date: NaiveDate,
    pub account_type: AccountType,

    #[validate(
        length(max = 100, message = "Category must be at most 100 characters"),
        custom(function = "not_blank", message = "Category is required")
    )]
    pub category: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    #[serde(default)]
    pub description: String,

    #[validate(custom(
        function = "positive_amount",
        message = "Amount must be greater than zero, below 10^12, with at most 2 decimals"
    ))]
    pub amount: Decimal,

    pub reference: Option<String>,
    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct DateRangeParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl From<DateRangeParams> for DateRange {
    fn from(params: DateRangeParams) -> Self {
        DateRange {
            from: params.from,
            to: params.to,
        }
    }
}
