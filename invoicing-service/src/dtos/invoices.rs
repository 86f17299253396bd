use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{positive_amount, positive_quantity};
use crate::models::{InvoiceFilter, InvoiceStatus};

/// One requested invoice line. When `unit_price` is omitted the product's
/// current sales price is snapshotted.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineItemInput {
    pub product_id: Uuid,

    #[validate(custom(
        function = "positive_quantity",
        message = "Quantity must be greater than zero and below 10^10 with at most 4 decimals"
    ))]
    pub quantity: Decimal,

    #[validate(custom(
        function = "positive_amount",
        message = "Unit price must be greater than zero, below 10^12, with at most 2 decimals"
    ))]
    pub unit_price: Option<Decimal>,

    pub tax_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: Option<InvoiceStatus>,

    #[validate(length(min = 1, message = "At least one line item is required"), nested)]
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListParams {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
}

impl From<InvoiceListParams> for InvoiceFilter {
    fn from(params: InvoiceListParams) -> Self {
        InvoiceFilter {
            status: params.status,
            customer_id: params.customer_id,
        }
    }
}
