use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{not_blank, positive_amount, LineItemInput};
use crate::models::Payer;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PayerInput {
    #[validate(
        length(max = 200, message = "Payer name must be at most 200 characters"),
        custom(function = "not_blank", message = "Payer name is required")
    )]
    pub name: String,

    #[validate(email(message = "Invalid payer email"))]
    pub email: String,

    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<PayerInput> for Payer {
    fn from(input: PayerInput) -> Self {
        Payer {
            name: input.name,
            email: input.email,
            phone: input.phone,
            address: input.address,
        }
    }
}

/// A payment already captured by an external channel.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CapturedPayment {
    /// Existing invoice to settle. Without it, `items` describe a new one.
    pub invoice_id: Option<Uuid>,

    #[validate(nested)]
    pub payer: PayerInput,

    #[validate(nested)]
    pub items: Option<Vec<LineItemInput>>,

    #[validate(custom(
        function = "positive_amount",
        message = "Amount must be greater than zero, below 10^12, with at most 2 decimals"
    ))]
    pub amount: Decimal,

    #[validate(custom(function = "not_blank", message = "Payment method is required"))]
    pub method: String,

    #[validate(custom(function = "not_blank", message = "Transaction id is required"))]
    pub transaction_id: String,

    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListParams {
    pub contact_id: Option<Uuid>,
}
