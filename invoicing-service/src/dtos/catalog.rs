//! Products, taxes and chart-of-accounts requests.

use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{non_negative_amount, not_blank};
use crate::services::money::MAX_TAX_RATE;
use crate::models::{
    AccountChanges, AccountType, ProductChanges, ProductKind, TaxApplicability, TaxChanges,
    TaxComputation,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(
        length(max = 200, message = "Name must be at most 200 characters"),
        custom(function = "not_blank", message = "Name is required")
    )]
    pub name: String,

    pub kind: ProductKind,

    #[validate(custom(
        function = "non_negative_amount",
        message = "Sales price must be non-negative, below 10^12, with at most 2 decimals"
    ))]
    pub sales_price: Decimal,

    #[serde(default)]
    #[validate(custom(
        function = "non_negative_amount",
        message = "Purchase price must be non-negative, below 10^12, with at most 2 decimals"
    ))]
    pub purchase_price: Decimal,

    #[validate(length(max = 20, message = "HSN code must be at most 20 characters"))]
    pub hsn_code: Option<String>,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,

    pub sales_tax_id: Option<Uuid>,
    pub purchase_tax_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(
        length(max = 200, message = "Name must be at most 200 characters"),
        custom(function = "not_blank", message = "Name cannot be blank")
    )]
    pub name: Option<String>,

    pub kind: Option<ProductKind>,

    #[validate(custom(
        function = "non_negative_amount",
        message = "Sales price must be non-negative, below 10^12, with at most 2 decimals"
    ))]
    pub sales_price: Option<Decimal>,

    #[validate(custom(
        function = "non_negative_amount",
        message = "Purchase price must be non-negative, below 10^12, with at most 2 decimals"
    ))]
    pub purchase_price: Option<Decimal>,

    #[validate(length(max = 20, message = "HSN code must be at most 20 characters"))]
    pub hsn_code: Option<String>,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,

    pub sales_tax_id: Option<Uuid>,
    pub purchase_tax_id: Option<Uuid>,
}

impl From<UpdateProductRequest> for ProductChanges {
    fn from(req: UpdateProductRequest) -> Self {
        ProductChanges {
            name: req.name,
            kind: req.kind,
            sales_price: req.sales_price,
            purchase_price: req.purchase_price,
            hsn_code: req.hsn_code,
            category: req.category,
            sales_tax_id: req.sales_tax_id,
            purchase_tax_id: req.purchase_tax_id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    #[serde(default)]
    pub include_archived: bool,
}

fn tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate >= MAX_TAX_RATE || rate.normalize().scale() > 4 {
        return Err(ValidationError::new("tax_rate"));
    }
    Ok(())
}

/// Percentage rates are capped at 100; fixed rates are per unit and only
/// bounded by the column. Checked against the merged tax on update, since a partial
/// update may change the computation without touching the rate.
pub fn check_tax_rate(
    computation: TaxComputation,
    rate: Decimal,
) -> Result<(), validator::ValidationErrors> {
    if computation == TaxComputation::Percentage && rate > Decimal::ONE_HUNDRED {
        let mut errors = validator::ValidationErrors::new();
        let mut err = ValidationError::new("percentage_range");
        err.message = Some("Percentage rate must be between 0 and 100".into());
        errors.add("rate", err);
        return Err(errors);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaxRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "not_blank", message = "Name is required")
    )]
    pub name: String,

    pub computation: TaxComputation,

    #[validate(custom(function = "tax_rate", message = "Rate must be non-negative and below 10^8 with at most 4 decimals"))]
    pub rate: Decimal,

    pub applicability: TaxApplicability,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaxRequest {
    #[validate(
        length(max = 100, message = "Name must be at most 100 characters"),
        custom(function = "not_blank", message = "Name cannot be blank")
    )]
    pub name: Option<String>,

    pub computation: Option<TaxComputation>,

    #[validate(custom(function = "tax_rate", message = "Rate must be non-negative and below 10^8 with at most 4 decimals"))]
    pub rate: Option<Decimal>,

    pub applicability: Option<TaxApplicability>,
}

impl From<UpdateTaxRequest> for TaxChanges {
    fn from(req: UpdateTaxRequest) -> Self {
        TaxChanges {
            name: req.name,
            computation: req.computation,
            rate: req.rate,
            applicability: req.applicability,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(
        length(max = 200, message = "Name must be at most 200 characters"),
        custom(function = "not_blank", message = "Name is required")
    )]
    pub name: String,

    pub account_type: AccountType,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(
        length(max = 200, message = "Name must be at most 200 characters"),
        custom(function = "not_blank", message = "Name cannot be blank")
    )]
    pub name: Option<String>,

    pub account_type: Option<AccountType>,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    pub active: Option<bool>,
}

impl From<UpdateAccountRequest> for AccountChanges {
    fn from(req: UpdateAccountRequest) -> Self {
        AccountChanges {
            name: req.name,
            account_type: req.account_type,
            description: req.description,
            active: req.active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountListParams {
    #[serde(default)]
    pub include_inactive: bool,
}
