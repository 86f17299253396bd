//! Product catalogue model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Goods,
    Service,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Goods => "goods",
            ProductKind::Service => "service",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "goods" => Some(ProductKind::Goods),
            "service" => Some(ProductKind::Service),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub kind: ProductKind,
    pub sales_price: Decimal,
    pub purchase_price: Decimal,
    pub hsn_code: Option<String>,
    pub category: Option<String>,
    pub sales_tax_id: Option<Uuid>,
    pub purchase_tax_id: Option<Uuid>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub kind: Option<ProductKind>,
    pub sales_price: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub hsn_code: Option<String>,
    pub category: Option<String>,
    pub sales_tax_id: Option<Uuid>,
    pub purchase_tax_id: Option<Uuid>,
}

impl ProductChanges {
    pub fn apply_to(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(kind) = self.kind {
            product.kind = kind;
        }
        if let Some(price) = self.sales_price {
            product.sales_price = crate::services::money::round2(price);
        }
        if let Some(price) = self.purchase_price {
            product.purchase_price = crate::services::money::round2(price);
        }
        if let Some(code) = self.hsn_code {
            product.hsn_code = Some(code);
        }
        if let Some(category) = self.category {
            product.category = Some(category);
        }
        if let Some(tax_id) = self.sales_tax_id {
            product.sales_tax_id = Some(tax_id);
        }
        if let Some(tax_id) = self.purchase_tax_id {
            product.purchase_tax_id = Some(tax_id);
        }
        product.updated_at = Utc::now();
    }
}
