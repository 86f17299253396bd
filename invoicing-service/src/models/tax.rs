//! Tax model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a tax amount is derived from a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaxComputation {
    /// `rate` percent of the line total.
    Percentage,
    /// `rate` per unit of quantity.
    Fixed,
}

impl TaxComputation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxComputation::Percentage => "percentage",
            TaxComputation::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(TaxComputation::Percentage),
            "fixed" => Some(TaxComputation::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaxApplicability {
    Sales,
    Purchase,
    Both,
}

impl TaxApplicability {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxApplicability::Sales => "sales",
            TaxApplicability::Purchase => "purchase",
            TaxApplicability::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sales" => Some(TaxApplicability::Sales),
            "purchase" => Some(TaxApplicability::Purchase),
            "both" => Some(TaxApplicability::Both),
            _ => None,
        }
    }

    pub fn applies_to_sales(&self) -> bool {
        matches!(self, TaxApplicability::Sales | TaxApplicability::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tax {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub computation: TaxComputation,
    pub rate: Decimal,
    pub applicability: TaxApplicability,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TaxChanges {
    pub name: Option<String>,
    pub computation: Option<TaxComputation>,
    pub rate: Option<Decimal>,
    pub applicability: Option<TaxApplicability>,
}

impl TaxChanges {
    pub fn apply_to(self, tax: &mut Tax) {
        if let Some(name) = self.name {
            tax.name = name;
        }
        if let Some(computation) = self.computation {
            tax.computation = computation;
        }
        if let Some(rate) = self.rate {
            tax.rate = rate;
        }
        if let Some(applicability) = self.applicability {
            tax.applicability = applicability;
        }
        tax.updated_at = Utc::now();
    }
}
