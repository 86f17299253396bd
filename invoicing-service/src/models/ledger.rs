//! Ledger transactions feeding the P&L / balance sheet, and per-partner
//! payment status.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::AccountType;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub org_id: Uuid,
    pub date: NaiveDate,
    pub account_type: AccountType,
    pub category: String,
    pub description: String,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub contact_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Latest payment position of a contact.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PartnerStatus {
    pub contact_id: Uuid,
    pub org_id: Uuid,
    pub last_payment_date: NaiveDate,
    pub last_payment_amount: Decimal,
    pub total_paid: Decimal,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

pub const PARTNER_STATUS_PAID: &str = "Paid";
