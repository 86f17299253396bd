//! Invoice aggregate: header, owned line items and payment metadata.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "PascalCase")]
pub enum InvoiceStatus {
    Draft,
    Posted,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Posted,
        InvoiceStatus::Paid,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Posted => "Posted",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Paid and Cancelled are final; nothing moves back to Draft.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Posted) | (Draft, Paid) | (Draft, Cancelled) | (Posted, Paid) | (Posted, Cancelled)
        )
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One priced product line. Price and description are snapshots taken when
/// the invoice was built.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub position: i32,
    pub product_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_id: Option<Uuid>,
    pub line_total: Decimal,
    pub tax_amount: Decimal,
}

/// Settlement details recorded when an invoice is paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: String,
    pub transaction_id: String,
    pub amount_paid: Decimal,
    pub payment_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub total_amount: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub org_id: Uuid,
    pub customer_id: Uuid,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceLineItem>,
    pub total_amount: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub pdf_file_id: Option<Uuid>,
    pub payment: Option<PaymentInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals {
            total_amount: self.total_amount,
            tax_total: self.tax_total,
            grand_total: self.grand_total,
        }
    }

    pub fn set_totals(&mut self, totals: InvoiceTotals) {
        self.total_amount = totals.total_amount;
        self.tax_total = totals.tax_total;
        self.grand_total = totals.grand_total;
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.status.map_or(true, |s| invoice.status == s)
            && self.customer_id.map_or(true, |c| invoice.customer_id == c)
    }
}

#[cfg(test)]
mod tests {
    use super::InvoiceStatus::*;

    #[test]
    fn terminal_states_do_not_move() {
        assert!(Paid.is_terminal() && Cancelled.is_terminal());
        assert!(!Draft.is_terminal() && !Posted.is_terminal());
        for next in super::InvoiceStatus::ALL {
            assert!(!Paid.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn posted_cannot_return_to_draft() {
        assert!(!Posted.can_transition_to(Draft));
        assert!(Posted.can_transition_to(Paid));
        assert!(Draft.can_transition_to(Posted));
    }
}
