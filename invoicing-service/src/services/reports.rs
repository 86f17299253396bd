//! Read-only financial reports, recomputed on every request.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    AccountType, InvoiceFilter, InvoiceStatus, LedgerTransaction, PartnerStatus,
};
use crate::services::money;
use crate::services::repository::{DateRange, Repository};

#[derive(Debug, Clone, Serialize)]
pub struct StatusTotal {
    pub status: InvoiceStatus,
    pub count: u64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesSummary {
    pub by_status: Vec<StatusTotal>,
    pub invoice_count: u64,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSection {
    pub account_type: AccountType,
    pub categories: Vec<CategoryTotal>,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSheet {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub assets: ReportSection,
    pub liabilities: ReportSection,
    pub equity: ReportSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfitAndLoss {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub income: ReportSection,
    pub expenses: ReportSection,
    pub net_profit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerEntryKind {
    Invoice,
    Payment,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerLedgerRow {
    pub date: NaiveDate,
    pub kind: PartnerEntryKind,
    pub reference: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerLedger {
    pub contact_id: Uuid,
    pub contact_name: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub opening_balance: Decimal,
    pub rows: Vec<PartnerLedgerRow>,
    pub closing_balance: Decimal,
    pub status: Option<PartnerStatus>,
}

/// Sum ledger amounts of one account type, grouped by category (sorted).
fn section(account_type: AccountType, txns: &[LedgerTransaction]) -> ReportSection {
    let mut by_category: BTreeMap<&str, Decimal> = BTreeMap::new();
    for txn in txns.iter().filter(|t| t.account_type == account_type) {
        *by_category.entry(txn.category.as_str()).or_default() += txn.amount;
    }
    let categories: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, amount)| CategoryTotal {
            category: category.to_string(),
            amount: money::round2(amount),
        })
        .collect();
    let total = money::sum(categories.iter().map(|c| c.amount));
    ReportSection {
        account_type,
        categories,
        total,
    }
}

struct Movement {
    date: NaiveDate,
    created_at: DateTime<Utc>,
    kind: PartnerEntryKind,
    reference: String,
    debit: Decimal,
    credit: Decimal,
}

#[derive(Clone)]
pub struct ReportService {
    repo: Arc<dyn Repository>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn sales_summary(&self, org_id: Uuid) -> Result<SalesSummary, AppError> {
        let invoices = self
            .repo
            .list_invoices(org_id, &InvoiceFilter::default())
            .await?;

        let by_status: Vec<StatusTotal> = InvoiceStatus::ALL
            .iter()
            .map(|status| {
                let matching = invoices.iter().filter(|i| i.status == *status);
                StatusTotal {
                    status: *status,
                    count: matching.clone().count() as u64,
                    total: money::sum(matching.map(|i| i.grand_total)),
                }
            })
            .collect();

        Ok(SalesSummary {
            invoice_count: invoices.len() as u64,
            total_amount: money::sum(invoices.iter().map(|i| i.grand_total)),
            by_status,
        })
    }

    #[instrument(skip(self))]
    pub async fn balance_sheet(
        &self,
        org_id: Uuid,
        range: DateRange,
    ) -> Result<BalanceSheet, AppError> {
        let txns = self.repo.list_ledger_transactions(org_id, &range).await?;
        Ok(BalanceSheet {
            from: range.from,
            to: range.to,
            assets: section(AccountType::Asset, &txns),
            liabilities: section(AccountType::Liability, &txns),
            equity: section(AccountType::Equity, &txns),
        })
    }

    #[instrument(skip(self))]
    pub async fn profit_and_loss(
        &self,
        org_id: Uuid,
        range: DateRange,
    ) -> Result<ProfitAndLoss, AppError> {
        let txns = self.repo.list_ledger_transactions(org_id, &range).await?;
        let income = section(AccountType::Income, &txns);
        let expenses = section(AccountType::Expense, &txns);
        let net_profit = money::round2(income.total - expenses.total);
        Ok(ProfitAndLoss {
            from: range.from,
            to: range.to,
            income,
            expenses,
            net_profit,
        })
    }

    /// Invoices (debit) and payments (credit) for one contact, oldest first,
    /// with a running balance. Movements before `range.from` fold into the
    /// opening balance. Cancelled invoices are left out.
    #[instrument(skip(self))]
    pub async fn partner_ledger(
        &self,
        org_id: Uuid,
        contact_id: Uuid,
        range: DateRange,
    ) -> Result<PartnerLedger, AppError> {
        let contact = self
            .repo
            .find_contact(org_id, contact_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Contact not found")))?;

        let invoices = self
            .repo
            .list_invoices(
                org_id,
                &InvoiceFilter {
                    status: None,
                    customer_id: Some(contact_id),
                },
            )
            .await?;
        let payments = self.repo.list_payments(org_id, Some(contact_id)).await?;

        let mut movements: Vec<Movement> = invoices
            .iter()
            .filter(|i| i.status != InvoiceStatus::Cancelled)
            .map(|i| Movement {
                date: i.issue_date,
                created_at: i.created_at,
                kind: PartnerEntryKind::Invoice,
                reference: i.id.to_string(),
                debit: i.grand_total,
                credit: Decimal::ZERO,
            })
            .chain(payments.iter().map(|p| Movement {
                date: p.payment_date,
                created_at: p.created_at,
                kind: PartnerEntryKind::Payment,
                reference: p.payment_id.clone(),
                debit: Decimal::ZERO,
                credit: p.amount,
            }))
            .collect();
        movements.sort_by(|a, b| (a.date, a.created_at).cmp(&(b.date, b.created_at)));

        let mut opening_balance = Decimal::ZERO;
        let mut balance = Decimal::ZERO;
        let mut rows = Vec::new();
        for m in movements {
            if range.from.is_some_and(|from| m.date < from) {
                opening_balance += m.debit - m.credit;
                balance = opening_balance;
                continue;
            }
            if range.to.is_some_and(|to| m.date > to) {
                continue;
            }
            balance += m.debit - m.credit;
            rows.push(PartnerLedgerRow {
                date: m.date,
                kind: m.kind,
                reference: m.reference,
                debit: money::round2(m.debit),
                credit: money::round2(m.credit),
                balance: money::round2(balance),
            });
        }

        let status = self.repo.find_partner_status(org_id, contact_id).await?;

        Ok(PartnerLedger {
            contact_id,
            contact_name: contact.name,
            from: range.from,
            to: range.to,
            opening_balance: money::round2(opening_balance),
            rows,
            closing_balance: money::round2(balance),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemoryRepository;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn txn(org_id: Uuid, account_type: AccountType, category: &str, amount: &str, day: u32) -> LedgerTransaction {
        LedgerTransaction {
            id: Uuid::new_v4(),
            org_id,
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            account_type,
            category: category.to_string(),
            description: String::new(),
            amount: d(amount),
            reference: None,
            contact_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn profit_and_loss_groups_by_category() {
        let repo = InMemoryRepository::new();
        let org_id = Uuid::new_v4();
        for t in [
            txn(org_id, AccountType::Income, "Sales", "100.00", 1),
            txn(org_id, AccountType::Income, "Sales", "50.50", 2),
            txn(org_id, AccountType::Income, "Interest", "1.25", 3),
            txn(org_id, AccountType::Expense, "Rent", "80.00", 4),
            txn(org_id, AccountType::Asset, "Bank", "500.00", 5),
        ] {
            repo.insert_ledger_transaction(&t).await.unwrap();
        }
        let reports = ReportService::new(Arc::new(repo));

        let pl = reports
            .profit_and_loss(org_id, DateRange::default())
            .await
            .unwrap();
        assert_eq!(pl.income.total, d("151.75"));
        assert_eq!(
            pl.income.categories,
            vec![
                CategoryTotal { category: "Interest".into(), amount: d("1.25") },
                CategoryTotal { category: "Sales".into(), amount: d("150.50") },
            ]
        );
        assert_eq!(pl.expenses.total, d("80.00"));
        assert_eq!(pl.net_profit, d("71.75"));

        let bs = reports
            .balance_sheet(
                org_id,
                DateRange {
                    from: None,
                    to: NaiveDate::from_ymd_opt(2024, 6, 4),
                },
            )
            .await
            .unwrap();
        assert_eq!(bs.assets.total, d("0.00"));
        assert!(bs.assets.categories.is_empty());
    }

    #[tokio::test]
    async fn sales_summary_lists_every_status() {
        let repo = InMemoryRepository::new();
        let reports = ReportService::new(Arc::new(repo));
        let summary = reports.sales_summary(Uuid::new_v4()).await.unwrap();
        assert_eq!(summary.by_status.len(), 4);
        assert_eq!(summary.invoice_count, 0);
        assert_eq!(summary.total_amount, d("0.00"));
    }
}
