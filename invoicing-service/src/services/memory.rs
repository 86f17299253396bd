//! In-process repository for development and tests.
//!
//! Tables live behind a single `RwLock`. A unit of work stages its writes and
//! applies them to a copy of the tables on commit, swapping the copy in only
//! when every write succeeded.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{
    ChartOfAccount, Contact, ContactFilter, Invoice, InvoiceFilter, InvoiceLineItem,
    InvoiceStatus, InvoiceTotals, LedgerTransaction, PartnerStatus, PaymentInfo, PaymentRecord,
    Product, StoredFile, Tax,
};
use crate::services::money;
use crate::services::repository::{DateRange, Repository, UnitOfWork};

/// Operations that can be forced to fail, to exercise rollback and
/// best-effort paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertInvoiceHeader,
    InsertLineItem,
    UpdateInvoiceTotals,
    InsertPayment,
    Commit,
    InsertLedgerTransaction,
    UpsertPartnerStatus,
    UpdateInvoiceStatus,
    InsertFile,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    contacts: Vec<Contact>,
    products: Vec<Product>,
    taxes: Vec<Tax>,
    accounts: Vec<ChartOfAccount>,
    invoices: Vec<Invoice>,
    payments: Vec<PaymentRecord>,
    ledger: Vec<LedgerTransaction>,
    partner_status: Vec<PartnerStatus>,
    files: Vec<StoredFile>,
}

impl Tables {
    fn ensure_unique_email(&self, contact: &Contact) -> Result<(), AppError> {
        let taken = self.contacts.iter().any(|c| {
            c.org_id == contact.org_id
                && c.id != contact.id
                && c.email.eq_ignore_ascii_case(&contact.email)
        });
        if taken {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "A contact with email '{}' already exists",
                contact.email
            )));
        }
        Ok(())
    }

    fn put_contact(&mut self, contact: &Contact) -> Result<(), AppError> {
        self.ensure_unique_email(contact)?;
        self.contacts.push(contact.clone());
        Ok(())
    }

    fn replace_contact(&mut self, contact: &Contact) -> Result<(), AppError> {
        self.ensure_unique_email(contact)?;
        let slot = self
            .contacts
            .iter_mut()
            .find(|c| c.id == contact.id && c.org_id == contact.org_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Contact not found")))?;
        *slot = contact.clone();
        Ok(())
    }

    fn invoice_mut(&mut self, org_id: Option<Uuid>, id: Uuid) -> Result<&mut Invoice, AppError> {
        self.invoices
            .iter_mut()
            .find(|i| i.id == id && org_id.map_or(true, |o| i.org_id == o))
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
    }

    fn apply(&mut self, write: &Staged) -> Result<(), AppError> {
        match write {
            Staged::InsertContact(contact) => self.put_contact(contact),
            Staged::UpdateContact(contact) => self.replace_contact(contact),
            Staged::InsertInvoice(invoice) => {
                if self.invoices.iter().any(|i| i.id == invoice.id) {
                    return Err(AppError::Conflict(anyhow::anyhow!("Duplicate invoice id")));
                }
                self.invoices.push(invoice.clone());
                Ok(())
            }
            Staged::InsertItem(item) => {
                let invoice = self.invoice_mut(None, item.invoice_id)?;
                invoice.items.push(item.clone());
                invoice.items.sort_by_key(|i| i.position);
                Ok(())
            }
            Staged::UpdateTotals(id, totals) => {
                let invoice = self.invoice_mut(None, *id)?;
                invoice.set_totals(*totals);
                invoice.updated_at = Utc::now();
                Ok(())
            }
            Staged::InsertPayment(payment) => {
                if self.payments.iter().any(|p| p.payment_id == payment.payment_id) {
                    return Err(AppError::Conflict(anyhow::anyhow!("Duplicate payment id")));
                }
                self.payments.push(payment.clone());
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Staged {
    InsertContact(Contact),
    UpdateContact(Contact),
    InsertInvoice(Invoice),
    InsertItem(InvoiceLineItem),
    UpdateTotals(Uuid, InvoiceTotals),
    InsertPayment(PaymentRecord),
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<RwLock<Tables>>,
    fail_points: Arc<RwLock<HashSet<FailPoint>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `point` fail with a database error.
    pub async fn fail_on(&self, point: FailPoint) {
        self.fail_points.write().await.insert(point);
    }

    pub async fn invoice_count(&self) -> usize {
        self.tables.read().await.invoices.len()
    }

    pub async fn line_item_count(&self) -> usize {
        self.tables
            .read()
            .await
            .invoices
            .iter()
            .map(|i| i.items.len())
            .sum()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    async fn check(&self, point: FailPoint) -> Result<(), AppError> {
        if self.fail_points.read().await.contains(&point) {
            debug!(?point, "Injected failure");
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        Ok(Box::new(MemoryUnitOfWork {
            repo: self.clone(),
            staged: Vec::new(),
        }))
    }

    #[instrument(skip(self, contact), fields(contact_id = %contact.id))]
    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError> {
        self.tables.write().await.put_contact(contact)
    }

    async fn find_contact(&self, org_id: Uuid, id: Uuid) -> Result<Option<Contact>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .find(|c| c.org_id == org_id && c.id == id)
            .cloned())
    }

    async fn find_contact_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .find(|c| c.org_id == org_id && c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_contacts(
        &self,
        org_id: Uuid,
        filter: &ContactFilter,
    ) -> Result<Vec<Contact>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .filter(|c| c.org_id == org_id && filter.matches(c))
            .cloned()
            .collect())
    }

    async fn update_contact(&self, contact: &Contact) -> Result<(), AppError> {
        self.tables.write().await.replace_contact(contact)
    }

    async fn insert_product(&self, product: &Product) -> Result<(), AppError> {
        self.tables.write().await.products.push(product.clone());
        Ok(())
    }

    async fn find_product(&self, org_id: Uuid, id: Uuid) -> Result<Option<Product>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .iter()
            .find(|p| p.org_id == org_id && p.id == id)
            .cloned())
    }

    async fn list_products(
        &self,
        org_id: Uuid,
        include_archived: bool,
    ) -> Result<Vec<Product>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .iter()
            .filter(|p| p.org_id == org_id && (include_archived || !p.archived))
            .cloned()
            .collect())
    }

    async fn update_product(&self, product: &Product) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .products
            .iter_mut()
            .find(|p| p.id == product.id && p.org_id == product.org_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;
        *slot = product.clone();
        Ok(())
    }

    async fn insert_tax(&self, tax: &Tax) -> Result<(), AppError> {
        self.tables.write().await.taxes.push(tax.clone());
        Ok(())
    }

    async fn find_tax(&self, org_id: Uuid, id: Uuid) -> Result<Option<Tax>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .taxes
            .iter()
            .find(|t| t.org_id == org_id && t.id == id)
            .cloned())
    }

    async fn list_taxes(&self, org_id: Uuid) -> Result<Vec<Tax>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .taxes
            .iter()
            .filter(|t| t.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn update_tax(&self, tax: &Tax) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .taxes
            .iter_mut()
            .find(|t| t.id == tax.id && t.org_id == tax.org_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tax not found")))?;
        *slot = tax.clone();
        Ok(())
    }

    async fn delete_tax(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.taxes.len();
        tables.taxes.retain(|t| !(t.org_id == org_id && t.id == id));
        Ok(tables.taxes.len() != before)
    }

    async fn insert_account(&self, account: &ChartOfAccount) -> Result<(), AppError> {
        self.tables.write().await.accounts.push(account.clone());
        Ok(())
    }

    async fn find_account(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ChartOfAccount>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .iter()
            .find(|a| a.org_id == org_id && a.id == id)
            .cloned())
    }

    async fn list_accounts(
        &self,
        org_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ChartOfAccount>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .iter()
            .filter(|a| a.org_id == org_id && (include_inactive || a.active))
            .cloned()
            .collect())
    }

    async fn update_account(&self, account: &ChartOfAccount) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .accounts
            .iter_mut()
            .find(|a| a.id == account.id && a.org_id == account.org_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))?;
        *slot = account.clone();
        Ok(())
    }

    async fn delete_account(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.accounts.len();
        tables.accounts.retain(|a| !(a.org_id == org_id && a.id == id));
        Ok(tables.accounts.len() != before)
    }

    async fn find_invoice(&self, org_id: Uuid, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .iter()
            .find(|i| i.org_id == org_id && i.id == id)
            .cloned())
    }

    async fn list_invoices(
        &self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .iter()
            .filter(|i| i.org_id == org_id && filter.matches(i))
            .cloned()
            .collect())
    }

    #[instrument(skip(self, payment))]
    async fn update_invoice_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: InvoiceStatus,
        payment: Option<&PaymentInfo>,
    ) -> Result<(), AppError> {
        self.check(FailPoint::UpdateInvoiceStatus).await?;
        let mut tables = self.tables.write().await;
        let invoice = tables.invoice_mut(Some(org_id), id)?;
        invoice.status = status;
        if let Some(payment) = payment {
            invoice.payment = Some(payment.clone());
        }
        invoice.updated_at = Utc::now();
        Ok(())
    }

    async fn set_invoice_pdf(
        &self,
        org_id: Uuid,
        id: Uuid,
        file_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let invoice = tables.invoice_mut(Some(org_id), id)?;
        invoice.pdf_file_id = file_id;
        invoice.updated_at = Utc::now();
        Ok(())
    }

    async fn find_payment(
        &self,
        org_id: Uuid,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| p.org_id == org_id && p.payment_id == payment_id)
            .cloned())
    }

    async fn list_payments(
        &self,
        org_id: Uuid,
        contact_id: Option<Uuid>,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .filter(|p| p.org_id == org_id && contact_id.map_or(true, |c| p.contact_id == c))
            .cloned()
            .collect())
    }

    async fn insert_ledger_transaction(&self, txn: &LedgerTransaction) -> Result<(), AppError> {
        self.check(FailPoint::InsertLedgerTransaction).await?;
        self.tables.write().await.ledger.push(txn.clone());
        Ok(())
    }

    async fn list_ledger_transactions(
        &self,
        org_id: Uuid,
        range: &DateRange,
    ) -> Result<Vec<LedgerTransaction>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|t| t.org_id == org_id && range.contains(t.date))
            .cloned()
            .collect())
    }

    async fn find_partner_status(
        &self,
        org_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<PartnerStatus>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .partner_status
            .iter()
            .find(|s| s.org_id == org_id && s.contact_id == contact_id)
            .cloned())
    }

    async fn upsert_partner_status(&self, status: &PartnerStatus) -> Result<(), AppError> {
        self.check(FailPoint::UpsertPartnerStatus).await?;
        let mut tables = self.tables.write().await;
        let existing = tables
            .partner_status
            .iter()
            .position(|s| s.org_id == status.org_id && s.contact_id == status.contact_id);
        match existing {
            Some(index) => tables.partner_status[index] = status.clone(),
            None => tables.partner_status.push(status.clone()),
        }
        Ok(())
    }

    async fn insert_file(&self, file: &StoredFile) -> Result<(), AppError> {
        self.check(FailPoint::InsertFile).await?;
        self.tables.write().await.files.push(file.clone());
        Ok(())
    }

    async fn find_file(&self, org_id: Uuid, id: Uuid) -> Result<Option<StoredFile>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .files
            .iter()
            .find(|f| f.org_id == org_id && f.id == id)
            .cloned())
    }

    async fn delete_file(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.files.len();
        tables.files.retain(|f| !(f.org_id == org_id && f.id == id));
        Ok(tables.files.len() != before)
    }
}

pub struct MemoryUnitOfWork {
    repo: InMemoryRepository,
    staged: Vec<Staged>,
}

impl MemoryUnitOfWork {
    fn stages_invoice(&self, invoice_id: Uuid) -> bool {
        self.staged
            .iter()
            .any(|w| matches!(w, Staged::InsertInvoice(i) if i.id == invoice_id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_contact(&mut self, contact: &Contact) -> Result<(), AppError> {
        self.staged.push(Staged::InsertContact(contact.clone()));
        Ok(())
    }

    async fn update_contact(&mut self, contact: &Contact) -> Result<(), AppError> {
        self.staged.push(Staged::UpdateContact(contact.clone()));
        Ok(())
    }

    async fn insert_invoice_header(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        self.repo.check(FailPoint::InsertInvoiceHeader).await?;
        // Same shape as the SQL insert: no items, zero totals until
        // `update_invoice_totals`.
        let zero = money::round2(Decimal::ZERO);
        let mut header = invoice.clone();
        header.items.clear();
        header.set_totals(InvoiceTotals {
            total_amount: zero,
            tax_total: zero,
            grand_total: zero,
        });
        self.staged.push(Staged::InsertInvoice(header));
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &InvoiceLineItem) -> Result<(), AppError> {
        self.repo.check(FailPoint::InsertLineItem).await?;
        if !self.stages_invoice(item.invoice_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "line item references unknown invoice {}",
                item.invoice_id
            )));
        }
        self.staged.push(Staged::InsertItem(item.clone()));
        Ok(())
    }

    async fn update_invoice_totals(
        &mut self,
        invoice_id: Uuid,
        totals: &InvoiceTotals,
    ) -> Result<(), AppError> {
        self.repo.check(FailPoint::UpdateInvoiceTotals).await?;
        self.staged.push(Staged::UpdateTotals(invoice_id, *totals));
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> Result<(), AppError> {
        self.repo.check(FailPoint::InsertPayment).await?;
        self.staged.push(Staged::InsertPayment(payment.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.repo.check(FailPoint::Commit).await?;
        let mut tables = self.repo.tables.write().await;
        let mut next = tables.clone();
        for write in &self.staged {
            next.apply(write)?;
        }
        *tables = next;
        debug!(writes = self.staged.len(), "Unit of work committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        debug!(writes = self.staged.len(), "Unit of work rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn invoice(org_id: Uuid) -> Invoice {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        Invoice {
            id: Uuid::new_v4(),
            org_id,
            customer_id: Uuid::new_v4(),
            issue_date: date,
            due_date: date,
            status: InvoiceStatus::Draft,
            items: Vec::new(),
            total_amount: d("80.00"),
            tax_total: d("8.00"),
            grand_total: d("88.00"),
            pdf_file_id: None,
            payment: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn header_totals_come_only_from_the_totals_update() {
        let repo = InMemoryRepository::new();
        let org_id = Uuid::new_v4();
        let invoice = invoice(org_id);

        let mut uow = repo.begin().await.unwrap();
        uow.insert_invoice_header(&invoice).await.unwrap();
        uow.commit().await.unwrap();

        let stored = repo.find_invoice(org_id, invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.grand_total.to_string(), "0.00");
        assert_eq!(stored.tax_total.to_string(), "0.00");

        let other = Invoice {
            id: Uuid::new_v4(),
            ..invoice.clone()
        };
        let mut uow = repo.begin().await.unwrap();
        uow.insert_invoice_header(&other).await.unwrap();
        uow.update_invoice_totals(other.id, &other.totals())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = repo.find_invoice(org_id, other.id).await.unwrap().unwrap();
        assert_eq!(stored.grand_total, d("88.00"));
        assert_eq!(stored.total_amount, d("80.00"));
    }

    #[tokio::test]
    async fn rolled_back_writes_are_discarded() {
        let repo = InMemoryRepository::new();
        let org_id = Uuid::new_v4();

        let mut uow = repo.begin().await.unwrap();
        uow.insert_invoice_header(&invoice(org_id)).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(repo.invoice_count().await, 0);
    }
}
