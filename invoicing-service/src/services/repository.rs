//! Persistence seam. `PgRepository` is the production backend,
//! `InMemoryRepository` serves development and tests.
//!
//! Multi-row writes go through a `UnitOfWork`: staged writes become visible
//! together on `commit` and vanish on `rollback` (or drop).

use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    ChartOfAccount, Contact, ContactFilter, Invoice, InvoiceFilter, InvoiceLineItem,
    InvoiceStatus, InvoiceTotals, LedgerTransaction, PartnerStatus, PaymentInfo, PaymentRecord,
    Product, StoredFile, Tax,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;

    // Contacts
    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError>;
    async fn find_contact(&self, org_id: Uuid, id: Uuid) -> Result<Option<Contact>, AppError>;
    async fn find_contact_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, AppError>;
    async fn list_contacts(
        &self,
        org_id: Uuid,
        filter: &ContactFilter,
    ) -> Result<Vec<Contact>, AppError>;
    async fn update_contact(&self, contact: &Contact) -> Result<(), AppError>;

    // Products
    async fn insert_product(&self, product: &Product) -> Result<(), AppError>;
    async fn find_product(&self, org_id: Uuid, id: Uuid) -> Result<Option<Product>, AppError>;
    async fn list_products(
        &self,
        org_id: Uuid,
        include_archived: bool,
    ) -> Result<Vec<Product>, AppError>;
    async fn update_product(&self, product: &Product) -> Result<(), AppError>;

    // Taxes
    async fn insert_tax(&self, tax: &Tax) -> Result<(), AppError>;
    async fn find_tax(&self, org_id: Uuid, id: Uuid) -> Result<Option<Tax>, AppError>;
    async fn list_taxes(&self, org_id: Uuid) -> Result<Vec<Tax>, AppError>;
    async fn update_tax(&self, tax: &Tax) -> Result<(), AppError>;
    async fn delete_tax(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    // Chart of accounts
    async fn insert_account(&self, account: &ChartOfAccount) -> Result<(), AppError>;
    async fn find_account(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ChartOfAccount>, AppError>;
    async fn list_accounts(
        &self,
        org_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ChartOfAccount>, AppError>;
    async fn update_account(&self, account: &ChartOfAccount) -> Result<(), AppError>;
    async fn delete_account(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    // Invoices (always returned with their items)
    async fn find_invoice(&self, org_id: Uuid, id: Uuid) -> Result<Option<Invoice>, AppError>;
    async fn list_invoices(
        &self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, AppError>;
    async fn update_invoice_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: InvoiceStatus,
        payment: Option<&PaymentInfo>,
    ) -> Result<(), AppError>;
    async fn set_invoice_pdf(
        &self,
        org_id: Uuid,
        id: Uuid,
        file_id: Option<Uuid>,
    ) -> Result<(), AppError>;

    // Payments
    async fn find_payment(
        &self,
        org_id: Uuid,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, AppError>;
    async fn list_payments(
        &self,
        org_id: Uuid,
        contact_id: Option<Uuid>,
    ) -> Result<Vec<PaymentRecord>, AppError>;

    // Ledger
    async fn insert_ledger_transaction(&self, txn: &LedgerTransaction) -> Result<(), AppError>;
    async fn list_ledger_transactions(
        &self,
        org_id: Uuid,
        range: &DateRange,
    ) -> Result<Vec<LedgerTransaction>, AppError>;

    // Partner status
    async fn find_partner_status(
        &self,
        org_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<PartnerStatus>, AppError>;
    async fn upsert_partner_status(&self, status: &PartnerStatus) -> Result<(), AppError>;

    // Stored files
    async fn insert_file(&self, file: &StoredFile) -> Result<(), AppError>;
    async fn find_file(&self, org_id: Uuid, id: Uuid) -> Result<Option<StoredFile>, AppError>;
    async fn delete_file(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError>;
}

/// Writes that must land together.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_contact(&mut self, contact: &Contact) -> Result<(), AppError>;
    async fn update_contact(&mut self, contact: &Contact) -> Result<(), AppError>;
    async fn insert_invoice_header(&mut self, invoice: &Invoice) -> Result<(), AppError>;
    async fn insert_line_item(&mut self, item: &InvoiceLineItem) -> Result<(), AppError>;
    async fn update_invoice_totals(
        &mut self,
        invoice_id: Uuid,
        totals: &InvoiceTotals,
    ) -> Result<(), AppError>;
    async fn insert_payment(&mut self, payment: &PaymentRecord) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
