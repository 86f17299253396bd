//! Domain models for invoicing-service.

mod account;
mod contact;
mod file;
mod invoice;
mod ledger;
mod payment;
mod product;
mod tax;

pub use account::{AccountChanges, AccountType, ChartOfAccount};
pub use contact::{dedup_roles, Contact, ContactChanges, ContactFilter, ContactRole};
pub use file::{StoredFile, PDF_CONTENT_TYPE};
pub use invoice::{
    Invoice, InvoiceFilter, InvoiceLineItem, InvoiceStatus, InvoiceTotals, PaymentInfo,
};
pub use ledger::{LedgerTransaction, PartnerStatus, PARTNER_STATUS_PAID};
pub use payment::{generate_payment_id, Payer, PaymentRecord, PaymentStatus};
pub use product::{Product, ProductChanges, ProductKind};
pub use tax::{Tax, TaxApplicability, TaxChanges, TaxComputation};
