//! Turns a captured payment into a paid invoice.
//!
//! Recording the payment (contact, invoice, payment row) is one unit of
//! work and must succeed. The follow-up steps run afterwards in order; each
//! one reports its own outcome and a failure never undoes the payment.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::{flatten_validation_errors, AppError, FieldError};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CapturedPayment, CreateInvoiceRequest};
use crate::models::{
    generate_payment_id, AccountType, Contact, ContactRole, Invoice, InvoiceStatus,
    LedgerTransaction, PartnerStatus, Payer, PaymentInfo, PaymentRecord, PaymentStatus,
    PARTNER_STATUS_PAID,
};
use crate::services::documents::DocumentService;
use crate::services::invoice_builder::{validate_request, InvoiceBuilder};
use crate::services::metrics::{PAYMENTS_TOTAL, WORKFLOW_STEP_FAILURES};
use crate::services::money;
use crate::services::repository::{Repository, UnitOfWork};

pub const SALES_CATEGORY: &str = "Sales";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    PdfStored,
    LedgerUpdated,
    PartnerStatusUpdated,
    InvoiceStatusUpdated,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStep::PdfStored => "pdf_stored",
            WorkflowStep::LedgerUpdated => "ledger_updated",
            WorkflowStep::PartnerStatusUpdated => "partner_status_updated",
            WorkflowStep::InvoiceStatusUpdated => "invoice_status_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: WorkflowStep,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub payment: PaymentRecord,
    pub invoice_id: Uuid,
    pub invoice_created: bool,
    pub contact_created: bool,
    pub steps: Vec<StepReport>,
}

impl WorkflowReport {
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.outcome == StepOutcome::Completed)
    }

    pub fn outcome(&self, step: WorkflowStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }
}

/// The contact the payment is credited to, and what recording the payment
/// has to do with its row.
enum CreditedContact {
    Existing(Contact),
    GrantCustomerRole(Contact),
    New(Contact),
}

impl CreditedContact {
    fn contact(&self) -> &Contact {
        match self {
            CreditedContact::Existing(c)
            | CreditedContact::GrantCustomerRole(c)
            | CreditedContact::New(c) => c,
        }
    }
}

enum TargetInvoice {
    Existing(Invoice),
    New(Invoice),
}

impl TargetInvoice {
    fn invoice(&self) -> &Invoice {
        match self {
            TargetInvoice::Existing(i) | TargetInvoice::New(i) => i,
        }
    }
}

#[derive(Clone)]
pub struct PaymentWorkflow {
    repo: Arc<dyn Repository>,
    builder: InvoiceBuilder,
    documents: DocumentService,
}

impl PaymentWorkflow {
    pub fn new(
        repo: Arc<dyn Repository>,
        builder: InvoiceBuilder,
        documents: DocumentService,
    ) -> Self {
        Self {
            repo,
            builder,
            documents,
        }
    }

    #[instrument(skip(self, captured), fields(transaction_id = %captured.transaction_id, method = %captured.method))]
    pub async fn process(
        &self,
        org_id: Uuid,
        captured: CapturedPayment,
    ) -> Result<WorkflowReport, AppError> {
        validate_capture(&captured)?;

        let payment_date = captured
            .payment_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let payer: Payer = captured.payer.clone().into();

        // An existing invoice is settled on behalf of its customer; the payer
        // is kept on the payment record only.
        let (contact, target) = match captured.invoice_id {
            Some(invoice_id) => {
                let invoice = self.payable_invoice(org_id, invoice_id).await?;
                let customer = self
                    .repo
                    .find_contact(org_id, invoice.customer_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!(
                            "Customer {} not found",
                            invoice.customer_id
                        ))
                    })?;
                (
                    CreditedContact::Existing(customer),
                    TargetInvoice::Existing(invoice),
                )
            }
            None => {
                let contact = self.resolve_payer(org_id, &payer).await?;
                let invoice = self
                    .new_invoice(org_id, contact.contact(), &captured, payment_date)
                    .await?;
                (contact, TargetInvoice::New(invoice))
            }
        };

        let payment = PaymentRecord {
            payment_id: generate_payment_id(),
            org_id,
            invoice_id: target.invoice().id,
            contact_id: contact.contact().id,
            payer,
            amount: money::round2(captured.amount),
            payment_date,
            method: captured.method.clone(),
            transaction_id: captured.transaction_id.clone(),
            status: PaymentStatus::Success,
            created_at: Utc::now(),
        };

        let mut uow = self.repo.begin().await?;
        if let Err(e) = record(uow.as_mut(), &contact, &target, &payment).await {
            if let Err(rollback) = uow.rollback().await {
                warn!(error = %rollback, "Rollback after failed payment record also failed");
            }
            return Err(e);
        }
        uow.commit().await?;

        PAYMENTS_TOTAL
            .with_label_values(&[payment.method.as_str()])
            .inc();
        info!(
            payment_id = %payment.payment_id,
            invoice_id = %payment.invoice_id,
            amount = %payment.amount,
            "Payment recorded"
        );

        let contact_created = matches!(contact, CreditedContact::New(_));
        let invoice_created = matches!(target, TargetInvoice::New(_));
        let contact = contact.contact();
        let invoice_id = payment.invoice_id;
        let mut steps = Vec::with_capacity(4);

        let pdf = self
            .documents
            .generate_invoice_pdf(org_id, invoice_id)
            .await
            .map(|_| ());
        steps.push(step_report(WorkflowStep::PdfStored, pdf, &payment));

        let ledger = self.post_to_ledger(&payment, contact).await;
        steps.push(step_report(WorkflowStep::LedgerUpdated, ledger, &payment));

        let partner = self.update_partner_status(&payment).await;
        steps.push(step_report(
            WorkflowStep::PartnerStatusUpdated,
            partner,
            &payment,
        ));

        let info = PaymentInfo {
            method: payment.method.clone(),
            transaction_id: payment.transaction_id.clone(),
            amount_paid: payment.amount,
            payment_date: payment.payment_date,
        };
        let status = self
            .repo
            .update_invoice_status(org_id, invoice_id, InvoiceStatus::Paid, Some(&info))
            .await;
        steps.push(step_report(
            WorkflowStep::InvoiceStatusUpdated,
            status,
            &payment,
        ));

        Ok(WorkflowReport {
            payment,
            invoice_id,
            invoice_created,
            contact_created,
            steps,
        })
    }

    async fn resolve_payer(&self, org_id: Uuid, payer: &Payer) -> Result<CreditedContact, AppError> {
        match self.repo.find_contact_by_email(org_id, &payer.email).await? {
            Some(contact) if contact.archived => Err(AppError::invalid_field(
                "payer.email",
                "The contact with this email is archived",
            )),
            Some(mut contact) => {
                if contact.grant_role(ContactRole::Customer) {
                    Ok(CreditedContact::GrantCustomerRole(contact))
                } else {
                    Ok(CreditedContact::Existing(contact))
                }
            }
            None => {
                let now = Utc::now();
                Ok(CreditedContact::New(Contact {
                    id: Uuid::new_v4(),
                    org_id,
                    name: payer.name.clone(),
                    roles: vec![ContactRole::Customer],
                    email: payer.email.clone(),
                    phone: payer.phone.clone(),
                    address: payer.address.clone(),
                    vendor_reference: None,
                    archived: false,
                    created_at: now,
                    updated_at: now,
                }))
            }
        }
    }

    async fn payable_invoice(&self, org_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let invoice = self
            .repo
            .find_invoice(org_id, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;
        if invoice.status == InvoiceStatus::Cancelled {
            return Err(AppError::invalid_field(
                "invoice_id",
                "Cannot record a payment against a cancelled invoice",
            ));
        }
        Ok(invoice)
    }

    async fn new_invoice(
        &self,
        org_id: Uuid,
        contact: &Contact,
        captured: &CapturedPayment,
        payment_date: NaiveDate,
    ) -> Result<Invoice, AppError> {
        let req = CreateInvoiceRequest {
            customer_id: contact.id,
            issue_date: payment_date,
            due_date: payment_date,
            status: Some(InvoiceStatus::Posted),
            items: captured.items.clone().unwrap_or_default(),
        };
        validate_request(&req)?;
        self.builder.assemble(org_id, contact, &req).await
    }

    async fn post_to_ledger(
        &self,
        payment: &PaymentRecord,
        contact: &Contact,
    ) -> Result<(), AppError> {
        let txn = LedgerTransaction {
            id: Uuid::new_v4(),
            org_id: payment.org_id,
            date: payment.payment_date,
            account_type: AccountType::Income,
            category: SALES_CATEGORY.to_string(),
            description: format!("Payment from {} ({})", contact.name, payment.method),
            amount: payment.amount,
            reference: Some(payment.payment_id.clone()),
            contact_id: Some(contact.id),
            created_at: Utc::now(),
        };
        self.repo.insert_ledger_transaction(&txn).await
    }

    async fn update_partner_status(&self, payment: &PaymentRecord) -> Result<(), AppError> {
        let previous = self
            .repo
            .find_partner_status(payment.org_id, payment.contact_id)
            .await?
            .map(|s| s.total_paid)
            .unwrap_or(Decimal::ZERO);

        let status = PartnerStatus {
            contact_id: payment.contact_id,
            org_id: payment.org_id,
            last_payment_date: payment.payment_date,
            last_payment_amount: payment.amount,
            total_paid: money::checked_sum([previous, payment.amount]).ok_or_else(|| {
                AppError::invalid_field("amount", "Total paid exceeds the supported maximum")
            })?,
            status: PARTNER_STATUS_PAID.to_string(),
            updated_at: Utc::now(),
        };
        self.repo.upsert_partner_status(&status).await
    }
}

fn validate_capture(captured: &CapturedPayment) -> Result<(), AppError> {
    let mut errors = match captured.validate() {
        Ok(()) => Vec::new(),
        Err(e) => flatten_validation_errors(&e),
    };
    let has_items = captured.items.as_ref().is_some_and(|items| !items.is_empty());
    if captured.invoice_id.is_none() && !has_items {
        errors.push(FieldError::new(
            "items",
            "Either invoice_id or at least one line item is required",
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidInput(errors))
    }
}

async fn record(
    uow: &mut dyn UnitOfWork,
    contact: &CreditedContact,
    target: &TargetInvoice,
    payment: &PaymentRecord,
) -> Result<(), AppError> {
    match contact {
        CreditedContact::New(c) => uow.insert_contact(c).await?,
        CreditedContact::GrantCustomerRole(c) => uow.update_contact(c).await?,
        CreditedContact::Existing(_) => {}
    }
    if let TargetInvoice::New(invoice) = target {
        InvoiceBuilder::stage(uow, invoice).await?;
    }
    uow.insert_payment(payment).await
}

fn step_report(
    step: WorkflowStep,
    result: Result<(), AppError>,
    payment: &PaymentRecord,
) -> StepReport {
    let outcome = match result {
        Ok(()) => StepOutcome::Completed,
        Err(e) => {
            warn!(
                step = step.as_str(),
                payment_id = %payment.payment_id,
                invoice_id = %payment.invoice_id,
                error = %e,
                "Payment workflow step failed"
            );
            WORKFLOW_STEP_FAILURES
                .with_label_values(&[step.as_str()])
                .inc();
            StepOutcome::Failed {
                reason: e.to_string(),
            }
        }
    };
    StepReport { step, outcome }
}
