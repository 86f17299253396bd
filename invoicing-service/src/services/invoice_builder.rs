//! Builds an invoice aggregate from a request and persists it atomically.
//!
//! Phases: shape validation, customer check, line pricing, then a single
//! unit of work (header with zero totals, items, totals update, commit).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::{flatten_validation_errors, AppError, FieldError};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateInvoiceRequest, LineItemInput};
use crate::models::{
    Contact, ContactRole, Invoice, InvoiceLineItem, InvoiceStatus, InvoiceTotals, Product, Tax,
};
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::money;
use crate::services::repository::{Repository, UnitOfWork};

/// Collect every request-level problem before touching the database.
pub fn validate_request(req: &CreateInvoiceRequest) -> Result<(), AppError> {
    let mut errors = match req.validate() {
        Ok(()) => Vec::new(),
        Err(e) => flatten_validation_errors(&e),
    };

    if req.due_date < req.issue_date {
        errors.push(FieldError::new(
            "due_date",
            "Due date must be on or after the issue date",
        ));
    }
    if let Some(status) = req.status {
        if !matches!(status, InvoiceStatus::Draft | InvoiceStatus::Posted) {
            errors.push(FieldError::new(
                "status",
                "New invoices must be Draft or Posted",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidInput(errors))
    }
}

fn ensure_invoiceable(customer: &Contact) -> Result<(), AppError> {
    if customer.archived {
        return Err(AppError::invalid_field(
            "customer_id",
            "Customer is archived",
        ));
    }
    if !customer.has_role(ContactRole::Customer) {
        return Err(AppError::invalid_field(
            "customer_id",
            "Contact does not have the customer role",
        ));
    }
    Ok(())
}

pub fn compute_totals(items: &[InvoiceLineItem]) -> Result<InvoiceTotals, AppError> {
    let too_large = || {
        AppError::invalid_field("items", "Invoice total exceeds the supported maximum")
    };

    let total_amount =
        money::checked_sum(items.iter().map(|i| i.line_total)).ok_or_else(too_large)?;
    let tax_total =
        money::checked_sum(items.iter().map(|i| i.tax_amount)).ok_or_else(too_large)?;
    let grand_total = money::checked_sum([total_amount, tax_total]).ok_or_else(too_large)?;
    Ok(InvoiceTotals {
        total_amount,
        tax_total,
        grand_total,
    })
}

#[derive(Clone)]
pub struct InvoiceBuilder {
    repo: Arc<dyn Repository>,
}

impl InvoiceBuilder {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self, req), fields(customer_id = %req.customer_id, items = req.items.len()))]
    pub async fn create(
        &self,
        org_id: Uuid,
        req: CreateInvoiceRequest,
    ) -> Result<Invoice, AppError> {
        validate_request(&req)?;

        let customer = self
            .repo
            .find_contact(org_id, req.customer_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Customer {} not found", req.customer_id))
            })?;

        let invoice = self.assemble(org_id, &customer, &req).await?;

        let mut uow = self.repo.begin().await?;
        if let Err(e) = Self::stage(uow.as_mut(), &invoice).await {
            if let Err(rollback) = uow.rollback().await {
                warn!(error = %rollback, "Rollback after failed invoice write also failed");
            }
            return Err(e);
        }
        uow.commit().await?;

        INVOICES_TOTAL
            .with_label_values(&[invoice.status.as_str()])
            .inc();
        info!(
            invoice_id = %invoice.id,
            grand_total = %invoice.grand_total,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Price the request against `customer` without writing anything. The
    /// request must already have passed [`validate_request`].
    pub async fn assemble(
        &self,
        org_id: Uuid,
        customer: &Contact,
        req: &CreateInvoiceRequest,
    ) -> Result<Invoice, AppError> {
        ensure_invoiceable(customer)?;

        let invoice_id = Uuid::new_v4();
        let items = self.price_lines(org_id, invoice_id, &req.items).await?;
        let totals = compute_totals(&items)?;
        let now = Utc::now();

        let mut invoice = Invoice {
            id: invoice_id,
            org_id,
            customer_id: customer.id,
            issue_date: req.issue_date,
            due_date: req.due_date,
            status: req.status.unwrap_or(InvoiceStatus::Draft),
            items,
            total_amount: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            grand_total: Decimal::ZERO,
            pdf_file_id: None,
            payment: None,
            created_at: now,
            updated_at: now,
        };
        invoice.set_totals(totals);
        Ok(invoice)
    }

    /// Write an assembled invoice inside a caller-owned unit of work.
    pub async fn stage(uow: &mut dyn UnitOfWork, invoice: &Invoice) -> Result<(), AppError> {
        uow.insert_invoice_header(invoice).await?;
        for item in &invoice.items {
            uow.insert_line_item(item).await?;
        }
        uow.update_invoice_totals(invoice.id, &invoice.totals())
            .await?;
        Ok(())
    }

    async fn price_lines(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
        inputs: &[LineItemInput],
    ) -> Result<Vec<InvoiceLineItem>, AppError> {
        let mut products: HashMap<Uuid, Product> = HashMap::new();
        let mut taxes: HashMap<Uuid, Tax> = HashMap::new();
        let mut errors = Vec::new();
        let mut items = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let field = |name: &str| format!("items[{}].{}", index, name);

            if !products.contains_key(&input.product_id) {
                let product = self
                    .repo
                    .find_product(org_id, input.product_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!(
                            "Product {} not found",
                            input.product_id
                        ))
                    })?;
                products.insert(product.id, product);
            }
            let product = &products[&input.product_id];

            if product.archived {
                errors.push(FieldError::new(
                    field("product_id"),
                    format!("Product '{}' is archived", product.name),
                ));
            }

            let unit_price = input.unit_price.unwrap_or(product.sales_price);
            if unit_price <= Decimal::ZERO {
                errors.push(FieldError::new(
                    field("unit_price"),
                    "Unit price must be greater than zero",
                ));
            }

            let tax = match input.tax_id {
                Some(tax_id) => {
                    if !taxes.contains_key(&tax_id) {
                        let tax = self.repo.find_tax(org_id, tax_id).await?.ok_or_else(|| {
                            AppError::NotFound(anyhow::anyhow!("Tax {} not found", tax_id))
                        })?;
                        taxes.insert(tax.id, tax);
                    }
                    let tax = &taxes[&tax_id];
                    if !tax.applicability.applies_to_sales() {
                        errors.push(FieldError::new(
                            field("tax_id"),
                            format!("Tax '{}' does not apply to sales", tax.name),
                        ));
                    }
                    Some(tax)
                }
                None => None,
            };

            let Some(line_total) = money::line_total(input.quantity, unit_price) else {
                errors.push(FieldError::new(
                    field("quantity"),
                    "Line total exceeds the supported maximum",
                ));
                continue;
            };
            let tax_amount = match tax {
                Some(t) => match money::line_tax(t, input.quantity, line_total) {
                    Some(amount) => amount,
                    None => {
                        errors.push(FieldError::new(
                            field("tax_id"),
                            "Line tax exceeds the supported maximum",
                        ));
                        continue;
                    }
                },
                None => money::round2(Decimal::ZERO),
            };

            items.push(InvoiceLineItem {
                id: Uuid::new_v4(),
                invoice_id,
                position: index as i32,
                product_id: product.id,
                description: product.name.clone(),
                quantity: input.quantity,
                unit_price: money::round2(unit_price),
                tax_id: input.tax_id,
                line_total,
                tax_amount,
            });
        }

        if errors.is_empty() {
            Ok(items)
        } else {
            Err(AppError::InvalidInput(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductKind, TaxApplicability, TaxComputation};
    use crate::services::memory::{FailPoint, InMemoryRepository};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    struct Fixture {
        repo: InMemoryRepository,
        builder: InvoiceBuilder,
        org_id: Uuid,
        customer: Contact,
        widget: Product,
        gadget: Product,
        vat: Tax,
    }

    async fn fixture() -> Fixture {
        let repo = InMemoryRepository::new();
        let org_id = Uuid::new_v4();
        let now = Utc::now();

        let customer = Contact {
            id: Uuid::new_v4(),
            org_id,
            name: "Jane".to_string(),
            roles: vec![ContactRole::Customer],
            email: "jane@example.com".to_string(),
            phone: None,
            address: None,
            vendor_reference: None,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        repo.insert_contact(&customer).await.unwrap();

        let product = |name: &str, price: &str| Product {
            id: Uuid::new_v4(),
            org_id,
            name: name.to_string(),
            kind: ProductKind::Goods,
            sales_price: d(price),
            purchase_price: d("0.00"),
            hsn_code: None,
            category: None,
            sales_tax_id: None,
            purchase_tax_id: None,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        let widget = product("Widget", "99.99");
        let gadget = product("Gadget", "50.00");
        repo.insert_product(&widget).await.unwrap();
        repo.insert_product(&gadget).await.unwrap();

        let vat = Tax {
            id: Uuid::new_v4(),
            org_id,
            name: "VAT 10".to_string(),
            computation: TaxComputation::Percentage,
            rate: d("10"),
            applicability: TaxApplicability::Sales,
            created_at: now,
            updated_at: now,
        };
        repo.insert_tax(&vat).await.unwrap();

        let builder = InvoiceBuilder::new(Arc::new(repo.clone()));
        Fixture {
            repo,
            builder,
            org_id,
            customer,
            widget,
            gadget,
            vat,
        }
    }

    fn line(product: &Product, quantity: &str, price: &str) -> LineItemInput {
        LineItemInput {
            product_id: product.id,
            quantity: d(quantity),
            unit_price: Some(d(price)),
            tax_id: None,
        }
    }

    fn request(f: &Fixture, items: Vec<LineItemInput>) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            customer_id: f.customer.id,
            issue_date: date(1),
            due_date: date(31),
            status: None,
            items,
        }
    }

    #[tokio::test]
    async fn creates_invoice_with_exact_totals() {
        let f = fixture().await;
        let req = request(
            &f,
            vec![line(&f.widget, "2", "99.99"), line(&f.gadget, "1", "50.00")],
        );

        let invoice = f.builder.create(f.org_id, req).await.unwrap();

        assert_eq!(invoice.total_amount, d("249.98"));
        assert_eq!(invoice.grand_total, d("249.98"));
        assert_eq!(invoice.status, InvoiceStatus::Draft);

        let stored = f
            .repo
            .find_invoice(f.org_id, invoice.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.items.len(), 2);
        assert_eq!(stored.total_amount, d("249.98"));
        assert_eq!(stored.items[0].description, "Widget");
    }

    #[tokio::test]
    async fn sales_tax_is_added_to_grand_total() {
        let f = fixture().await;
        let mut item = line(&f.widget, "2", "99.99");
        item.tax_id = Some(f.vat.id);

        let invoice = f
            .builder
            .create(f.org_id, request(&f, vec![item]))
            .await
            .unwrap();

        assert_eq!(invoice.total_amount, d("199.98"));
        assert_eq!(invoice.tax_total, d("20.00"));
        assert_eq!(invoice.grand_total, d("219.98"));
    }

    #[tokio::test]
    async fn omitted_unit_price_snapshots_product_price() {
        let f = fixture().await;
        let mut item = line(&f.gadget, "3", "1.00");
        item.unit_price = None;

        let invoice = f
            .builder
            .create(f.org_id, request(&f, vec![item]))
            .await
            .unwrap();
        assert_eq!(invoice.items[0].unit_price, d("50.00"));
        assert_eq!(invoice.total_amount, d("150.00"));
    }

    #[tokio::test]
    async fn failure_at_totals_update_leaves_nothing_behind() {
        let f = fixture().await;
        f.repo.fail_on(FailPoint::UpdateInvoiceTotals).await;

        let result = f
            .builder
            .create(f.org_id, request(&f, vec![line(&f.widget, "1", "10.00")]))
            .await;

        assert!(matches!(result, Err(AppError::DatabaseError(_))));
        assert_eq!(f.repo.invoice_count().await, 0);
        assert_eq!(f.repo.line_item_count().await, 0);
    }

    #[tokio::test]
    async fn failure_on_second_item_leaves_nothing_behind() {
        let f = fixture().await;
        f.repo.fail_on(FailPoint::InsertLineItem).await;

        let result = f
            .builder
            .create(
                f.org_id,
                request(
                    &f,
                    vec![line(&f.widget, "1", "10.00"), line(&f.gadget, "1", "5.00")],
                ),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(f.repo.invoice_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let f = fixture().await;
        let mut item = line(&f.widget, "1", "10.00");
        item.product_id = Uuid::new_v4();

        let result = f.builder.create(f.org_id, request(&f, vec![item])).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(f.repo.invoice_count().await, 0);
    }

    #[tokio::test]
    async fn all_shape_errors_are_reported_together() {
        let f = fixture().await;
        let mut req = request(
            &f,
            vec![line(&f.widget, "0", "10.00"), line(&f.gadget, "1", "-1")],
        );
        req.due_date = date(1);
        req.issue_date = date(2);
        req.status = Some(InvoiceStatus::Paid);

        let Err(AppError::InvalidInput(errors)) = f.builder.create(f.org_id, req).await else {
            panic!("expected field errors");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"items[0].quantity"));
        assert!(fields.contains(&"items[1].unit_price"));
        assert!(fields.contains(&"due_date"));
        assert!(fields.contains(&"status"));
        assert_eq!(f.repo.invoice_count().await, 0);
    }

    #[tokio::test]
    async fn oversized_lines_are_field_errors() {
        let f = fixture().await;
        // Both values pass the request bounds; their product fits no amount column.
        let big = line(&f.widget, "9999999999", "999999999999.99");

        let Err(AppError::InvalidInput(errors)) =
            f.builder.create(f.org_id, request(&f, vec![big])).await
        else {
            panic!("expected field errors");
        };
        assert_eq!(errors[0].field, "items[0].quantity");
        assert_eq!(f.repo.invoice_count().await, 0);
    }

    #[tokio::test]
    async fn invoice_total_beyond_column_limit_is_rejected() {
        let f = fixture().await;
        let half = || line(&f.widget, "1", "600000000000.00");

        let Err(AppError::InvalidInput(errors)) = f
            .builder
            .create(f.org_id, request(&f, vec![half(), half()]))
            .await
        else {
            panic!("expected field errors");
        };
        assert_eq!(errors[0].field, "items");
        assert_eq!(f.repo.invoice_count().await, 0);
    }

    #[tokio::test]
    async fn archived_or_vendor_only_customers_are_rejected() {
        let f = fixture().await;

        let mut vendor = f.customer.clone();
        vendor.id = Uuid::new_v4();
        vendor.email = "vendor@example.com".to_string();
        vendor.roles = vec![ContactRole::Vendor];
        f.repo.insert_contact(&vendor).await.unwrap();

        let mut req = request(&f, vec![line(&f.widget, "1", "1.00")]);
        req.customer_id = vendor.id;
        let result = f.builder.create(f.org_id, req).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));

        let mut archived = f.customer.clone();
        archived.archived = true;
        f.repo.update_contact(&archived).await.unwrap();
        let result = f
            .builder
            .create(f.org_id, request(&f, vec![line(&f.widget, "1", "1.00")]))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn purchase_only_tax_is_rejected() {
        let f = fixture().await;
        let mut purchase = f.vat.clone();
        purchase.id = Uuid::new_v4();
        purchase.applicability = TaxApplicability::Purchase;
        f.repo.insert_tax(&purchase).await.unwrap();

        let mut item = line(&f.widget, "1", "10.00");
        item.tax_id = Some(purchase.id);
        let Err(AppError::InvalidInput(errors)) =
            f.builder.create(f.org_id, request(&f, vec![item])).await
        else {
            panic!("expected field errors");
        };
        assert_eq!(errors[0].field, "items[0].tax_id");
    }
}
