//! PostgreSQL repository for invoicing-service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    ChartOfAccount, Contact, ContactFilter, ContactRole, Invoice, InvoiceFilter, InvoiceLineItem,
    InvoiceStatus, InvoiceTotals, LedgerTransaction, PartnerStatus, Payer, PaymentInfo,
    PaymentRecord, PaymentStatus, Product, StoredFile, Tax,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{DateRange, Repository, UnitOfWork};

const CONTACT_COLUMNS: &str = "id, org_id, name, roles, email, phone, address, vendor_reference, archived, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, org_id, name, kind, sales_price, purchase_price, hsn_code, category, sales_tax_id, purchase_tax_id, archived, created_at, updated_at";
const TAX_COLUMNS: &str = "id, org_id, name, computation, rate, applicability, created_at, updated_at";
const ACCOUNT_COLUMNS: &str = "id, org_id, name, account_type, description, active, created_at, updated_at";
const INVOICE_COLUMNS: &str = "id, org_id, customer_id, issue_date, due_date, status, total_amount, tax_total, grand_total, pdf_file_id, payment_method, payment_transaction_id, amount_paid, payment_date, created_at, updated_at";
const LINE_ITEM_COLUMNS: &str = "id, invoice_id, position, product_id, description, quantity, unit_price, tax_id, line_total, tax_amount";
const PAYMENT_COLUMNS: &str = "payment_id, org_id, invoice_id, contact_id, payer_name, payer_email, payer_phone, payer_address, amount, payment_date, method, transaction_id, status, created_at";
const LEDGER_COLUMNS: &str = "id, org_id, date, account_type, category, description, amount, reference, contact_id, created_at";
const PARTNER_STATUS_COLUMNS: &str = "contact_id, org_id, last_payment_date, last_payment_amount, total_paid, status, updated_at";
const FILE_COLUMNS: &str = "id, org_id, invoice_id, filename, content_type, size_bytes, storage_key, created_at";

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn contact_write_error(email: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AppError::Conflict(
            anyhow::anyhow!("A contact with email '{}' already exists", email),
        ),
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to write contact: {}", e)),
    }
}

#[derive(FromRow)]
struct ContactRow {
    id: Uuid,
    org_id: Uuid,
    name: String,
    roles: Vec<String>,
    email: String,
    phone: Option<String>,
    address: Option<String>,
    vendor_reference: Option<String>,
    archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for Contact {
    type Error = AppError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let roles = row
            .roles
            .iter()
            .map(|r| {
                ContactRole::parse(r).ok_or_else(|| {
                    AppError::DatabaseError(anyhow::anyhow!("Unknown contact role '{}'", r))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Contact {
            id: row.id,
            org_id: row.org_id,
            name: row.name,
            roles,
            email: row.email,
            phone: row.phone,
            address: row.address,
            vendor_reference: row.vendor_reference,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn role_names(contact: &Contact) -> Vec<String> {
    contact.roles.iter().map(|r| r.as_str().to_string()).collect()
}

#[derive(FromRow)]
struct InvoiceRow {
    id: Uuid,
    org_id: Uuid,
    customer_id: Uuid,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    status: InvoiceStatus,
    total_amount: Decimal,
    tax_total: Decimal,
    grand_total: Decimal,
    pdf_file_id: Option<Uuid>,
    payment_method: Option<String>,
    payment_transaction_id: Option<String>,
    amount_paid: Option<Decimal>,
    payment_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, items: Vec<InvoiceLineItem>) -> Invoice {
        let payment = match (
            self.payment_method,
            self.payment_transaction_id,
            self.amount_paid,
            self.payment_date,
        ) {
            (Some(method), Some(transaction_id), Some(amount_paid), Some(payment_date)) => {
                Some(PaymentInfo {
                    method,
                    transaction_id,
                    amount_paid,
                    payment_date,
                })
            }
            _ => None,
        };

        Invoice {
            id: self.id,
            org_id: self.org_id,
            customer_id: self.customer_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            status: self.status,
            items,
            total_amount: self.total_amount,
            tax_total: self.tax_total,
            grand_total: self.grand_total,
            pdf_file_id: self.pdf_file_id,
            payment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct PaymentRow {
    payment_id: String,
    org_id: Uuid,
    invoice_id: Uuid,
    contact_id: Uuid,
    payer_name: String,
    payer_email: String,
    payer_phone: Option<String>,
    payer_address: Option<String>,
    amount: Decimal,
    payment_date: NaiveDate,
    method: String,
    transaction_id: String,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentRecord {
    fn from(row: PaymentRow) -> Self {
        PaymentRecord {
            payment_id: row.payment_id,
            org_id: row.org_id,
            invoice_id: row.invoice_id,
            contact_id: row.contact_id,
            payer: Payer {
                name: row.payer_name,
                email: row.payer_email,
                phone: row.payer_phone,
                address: row.payer_address,
            },
            amount: row.amount,
            payment_date: row.payment_date,
            method: row.method,
            transaction_id: row.transaction_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn items_for(
        &self,
        invoice_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<InvoiceLineItem>>, AppError> {
        let items = sqlx::query_as::<_, InvoiceLineItem>(&format!(
            "SELECT {} FROM invoice_line_items WHERE invoice_id = ANY($1) ORDER BY invoice_id, position",
            LINE_ITEM_COLUMNS
        ))
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load line items"))?;

        let mut grouped: HashMap<Uuid, Vec<InvoiceLineItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.invoice_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl Repository for PgRepository {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    // -------------------------------------------------------------------------
    // Contacts
    // -------------------------------------------------------------------------

    #[instrument(skip(self, contact), fields(org_id = %contact.org_id, contact_id = %contact.id))]
    async fn insert_contact(&self, contact: &Contact) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_contact"])
            .start_timer();

        insert_contact_query(contact)
            .execute(&self.pool)
            .await
            .map_err(contact_write_error(&contact.email))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_contact(&self, org_id: Uuid, id: Uuid) -> Result<Option<Contact>, AppError> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {} FROM contacts WHERE org_id = $1 AND id = $2",
            CONTACT_COLUMNS
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get contact"))?;

        row.map(Contact::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_contact_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<Contact>, AppError> {
        let row = sqlx::query_as::<_, ContactRow>(&format!(
            "SELECT {} FROM contacts WHERE org_id = $1 AND lower(email) = lower($2)",
            CONTACT_COLUMNS
        ))
        .bind(org_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get contact by email"))?;

        row.map(Contact::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn list_contacts(
        &self,
        org_id: Uuid,
        filter: &ContactFilter,
    ) -> Result<Vec<Contact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_contacts"])
            .start_timer();

        let rows = sqlx::query_as::<_, ContactRow>(&format!(
            r#"
            SELECT {} FROM contacts
            WHERE org_id = $1
              AND ($2::bool OR archived = FALSE)
              AND ($3::text IS NULL OR $3 = ANY(roles))
            ORDER BY created_at, id
            "#,
            CONTACT_COLUMNS
        ))
        .bind(org_id)
        .bind(filter.include_archived)
        .bind(filter.role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list contacts"))?;

        timer.observe_duration();

        rows.into_iter().map(Contact::try_from).collect()
    }

    #[instrument(skip(self, contact), fields(contact_id = %contact.id))]
    async fn update_contact(&self, contact: &Contact) -> Result<(), AppError> {
        let result = update_contact_query(contact)
            .execute(&self.pool)
            .await
            .map_err(contact_write_error(&contact.email))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Contact not found")));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn insert_product(&self, product: &Product) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, org_id, name, kind, sales_price, purchase_price, hsn_code, category,
                                  sales_tax_id, purchase_tax_id, archived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(product.id)
        .bind(product.org_id)
        .bind(&product.name)
        .bind(product.kind)
        .bind(product.sales_price)
        .bind(product.purchase_price)
        .bind(&product.hsn_code)
        .bind(&product.category)
        .bind(product.sales_tax_id)
        .bind(product.purchase_tax_id)
        .bind(product.archived)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create product"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_product(&self, org_id: Uuid, id: Uuid) -> Result<Option<Product>, AppError> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE org_id = $1 AND id = $2",
            PRODUCT_COLUMNS
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get product"))
    }

    #[instrument(skip(self))]
    async fn list_products(
        &self,
        org_id: Uuid,
        include_archived: bool,
    ) -> Result<Vec<Product>, AppError> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE org_id = $1 AND ($2::bool OR archived = FALSE) ORDER BY created_at, id",
            PRODUCT_COLUMNS
        ))
        .bind(org_id)
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list products"))
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn update_product(&self, product: &Product) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $3, kind = $4, sales_price = $5, purchase_price = $6, hsn_code = $7,
                category = $8, sales_tax_id = $9, purchase_tax_id = $10, archived = $11, updated_at = $12
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(product.org_id)
        .bind(product.id)
        .bind(&product.name)
        .bind(product.kind)
        .bind(product.sales_price)
        .bind(product.purchase_price)
        .bind(&product.hsn_code)
        .bind(&product.category)
        .bind(product.sales_tax_id)
        .bind(product.purchase_tax_id)
        .bind(product.archived)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update product"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Product not found")));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Taxes
    // -------------------------------------------------------------------------

    #[instrument(skip(self, tax), fields(tax_id = %tax.id))]
    async fn insert_tax(&self, tax: &Tax) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO taxes (id, org_id, name, computation, rate, applicability, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(tax.id)
        .bind(tax.org_id)
        .bind(&tax.name)
        .bind(tax.computation)
        .bind(tax.rate)
        .bind(tax.applicability)
        .bind(tax.created_at)
        .bind(tax.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create tax"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_tax(&self, org_id: Uuid, id: Uuid) -> Result<Option<Tax>, AppError> {
        sqlx::query_as::<_, Tax>(&format!(
            "SELECT {} FROM taxes WHERE org_id = $1 AND id = $2",
            TAX_COLUMNS
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get tax"))
    }

    #[instrument(skip(self))]
    async fn list_taxes(&self, org_id: Uuid) -> Result<Vec<Tax>, AppError> {
        sqlx::query_as::<_, Tax>(&format!(
            "SELECT {} FROM taxes WHERE org_id = $1 ORDER BY created_at, id",
            TAX_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list taxes"))
    }

    #[instrument(skip(self, tax), fields(tax_id = %tax.id))]
    async fn update_tax(&self, tax: &Tax) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE taxes
            SET name = $3, computation = $4, rate = $5, applicability = $6, updated_at = $7
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(tax.org_id)
        .bind(tax.id)
        .bind(&tax.name)
        .bind(tax.computation)
        .bind(tax.rate)
        .bind(tax.applicability)
        .bind(tax.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update tax"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Tax not found")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_tax(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM taxes WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete tax"))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Chart of accounts
    // -------------------------------------------------------------------------

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn insert_account(&self, account: &ChartOfAccount) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO chart_of_accounts (id, org_id, name, account_type, description, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(account.org_id)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(&account.description)
        .bind(account.active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to create account"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_account(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ChartOfAccount>, AppError> {
        sqlx::query_as::<_, ChartOfAccount>(&format!(
            "SELECT {} FROM chart_of_accounts WHERE org_id = $1 AND id = $2",
            ACCOUNT_COLUMNS
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get account"))
    }

    #[instrument(skip(self))]
    async fn list_accounts(
        &self,
        org_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<ChartOfAccount>, AppError> {
        sqlx::query_as::<_, ChartOfAccount>(&format!(
            "SELECT {} FROM chart_of_accounts WHERE org_id = $1 AND ($2::bool OR active = TRUE) ORDER BY created_at, id",
            ACCOUNT_COLUMNS
        ))
        .bind(org_id)
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list accounts"))
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn update_account(&self, account: &ChartOfAccount) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE chart_of_accounts
            SET name = $3, account_type = $4, description = $5, active = $6, updated_at = $7
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(account.org_id)
        .bind(account.id)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(&account.description)
        .bind(account.active)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update account"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Account not found")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_account(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM chart_of_accounts WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete account"))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn find_invoice(&self, org_id: Uuid, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice"])
            .start_timer();

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE org_id = $1 AND id = $2",
            INVOICE_COLUMNS
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get invoice"))?;

        let invoice = match row {
            Some(row) => {
                let mut items = self.items_for(&[row.id]).await?;
                let items = items.remove(&row.id).unwrap_or_default();
                Some(row.into_invoice(items))
            }
            None => None,
        };

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn list_invoices(
        &self,
        org_id: Uuid,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE org_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
            ORDER BY issue_date, created_at, id
            "#,
            INVOICE_COLUMNS
        ))
        .bind(org_id)
        .bind(filter.status)
        .bind(filter.customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list invoices"))?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.items_for(&ids).await?;

        timer.observe_duration();

        Ok(rows
            .into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_invoice(lines)
            })
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
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3,
                payment_method = COALESCE($4, payment_method),
                payment_transaction_id = COALESCE($5, payment_transaction_id),
                amount_paid = COALESCE($6, amount_paid),
                payment_date = COALESCE($7, payment_date),
                updated_at = NOW()
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(org_id)
        .bind(id)
        .bind(status)
        .bind(payment.map(|p| p.method.as_str()))
        .bind(payment.map(|p| p.transaction_id.as_str()))
        .bind(payment.map(|p| p.amount_paid))
        .bind(payment.map(|p| p.payment_date))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update invoice status"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_invoice_pdf(
        &self,
        org_id: Uuid,
        id: Uuid,
        file_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE invoices SET pdf_file_id = $3, updated_at = NOW() WHERE org_id = $1 AND id = $2",
        )
        .bind(org_id)
        .bind(id)
        .bind(file_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to link invoice PDF"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn find_payment(
        &self,
        org_id: Uuid,
        payment_id: &str,
    ) -> Result<Option<PaymentRecord>, AppError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE org_id = $1 AND payment_id = $2",
            PAYMENT_COLUMNS
        ))
        .bind(org_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get payment"))?;

        Ok(row.map(PaymentRecord::from))
    }

    #[instrument(skip(self))]
    async fn list_payments(
        &self,
        org_id: Uuid,
        contact_id: Option<Uuid>,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {} FROM payments
            WHERE org_id = $1 AND ($2::uuid IS NULL OR contact_id = $2)
            ORDER BY payment_date, created_at
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(org_id)
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list payments"))?;

        Ok(rows.into_iter().map(PaymentRecord::from).collect())
    }

    // -------------------------------------------------------------------------
    // Ledger
    // -------------------------------------------------------------------------

    #[instrument(skip(self, txn), fields(ledger_id = %txn.id))]
    async fn insert_ledger_transaction(&self, txn: &LedgerTransaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_transactions (id, org_id, date, account_type, category, description,
                                             amount, reference, contact_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(txn.id)
        .bind(txn.org_id)
        .bind(txn.date)
        .bind(txn.account_type)
        .bind(&txn.category)
        .bind(&txn.description)
        .bind(txn.amount)
        .bind(&txn.reference)
        .bind(txn.contact_id)
        .bind(txn.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to insert ledger transaction"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_ledger_transactions(
        &self,
        org_id: Uuid,
        range: &DateRange,
    ) -> Result<Vec<LedgerTransaction>, AppError> {
        sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            SELECT {} FROM ledger_transactions
            WHERE org_id = $1
              AND ($2::date IS NULL OR date >= $2)
              AND ($3::date IS NULL OR date <= $3)
            ORDER BY date, created_at
            "#,
            LEDGER_COLUMNS
        ))
        .bind(org_id)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list ledger transactions"))
    }

    // -------------------------------------------------------------------------
    // Partner status
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn find_partner_status(
        &self,
        org_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<PartnerStatus>, AppError> {
        sqlx::query_as::<_, PartnerStatus>(&format!(
            "SELECT {} FROM partner_status WHERE org_id = $1 AND contact_id = $2",
            PARTNER_STATUS_COLUMNS
        ))
        .bind(org_id)
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get partner status"))
    }

    #[instrument(skip(self, status), fields(contact_id = %status.contact_id))]
    async fn upsert_partner_status(&self, status: &PartnerStatus) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO partner_status (contact_id, org_id, last_payment_date, last_payment_amount,
                                        total_paid, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (org_id, contact_id) DO UPDATE
            SET last_payment_date = EXCLUDED.last_payment_date,
                last_payment_amount = EXCLUDED.last_payment_amount,
                total_paid = EXCLUDED.total_paid,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(status.contact_id)
        .bind(status.org_id)
        .bind(status.last_payment_date)
        .bind(status.last_payment_amount)
        .bind(status.total_paid)
        .bind(&status.status)
        .bind(status.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to upsert partner status"))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Stored files
    // -------------------------------------------------------------------------

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn insert_file(&self, file: &StoredFile) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO stored_files (id, org_id, invoice_id, filename, content_type, size_bytes, storage_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(file.id)
        .bind(file.org_id)
        .bind(file.invoice_id)
        .bind(&file.filename)
        .bind(&file.content_type)
        .bind(file.size_bytes)
        .bind(&file.storage_key)
        .bind(file.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to record file"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_file(&self, org_id: Uuid, id: Uuid) -> Result<Option<StoredFile>, AppError> {
        sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {} FROM stored_files WHERE org_id = $1 AND id = $2",
            FILE_COLUMNS
        ))
        .bind(org_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get file"))
    }

    #[instrument(skip(self))]
    async fn delete_file(&self, org_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM stored_files WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete file"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn insert_contact_query(contact: &Contact) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO contacts (id, org_id, name, roles, email, phone, address, vendor_reference,
                              archived, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(contact.id)
    .bind(contact.org_id)
    .bind(&contact.name)
    .bind(role_names(contact))
    .bind(&contact.email)
    .bind(&contact.phone)
    .bind(&contact.address)
    .bind(&contact.vendor_reference)
    .bind(contact.archived)
    .bind(contact.created_at)
    .bind(contact.updated_at)
}

fn update_contact_query(contact: &Contact) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        UPDATE contacts
        SET name = $3, roles = $4, email = $5, phone = $6, address = $7, vendor_reference = $8,
            archived = $9, updated_at = $10
        WHERE org_id = $1 AND id = $2
        "#,
    )
    .bind(contact.org_id)
    .bind(contact.id)
    .bind(&contact.name)
    .bind(role_names(contact))
    .bind(&contact.email)
    .bind(&contact.phone)
    .bind(&contact.address)
    .bind(&contact.vendor_reference)
    .bind(contact.archived)
    .bind(contact.updated_at)
}

/// A live PostgreSQL transaction. Dropping it without `commit` rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_contact(&mut self, contact: &Contact) -> Result<(), AppError> {
        insert_contact_query(contact)
            .execute(&mut *self.tx)
            .await
            .map_err(contact_write_error(&contact.email))?;
        Ok(())
    }

    async fn update_contact(&mut self, contact: &Contact) -> Result<(), AppError> {
        update_contact_query(contact)
            .execute(&mut *self.tx)
            .await
            .map_err(contact_write_error(&contact.email))?;
        Ok(())
    }

    async fn insert_invoice_header(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, org_id, customer_id, issue_date, due_date, status,
                                  total_amount, tax_total, grand_total, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, 0, 0, $7, $8)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.org_id)
        .bind(invoice.customer_id)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.status)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert invoice header"))?;
        Ok(())
    }

    async fn insert_line_item(&mut self, item: &InvoiceLineItem) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO invoice_line_items (id, invoice_id, position, product_id, description,
                                            quantity, unit_price, tax_id, line_total, tax_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(item.id)
        .bind(item.invoice_id)
        .bind(item.position)
        .bind(item.product_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.tax_id)
        .bind(item.line_total)
        .bind(item.tax_amount)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert line item"))?;
        Ok(())
    }

    async fn update_invoice_totals(
        &mut self,
        invoice_id: Uuid,
        totals: &InvoiceTotals,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET total_amount = $2, tax_total = $3, grand_total = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(totals.total_amount)
        .bind(totals.tax_total)
        .bind(totals.grand_total)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to update invoice totals"))?;

        if result.rows_affected() != 1 {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Invoice {} vanished before totals were written",
                invoice_id
            )));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, org_id, invoice_id, contact_id, payer_name, payer_email,
                                  payer_phone, payer_address, amount, payment_date, method,
                                  transaction_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&payment.payment_id)
        .bind(payment.org_id)
        .bind(payment.invoice_id)
        .bind(payment.contact_id)
        .bind(&payment.payer.name)
        .bind(&payment.payer.email)
        .bind(&payment.payer.phone)
        .bind(&payment.payer.address)
        .bind(payment.amount)
        .bind(payment.payment_date)
        .bind(&payment.method)
        .bind(&payment.transaction_id)
        .bind(payment.status)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert payment"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(db_error("Failed to commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .rollback()
            .await
            .map_err(db_error("Failed to roll back transaction"))
    }
}
