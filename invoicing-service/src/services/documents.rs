//! Invoice document generation and stored-file access.

use std::sync::Arc;

use chrono::Utc;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{StoredFile, PDF_CONTENT_TYPE};
use crate::services::pdf::PdfRenderer;
use crate::services::repository::Repository;
use crate::services::storage::Storage;

#[derive(Clone)]
pub struct DocumentService {
    repo: Arc<dyn Repository>,
    storage: Arc<dyn Storage>,
    renderer: Arc<dyn PdfRenderer>,
}

impl DocumentService {
    pub fn new(
        repo: Arc<dyn Repository>,
        storage: Arc<dyn Storage>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        Self {
            repo,
            storage,
            renderer,
        }
    }

    /// Render, store and link a PDF for the invoice. A previous PDF stays
    /// retrievable by its own id; the invoice points at the newest one.
    #[instrument(skip(self))]
    pub async fn generate_invoice_pdf(
        &self,
        org_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<StoredFile, AppError> {
        let invoice = self
            .repo
            .find_invoice(org_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let customer = self
            .repo
            .find_contact(org_id, invoice.customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;

        let bytes = self.renderer.render_invoice(&invoice, &customer)?;

        let file_id = Uuid::new_v4();
        let storage_key = format!("{}/{}/{}.pdf", org_id, invoice_id, file_id);
        let file = StoredFile {
            id: file_id,
            org_id,
            invoice_id,
            filename: format!("invoice-{}.pdf", invoice_id),
            content_type: PDF_CONTENT_TYPE.to_string(),
            size_bytes: bytes.len() as i64,
            storage_key,
            created_at: Utc::now(),
        };

        self.storage.upload(&file.storage_key, bytes).await?;

        if let Err(e) = self.repo.insert_file(&file).await {
            // The blob is orphaned without its metadata row.
            if let Err(cleanup) = self.storage.delete(&file.storage_key).await {
                warn!(error = %cleanup, key = %file.storage_key, "Failed to remove orphaned PDF");
            }
            return Err(e);
        }

        self.repo
            .set_invoice_pdf(org_id, invoice_id, Some(file.id))
            .await?;

        info!(file_id = %file.id, size = file.size_bytes, "Invoice PDF stored");
        Ok(file)
    }

    pub async fn file_info(&self, org_id: Uuid, file_id: Uuid) -> Result<StoredFile, AppError> {
        self.repo
            .find_file(org_id, file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("File not found")))
    }

    #[instrument(skip(self))]
    pub async fn download(
        &self,
        org_id: Uuid,
        file_id: Uuid,
    ) -> Result<(StoredFile, Vec<u8>), AppError> {
        let file = self.file_info(org_id, file_id).await?;
        let bytes = self.storage.download(&file.storage_key).await?;
        Ok((file, bytes))
    }

    /// Remove the blob and its record, and unlink it from the invoice if it
    /// is the current PDF.
    #[instrument(skip(self))]
    pub async fn delete(&self, org_id: Uuid, file_id: Uuid) -> Result<(), AppError> {
        let file = self.file_info(org_id, file_id).await?;

        if let Some(invoice) = self.repo.find_invoice(org_id, file.invoice_id).await? {
            if invoice.pdf_file_id == Some(file.id) {
                self.repo.set_invoice_pdf(org_id, invoice.id, None).await?;
            }
        }

        self.repo.delete_file(org_id, file.id).await?;
        self.storage.delete(&file.storage_key).await?;

        info!(file_id = %file.id, "Stored file deleted");
        Ok(())
    }
}
