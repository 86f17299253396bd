//! Invoice PDF rendering.

use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point,
};
use service_core::error::AppError;

use crate::models::{Contact, Invoice};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_RIGHT: f32 = 195.0;
const BOTTOM_LIMIT: f32 = 30.0;

/// Turns an invoice into PDF bytes.
pub trait PdfRenderer: Send + Sync {
    fn render_invoice(&self, invoice: &Invoice, customer: &Contact) -> Result<Vec<u8>, AppError>;
}

fn pdf_error(e: impl std::fmt::Display) -> AppError {
    AppError::InternalError(anyhow::anyhow!("PDF rendering failed: {}", e))
}

/// A4 single-column layout using the builtin Helvetica fonts.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintPdfRenderer;

struct Cursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    font: &'a IndirectFontRef,
    y: f32,
}

impl Cursor<'_> {
    fn text(&self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
    }

    fn rule(&self) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT), Mm(self.y)), false),
                (Point::new(Mm(MARGIN_RIGHT), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }

    /// Move down, starting a fresh page when the bottom margin is reached.
    fn advance(&mut self, by: f32) {
        self.y -= by;
        if self.y < BOTTOM_LIMIT {
            let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT - 20.0;
            self.text("(continued)", 9.0, MARGIN_LEFT, self.font);
            self.y -= 8.0;
        }
    }
}

impl PdfRenderer for PrintPdfRenderer {
    fn render_invoice(&self, invoice: &Invoice, customer: &Contact) -> Result<Vec<u8>, AppError> {
        let (doc, page1, layer1) = PdfDocument::new(
            format!("Invoice {}", invoice.id),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Layer 1",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;

        let layer = doc.get_page(page1).get_layer(layer1);
        let mut cur = Cursor {
            doc: &doc,
            layer,
            font: &font,
            y: 280.0,
        };

        cur.text("INVOICE", 22.0, MARGIN_LEFT, &bold);
        cur.text(invoice.status.as_str(), 12.0, 160.0, &bold);
        cur.advance(9.0);
        cur.text(&invoice.id.to_string(), 9.0, MARGIN_LEFT, &font);
        cur.advance(6.0);
        cur.rule();

        cur.advance(9.0);
        cur.text("Bill to:", 11.0, MARGIN_LEFT, &bold);
        cur.text(&format!("Issue date: {}", invoice.issue_date), 10.0, 120.0, &font);
        cur.advance(6.0);
        cur.text(&customer.name, 10.0, MARGIN_LEFT, &font);
        cur.text(&format!("Due date: {}", invoice.due_date), 10.0, 120.0, &font);
        cur.advance(5.0);
        cur.text(&customer.email, 10.0, MARGIN_LEFT, &font);
        if let Some(address) = &customer.address {
            cur.advance(5.0);
            cur.text(address, 10.0, MARGIN_LEFT, &font);
        }

        cur.advance(12.0);
        cur.text("Description", 10.0, MARGIN_LEFT, &bold);
        cur.text("Qty", 10.0, 110.0, &bold);
        cur.text("Unit price", 10.0, 130.0, &bold);
        cur.text("Tax", 10.0, 155.0, &bold);
        cur.text("Total", 10.0, 175.0, &bold);
        cur.advance(3.5);
        cur.rule();

        for (idx, item) in invoice.items.iter().enumerate() {
            cur.advance(7.0);
            cur.text(&format!("{}. {}", idx + 1, item.description), 10.0, MARGIN_LEFT, &font);
            cur.text(&item.quantity.normalize().to_string(), 10.0, 110.0, &font);
            cur.text(&item.unit_price.to_string(), 10.0, 130.0, &font);
            cur.text(&item.tax_amount.to_string(), 10.0, 155.0, &font);
            cur.text(&item.line_total.to_string(), 10.0, 175.0, &font);
        }

        cur.advance(5.0);
        cur.rule();
        cur.advance(9.0);
        cur.text("Subtotal:", 11.0, 140.0, &font);
        cur.text(&invoice.total_amount.to_string(), 11.0, 175.0, &font);
        cur.advance(6.0);
        cur.text("Tax:", 11.0, 140.0, &font);
        cur.text(&invoice.tax_total.to_string(), 11.0, 175.0, &font);
        cur.advance(7.0);
        cur.text("TOTAL:", 13.0, 140.0, &bold);
        cur.text(&invoice.grand_total.to_string(), 13.0, 175.0, &bold);

        if let Some(payment) = &invoice.payment {
            cur.advance(12.0);
            cur.text(
                &format!(
                    "Paid {} on {} via {} (ref {})",
                    payment.amount_paid, payment.payment_date, payment.method, payment.transaction_id
                ),
                10.0,
                MARGIN_LEFT,
                &font,
            );
        }

        let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
        doc.save(&mut writer).map_err(pdf_error)?;
        writer.into_inner().map_err(pdf_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactRole, InvoiceLineItem, InvoiceStatus};
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn fixture(lines: usize) -> (Invoice, Contact) {
        let now = Utc::now();
        let org_id = Uuid::new_v4();
        let invoice_id = Uuid::new_v4();
        let customer = Contact {
            id: Uuid::new_v4(),
            org_id,
            name: "Jane Doe".to_string(),
            roles: vec![ContactRole::Customer],
            email: "jane@example.com".to_string(),
            phone: None,
            address: Some("1 Main St".to_string()),
            vendor_reference: None,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        let items = (0..lines)
            .map(|i| InvoiceLineItem {
                id: Uuid::new_v4(),
                invoice_id,
                position: i as i32,
                product_id: Uuid::new_v4(),
                description: format!("Item {}", i),
                quantity: Decimal::ONE,
                unit_price: Decimal::new(1000, 2),
                tax_id: None,
                line_total: Decimal::new(1000, 2),
                tax_amount: Decimal::new(0, 2),
            })
            .collect();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let invoice = Invoice {
            id: invoice_id,
            org_id,
            customer_id: customer.id,
            issue_date: date,
            due_date: date,
            status: InvoiceStatus::Posted,
            items,
            total_amount: Decimal::new(1000 * lines as i64, 2),
            tax_total: Decimal::new(0, 2),
            grand_total: Decimal::new(1000 * lines as i64, 2),
            pdf_file_id: None,
            payment: None,
            created_at: now,
            updated_at: now,
        };
        (invoice, customer)
    }

    #[test]
    fn renders_a_pdf_document() {
        let (invoice, customer) = fixture(2);
        let bytes = PrintPdfRenderer.render_invoice(&invoice, &customer).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_invoices_spill_onto_extra_pages() {
        let (invoice, customer) = fixture(80);
        let bytes = PrintPdfRenderer.render_invoice(&invoice, &customer).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
