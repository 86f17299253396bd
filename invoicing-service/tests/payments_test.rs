mod common;

use common::{body, error_fields, id_of, TestApp};
use invoicing_service::models::{Contact, Invoice};
use invoicing_service::services::{FailPoint, PdfRenderer, Role};
use reqwest::StatusCode;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::sync::Arc;

struct OfflineRenderer;

impl PdfRenderer for OfflineRenderer {
    fn render_invoice(&self, _: &Invoice, _: &Contact) -> Result<Vec<u8>, AppError> {
        Err(AppError::InternalError(anyhow::anyhow!("renderer offline")))
    }
}

fn capture(product: &Value, email: &str, amount: &str) -> Value {
    json!({
        "payer": { "name": "Pat Payer", "email": email },
        "items": [{ "product_id": product["id"], "quantity": "2" }],
        "amount": amount,
        "method": "card",
        "transaction_id": "txn_001",
        "payment_date": "2024-05-02",
    })
}

fn step_status(report: &Value, step: &str) -> String {
    report["steps"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["step"] == step)
        .map(|s| s["status"].as_str().unwrap().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn captured_payment_runs_the_whole_workflow() {
    let app = TestApp::spawn().await;
    let product = app.create_product("Consulting hour", "120.00").await;

    let response = app
        .post(
            "/payments/process",
            Role::InvoicingUser,
            &capture(&product, "pat@example.com", "240.00"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body(response).await;
    assert_eq!(body["success"], true);
    let report = &body["data"];
    assert_eq!(report["contact_created"], true);
    assert_eq!(report["invoice_created"], true);
    assert_eq!(report["payment"]["status"], "success");
    assert!(report["payment"]["payment_id"].as_str().unwrap().starts_with("PAY-"));
    for step in ["pdf_stored", "ledger_updated", "partner_status_updated", "invoice_status_updated"] {
        assert_eq!(step_status(report, step), "completed", "step {}", step);
    }

    let invoice_id = report["invoice_id"].as_str().unwrap();
    let invoice = body_of(&app, &format!("/invoices/{}", invoice_id)).await;
    assert_eq!(invoice["status"], "Paid");
    assert_eq!(invoice["issue_date"], "2024-05-02");
    assert_eq!(invoice["due_date"], "2024-05-02");
    assert_eq!(invoice["grand_total"], "240.00");
    assert_eq!(invoice["payment"]["amount_paid"], "240.00");
    assert!(invoice["pdf_file_id"].is_string());

    let ledger = body_of(&app, "/ledger/transactions").await;
    let ledger = ledger.as_array().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0]["account_type"], "income");
    assert_eq!(ledger[0]["category"], "Sales");
    assert_eq!(ledger[0]["reference"], report["payment"]["payment_id"]);

    let payments = body_of(&app, "/payments").await;
    assert_eq!(payments.as_array().unwrap().len(), 1);
    let payment_id = report["payment"]["payment_id"].as_str().unwrap();
    let fetched = app.get(&format!("/payments/{}", payment_id), Role::Admin).await;
    assert_eq!(fetched.status(), StatusCode::OK);
}

async fn body_of(app: &TestApp, path: &str) -> Value {
    body(app.get(path, Role::Admin).await).await["data"].clone()
}

#[tokio::test]
async fn pdf_failure_is_reported_but_payment_stands() {
    let app = TestApp::spawn_with_renderer(Arc::new(OfflineRenderer)).await;
    let product = app.create_product("Consulting hour", "120.00").await;

    let response = app
        .post("/payments/process", Role::Admin, &capture(&product, "pat@example.com", "240.00"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body(response).await;
    let report = &body["data"];
    assert_eq!(step_status(report, "pdf_stored"), "failed");
    assert!(report["steps"][0]["reason"].as_str().unwrap().contains("renderer offline"));
    assert_eq!(step_status(report, "ledger_updated"), "completed");
    assert_eq!(step_status(report, "invoice_status_updated"), "completed");
    assert_eq!(app.repo.payment_count().await, 1);
}

#[tokio::test]
async fn ledger_failure_does_not_block_later_steps() {
    let app = TestApp::spawn().await;
    let product = app.create_product("Consulting hour", "120.00").await;
    app.repo.fail_on(FailPoint::InsertLedgerTransaction).await;

    let response = app
        .post("/payments/process", Role::Admin, &capture(&product, "pat@example.com", "240.00"))
        .await;

    let body = body(response).await;
    let report = &body["data"];
    assert_eq!(step_status(report, "ledger_updated"), "failed");
    assert_eq!(step_status(report, "partner_status_updated"), "completed");
    assert_eq!(step_status(report, "invoice_status_updated"), "completed");
}

#[tokio::test]
async fn failed_payment_write_rolls_everything_back() {
    let app = TestApp::spawn().await;
    let product = app.create_product("Consulting hour", "120.00").await;
    app.repo.fail_on(FailPoint::InsertPayment).await;

    let response = app
        .post("/payments/process", Role::Admin, &capture(&product, "new@example.com", "240.00"))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(response).await["success"], false);
    assert_eq!(app.repo.invoice_count().await, 0);
    assert_eq!(app.repo.payment_count().await, 0);

    let contacts = body_of(&app, "/contacts?include_archived=true").await;
    assert!(contacts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn paying_an_existing_invoice_reuses_it() {
    let app = TestApp::spawn().await;
    let customer = app.create_customer("Acme", "acme@example.com").await;
    let product = app.create_product("Widget", "50.00").await;
    let invoice = app
        .create(
            "/invoices",
            json!({
                "customer_id": customer["id"],
                "issue_date": "2024-06-01",
                "due_date": "2024-06-30",
                "status": "Posted",
                "items": [{ "product_id": product["id"], "quantity": "1" }],
            }),
        )
        .await;

    let report = app
        .create(
            "/payments/process",
            json!({
                "invoice_id": invoice["id"],
                "payer": { "name": "Acme", "email": "acme@example.com" },
                "amount": "50.00",
                "method": "bank_transfer",
                "transaction_id": "wire-77",
            }),
        )
        .await;

    assert_eq!(report["invoice_id"], invoice["id"]);
    assert_eq!(report["invoice_created"], false);
    assert_eq!(report["contact_created"], false);

    let status = body_of(&app, &format!("/reports/partner-ledger/{}", id_of(&customer))).await;
    assert_eq!(status["status"]["total_paid"], "50.00");
    assert_eq!(status["closing_balance"], "0.00");
}

#[tokio::test]
async fn third_party_payer_settles_the_customer_invoice() {
    let app = TestApp::spawn().await;
    let customer = app.create_customer("Acme", "acme@example.com").await;
    let product = app.create_product("Widget", "50.00").await;
    let invoice = app
        .create(
            "/invoices",
            json!({
                "customer_id": customer["id"],
                "issue_date": "2024-06-01",
                "due_date": "2024-06-30",
                "status": "Posted",
                "items": [{ "product_id": product["id"], "quantity": "1" }],
            }),
        )
        .await;

    let report = app
        .create(
            "/payments/process",
            json!({
                "invoice_id": invoice["id"],
                "payer": { "name": "Acme AP", "email": "ap@acme.example" },
                "amount": "50.00",
                "method": "bank_transfer",
                "transaction_id": "wire-78",
            }),
        )
        .await;

    assert_eq!(report["contact_created"], false);
    assert_eq!(report["payment"]["contact_id"], customer["id"]);
    assert_eq!(report["payment"]["payer"]["email"], "ap@acme.example");

    let contacts = body_of(&app, "/contacts?include_archived=true").await;
    assert_eq!(contacts.as_array().unwrap().len(), 1);

    let paid = body_of(&app, &format!("/invoices/{}", id_of(&invoice))).await;
    assert_eq!(paid["status"], "Paid");

    let ledger = body_of(&app, &format!("/reports/partner-ledger/{}", id_of(&customer))).await;
    assert_eq!(ledger["closing_balance"], "0.00");
    assert_eq!(ledger["status"]["total_paid"], "50.00");
    assert_eq!(ledger["status"]["status"], "Paid");
}

#[tokio::test]
async fn oversized_capture_amount_is_invalid() {
    let app = TestApp::spawn().await;
    let product = app.create_product("Widget", "10.00").await;

    let response = app
        .post(
            "/payments/process",
            Role::Admin,
            &capture(&product, "pat@example.com", "1000000000000.00"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body(response).await), vec!["amount"]);
    assert_eq!(app.repo.payment_count().await, 0);
}

#[tokio::test]
async fn capture_without_invoice_or_items_is_invalid() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/payments/process",
            Role::Admin,
            &json!({
                "payer": { "name": "Pat", "email": "pat@example.com" },
                "amount": "10.00",
                "method": "card",
                "transaction_id": "txn",
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body(response).await), vec!["items"]);
}

#[tokio::test]
async fn zero_amount_is_invalid() {
    let app = TestApp::spawn().await;
    let product = app.create_product("Widget", "10.00").await;

    let response = app
        .post("/payments/process", Role::Admin, &capture(&product, "pat@example.com", "0"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_fields(&body(response).await).contains(&"amount".to_string()));
}

#[tokio::test]
async fn contact_users_cannot_process_payments() {
    let app = TestApp::spawn().await;
    let product = app.create_product("Widget", "10.00").await;

    let response = app
        .post(
            "/payments/process",
            Role::ContactUser,
            &capture(&product, "pat@example.com", "20.00"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
