mod common;

use common::{body, TestApp, OTHER_ORG_ID};
use invoicing_service::services::Role;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/contacts"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/contacts"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body(response).await["message"], "Invalid or expired token");
}

#[tokio::test]
async fn contact_user_can_read_but_not_write() {
    let app = TestApp::spawn().await;

    let list = app.get("/contacts", Role::ContactUser).await;
    assert_eq!(list.status(), StatusCode::OK);

    let create = app
        .post(
            "/contacts",
            Role::ContactUser,
            &json!({ "name": "Acme", "roles": ["customer"], "email": "acme@example.com" }),
        )
        .await;
    assert_eq!(create.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tax_writes_are_admin_only() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/taxes",
            Role::InvoicingUser,
            &json!({ "name": "VAT", "computation": "percentage", "rate": "20", "applicability": "sales" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let reports = app.get("/reports/sales-summary", Role::ContactUser).await;
    assert_eq!(reports.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn organizations_do_not_see_each_other() {
    let app = TestApp::spawn().await;
    let contact = app.create_customer("Acme", "acme@example.com").await;
    let id = contact["id"].as_str().unwrap();

    let response = app
        .client
        .get(app.url(&format!("/contacts/{}", id)))
        .bearer_auth(app.token_for(Role::Admin, OTHER_ORG_ID))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
