mod common;

use common::{body, error_fields, id_of, TestApp};
use invoicing_service::services::Role;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn product_lifecycle() {
    let app = TestApp::spawn().await;
    let tax = app.create_tax("GST 18", "18", "sales").await;

    let product = app
        .create(
            "/products",
            json!({
                "name": "Widget",
                "kind": "goods",
                "sales_price": "124.99",
                "purchase_price": "80.00",
                "hsn_code": "8471",
                "sales_tax_id": tax["id"],
            }),
        )
        .await;
    assert_eq!(product["sales_price"], "124.99");
    assert_eq!(product["sales_tax_id"], tax["id"]);

    let id = id_of(&product);
    let updated = app
        .patch(
            &format!("/products/{}", id),
            Role::InvoicingUser,
            &json!({ "sales_price": "130.00" }),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated = body(updated).await["data"].clone();
    assert_eq!(updated["sales_price"], "130.00");
    assert_eq!(updated["name"], "Widget");

    app.post(&format!("/products/{}/archive", id), Role::Admin, &json!({}))
        .await;
    let listed = body(app.get("/products", Role::Admin).await).await;
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn product_with_unknown_tax_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/products",
            Role::Admin,
            &json!({
                "name": "Widget",
                "kind": "goods",
                "sales_price": "10.00",
                "sales_tax_id": uuid::Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn negative_or_over_precise_prices_are_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/products",
            Role::Admin,
            &json!({
                "name": "Widget",
                "kind": "goods",
                "sales_price": "-1.00",
                "purchase_price": "1.005",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_fields(&body(response).await),
        vec!["purchase_price", "sales_price"]
    );
}

#[tokio::test]
async fn percentage_tax_over_one_hundred_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/taxes",
            Role::Admin,
            &json!({ "name": "Too much", "computation": "percentage", "rate": "150", "applicability": "sales" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&body(response).await), vec!["rate"]);

    // A fixed tax with the same rate is fine, but switching it to a
    // percentage afterwards is not.
    let fixed = app
        .create(
            "/taxes",
            json!({ "name": "Levy", "computation": "fixed", "rate": "150", "applicability": "both" }),
        )
        .await;
    let response = app
        .patch(
            &format!("/taxes/{}", id_of(&fixed)),
            Role::Admin,
            &json!({ "computation": "percentage" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn taxes_are_hard_deleted() {
    let app = TestApp::spawn().await;
    let tax = app.create_tax("VAT", "20", "sales").await;
    let path = format!("/taxes/{}", id_of(&tax));

    let response = app.delete(&path, Role::Admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["message"], "Tax deleted");

    assert_eq!(app.get(&path, Role::Admin).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.delete(&path, Role::Admin).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_accounts_are_hidden_by_default() {
    let app = TestApp::spawn().await;
    app.create("/accounts", json!({ "name": "Bank", "account_type": "asset" }))
        .await;
    let old = app
        .create(
            "/accounts",
            json!({ "name": "Old loan", "account_type": "liability", "active": false }),
        )
        .await;
    assert_eq!(old["active"], false);

    let active = body(app.get("/accounts", Role::ContactUser).await).await;
    assert_eq!(active["data"].as_array().unwrap().len(), 1);

    let all = body(app.get("/accounts?include_inactive=true", Role::Admin).await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let reactivated = app
        .patch(
            &format!("/accounts/{}", id_of(&old)),
            Role::Admin,
            &json!({ "active": true }),
        )
        .await;
    assert_eq!(body(reactivated).await["data"]["active"], true);

    let deleted = app.delete(&format!("/accounts/{}", id_of(&old)), Role::Admin).await;
    assert_eq!(deleted.status(), StatusCode::OK);
}

#[tokio::test]
async fn account_writes_are_admin_only() {
    let app = TestApp::spawn().await;
    let response = app
        .post(
            "/accounts",
            Role::InvoicingUser,
            &json!({ "name": "Bank", "account_type": "asset" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
