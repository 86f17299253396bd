//! Shared setup for invoicing-service HTTP tests. Each test gets its own
//! server on a random port, backed by the in-memory repository and storage.

#![allow(dead_code)]

use chrono::Duration;
use invoicing_service::config::{
    Config, DatabaseBackend, DatabaseConfig, JwtConfig, ObservabilityConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
use invoicing_service::services::{
    init_metrics, InMemoryRepository, JwtService, MemoryStorage, PdfRenderer, PrintPdfRenderer,
    Role,
};
use invoicing_service::{AppState, Application};
use reqwest::{Client, Response};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Environment;
use std::sync::Arc;
use uuid::Uuid;

pub const ORG_ID: Uuid = Uuid::from_u128(0x0000_0001_0000_0000_0000_0000_0000_0001);
pub const OTHER_ORG_ID: Uuid = Uuid::from_u128(0x0000_0002_0000_0000_0000_0000_0000_0002);
pub const TEST_JWT_SECRET: &str = "test-secret-for-invoicing-tests";

pub fn test_config() -> Config {
    Config {
        service_name: "invoicing-service".to_string(),
        environment: Environment::Development,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            allowed_origins: Vec::new(),
        },
        database: DatabaseConfig {
            backend: DatabaseBackend::Memory,
            ..DatabaseConfig::default()
        },
        jwt: JwtConfig {
            secret: Secret::new(TEST_JWT_SECRET.to_string()),
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            path: String::new(),
        },
        observability: ObservabilityConfig::default(),
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MemoryStorage,
    pub jwt: JwtService,
    pub client: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_renderer(Arc::new(PrintPdfRenderer)).await
    }

    pub async fn spawn_with_renderer(renderer: Arc<dyn PdfRenderer>) -> Self {
        init_metrics();

        let config = test_config();
        let repo = Arc::new(InMemoryRepository::new());
        let storage = MemoryStorage::new();
        let jwt = JwtService::new(&config.jwt);

        let state = AppState::new(config, repo.clone(), Arc::new(storage.clone()), renderer);
        let app = Application::with_state(state)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let address = format!("http://127.0.0.1:{}", port);
        let client = Client::new();
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            repo,
            storage,
            jwt,
            client,
        }
    }

    pub fn token_for(&self, role: Role, org_id: Uuid) -> String {
        self.jwt
            .issue("test-user", role, org_id, Duration::minutes(15))
            .expect("Failed to issue token")
    }

    pub fn token(&self, role: Role) -> String {
        self.token_for(role, ORG_ID)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub async fn get(&self, path: &str, role: Role) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(self.token(role))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, role: Role, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(self.token(role))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, role: Role, body: &Value) -> Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(self.token(role))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, role: Role) -> Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(self.token(role))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// POST as admin and return `data`, asserting a 2xx.
    pub async fn create(&self, path: &str, body: Value) -> Value {
        let response = self.post(path, Role::Admin, &body).await;
        let status = response.status();
        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert!(status.is_success(), "POST {} failed: {} {}", path, status, body);
        body["data"].clone()
    }

    pub async fn create_customer(&self, name: &str, email: &str) -> Value {
        self.create(
            "/contacts",
            json!({ "name": name, "roles": ["customer"], "email": email }),
        )
        .await
    }

    pub async fn create_product(&self, name: &str, price: &str) -> Value {
        self.create(
            "/products",
            json!({ "name": name, "kind": "goods", "sales_price": price }),
        )
        .await
    }

    pub async fn create_tax(&self, name: &str, rate: &str, applicability: &str) -> Value {
        self.create(
            "/taxes",
            json!({
                "name": name,
                "computation": "percentage",
                "rate": rate,
                "applicability": applicability,
            }),
        )
        .await
    }
}

/// Read the body as JSON.
pub async fn body(response: Response) -> Value {
    response.json().await.expect("Failed to parse JSON")
}

/// Field names reported in a validation envelope, in order.
pub fn error_fields(body: &Value) -> Vec<String> {
    body["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e["field"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("missing id").to_string()
}
