use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    error_detail::{error_detail_middleware, ExposeErrorDetail},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{Config, DatabaseBackend, StorageBackend};
use crate::handlers;
use crate::middleware::{auth_middleware, metrics_middleware};
use crate::services::{
    DocumentService, InMemoryRepository, InvoiceBuilder, JwtService, LocalStorage,
    MemoryStorage, PaymentWorkflow, PdfRenderer, PgRepository, PrintPdfRenderer,
    ReportService, Repository, Storage,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repo: Arc<dyn Repository>,
    pub storage: Arc<dyn Storage>,
    pub jwt: JwtService,
    pub invoice_builder: InvoiceBuilder,
    pub payment_workflow: PaymentWorkflow,
    pub documents: DocumentService,
    pub reports: ReportService,
}

impl AppState {
    /// Wire the services over an already constructed repository and storage.
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        storage: Arc<dyn Storage>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        let jwt = JwtService::new(&config.jwt);
        let invoice_builder = InvoiceBuilder::new(repo.clone());
        let documents = DocumentService::new(repo.clone(), storage.clone(), renderer);
        let payment_workflow =
            PaymentWorkflow::new(repo.clone(), invoice_builder.clone(), documents.clone());
        let reports = ReportService::new(repo.clone());

        Self {
            config,
            repo,
            storage,
            jwt,
            invoice_builder,
            payment_workflow,
            documents,
            reports,
        }
    }

    /// Connect the configured backends.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let repo: Arc<dyn Repository> = match config.database.backend {
            DatabaseBackend::Postgres => {
                let pg = PgRepository::connect(
                    config.database.url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                if config.database.run_migrations {
                    pg.run_migrations().await?;
                }
                Arc::new(pg)
            }
            DatabaseBackend::Memory => {
                tracing::warn!("Using the in-memory repository; data is lost on restart");
                Arc::new(InMemoryRepository::new())
            }
        };

        let storage: Arc<dyn Storage> = match config.storage.backend {
            StorageBackend::Local => Arc::new(
                LocalStorage::new(&config.storage.path)
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            "Failed to initialize local storage at {}: {}",
                            config.storage.path,
                            e
                        );
                        e
                    })?,
            ),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };

        Ok(Self::new(
            config.clone(),
            repo,
            storage,
            Arc::new(PrintPdfRenderer),
        ))
    }
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/contacts",
            get(handlers::contacts::list_contacts).post(handlers::contacts::create_contact),
        )
        .route(
            "/contacts/:id",
            get(handlers::contacts::get_contact).patch(handlers::contacts::update_contact),
        )
        .route(
            "/contacts/:id/archive",
            post(handlers::contacts::archive_contact),
        )
        .route(
            "/contacts/:id/unarchive",
            post(handlers::contacts::unarchive_contact),
        )
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product).patch(handlers::products::update_product),
        )
        .route(
            "/products/:id/archive",
            post(handlers::products::archive_product),
        )
        .route(
            "/products/:id/unarchive",
            post(handlers::products::unarchive_product),
        )
        .route(
            "/taxes",
            get(handlers::taxes::list_taxes).post(handlers::taxes::create_tax),
        )
        .route(
            "/taxes/:id",
            get(handlers::taxes::get_tax)
                .patch(handlers::taxes::update_tax)
                .delete(handlers::taxes::delete_tax),
        )
        .route(
            "/accounts",
            get(handlers::accounts::list_accounts).post(handlers::accounts::create_account),
        )
        .route(
            "/accounts/:id",
            get(handlers::accounts::get_account)
                .patch(handlers::accounts::update_account)
                .delete(handlers::accounts::delete_account),
        )
        .route(
            "/invoices",
            get(handlers::invoices::list_invoices).post(handlers::invoices::create_invoice),
        )
        .route("/invoices/:id", get(handlers::invoices::get_invoice))
        .route(
            "/invoices/:id/status",
            patch(handlers::invoices::update_invoice_status),
        )
        .route(
            "/invoices/:id/pdf",
            post(handlers::invoices::generate_invoice_pdf),
        )
        .route("/payments", get(handlers::payments::list_payments))
        .route(
            "/payments/process",
            post(handlers::payments::process_payment),
        )
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/ledger/transactions",
            get(handlers::ledger::list_transactions).post(handlers::ledger::create_transaction),
        )
        .route(
            "/reports/sales-summary",
            get(handlers::reports::sales_summary),
        )
        .route(
            "/reports/balance-sheet",
            get(handlers::reports::balance_sheet),
        )
        .route(
            "/reports/profit-loss",
            get(handlers::reports::profit_and_loss),
        )
        .route(
            "/reports/partner-ledger/:contact_id",
            get(handlers::reports::partner_ledger),
        )
        .route(
            "/files/:id",
            get(handlers::files::download_file).delete(handlers::files::delete_file),
        )
        .route("/files/:id/info", get(handlers::files::file_info))
        .route_layer(from_fn_with_state(state, auth_middleware))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: AppState) -> Router {
    let expose_detail = ExposeErrorDetail(!state.config.environment.is_production());
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_endpoint))
        .nest("/api", api_routes(state.clone()))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn_with_state(expose_detail, error_detail_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                    org_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

type ServerFuture = Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

pub struct Application {
    port: u16,
    server: ServerFuture,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let state = AppState::from_config(&config).await?;
        Self::with_state(state).await
    }

    /// Bind and serve an already wired state. Port 0 picks a free port.
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, build_router(state))
            .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::pin(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DatabaseConfig, JwtConfig, ObservabilityConfig, ServerConfig, StorageConfig,
    };
    use axum::body::Body;
    use http_body_util::BodyExt;
    use secrecy::Secret;
    use service_core::config::Environment;
    use tower::ServiceExt;

    fn memory_config() -> Config {
        Config {
            service_name: "invoicing-service".to_string(),
            environment: Environment::Development,
            server: ServerConfig::default(),
            database: DatabaseConfig {
                backend: DatabaseBackend::Memory,
                ..DatabaseConfig::default()
            },
            jwt: JwtConfig {
                secret: Secret::new("router-test-secret-value".to_string()),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                path: String::new(),
            },
            observability: ObservabilityConfig::default(),
        }
    }

    async fn call(uri: &str) -> (axum::http::StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let state = AppState::from_config(&memory_config()).await.unwrap();
        let response = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_public_and_carries_security_headers() {
        let (status, headers, body) = call("/health").await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(headers.contains_key(REQUEST_ID_HEADER));
        assert!(headers.contains_key("x-content-type-options"));
    }

    #[tokio::test]
    async fn api_routes_require_a_token() {
        let (status, _, body) = call("/api/invoices").await;
        assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }
}
