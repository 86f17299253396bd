//! Services module for invoicing-service.

pub mod documents;
pub mod invoice_builder;
pub mod jwt;
pub mod memory;
pub mod metrics;
pub mod money;
pub mod payment_workflow;
pub mod pdf;
pub mod postgres;
pub mod reports;
pub mod repository;
pub mod storage;

pub use documents::DocumentService;
pub use invoice_builder::InvoiceBuilder;
pub use jwt::{Claims, JwtService, Role};
pub use memory::{FailPoint, InMemoryRepository};
pub use metrics::{get_metrics, init_metrics};
pub use payment_workflow::{PaymentWorkflow, StepOutcome, WorkflowReport, WorkflowStep};
pub use pdf::{PdfRenderer, PrintPdfRenderer};
pub use postgres::PgRepository;
pub use reports::ReportService;
pub use repository::{DateRange, Repository, UnitOfWork};
pub use storage::{LocalStorage, MemoryStorage, Storage};
