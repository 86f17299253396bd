pub mod auth;
pub mod metrics;

pub use auth::{auth_middleware, AuthUser, ADMIN_ONLY, ADMIN_OR_INVOICING};
pub use metrics::metrics_middleware;
