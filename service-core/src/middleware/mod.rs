pub mod error_detail;
pub mod security_headers;
pub mod tracing;
