use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use service_core::error::ErrorKind;
use std::time::Instant;

use crate::services::metrics::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};

/// Record request count and latency per route template, so ids in paths do
/// not explode label cardinality.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &route, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &route])
        .observe(start.elapsed().as_secs_f64());
    match response.extensions().get::<ErrorKind>() {
        Some(ErrorKind(kind)) => ERRORS_TOTAL.with_label_values(&[*kind]).inc(),
        // Failures that never went through `AppError` (rejections, panics).
        None if status.is_server_error() => ERRORS_TOTAL.with_label_values(&["http_5xx"]).inc(),
        None => {}
    }

    response
}
