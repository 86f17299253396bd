use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{ErrorBody, ErrorDetail};

/// Whether raw server-error causes replace the generic message.
#[derive(Debug, Clone, Copy)]
pub struct ExposeErrorDetail(pub bool);

/// In development, rewrite 5xx envelopes so `message` carries the raw cause
/// recorded by `AppError`. Production responses keep the generic text.
pub async fn error_detail_middleware(
    State(ExposeErrorDetail(expose)): State<ExposeErrorDetail>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if !expose {
        return response;
    }

    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Json(ErrorBody {
        success: false,
        message: detail,
        errors: None,
    })
    .into_response()
    .into_body();

    Response::from_parts(parts, body)
}
