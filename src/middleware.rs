use crate::admission::{AdmissionController, Decision};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Admission control in front of the wrapped routes.
///
/// Admitted requests continue to the next handler unchanged; rejected ones
/// get the configured quota exceeded response. Store failures surface as the
/// error response when the failure policy is closed.
pub async fn admission_middleware(
    State(controller): State<Arc<AdmissionController>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    match controller.check(&parts).await {
        Ok(Decision::Admit(reason)) => {
            debug!(target: "gatekeeper::middleware", ?reason, "Request admitted");
            next.run(Request::from_parts(parts, body)).await
        }
        Ok(Decision::Reject(_)) => controller.quota_exceeded().into_response(),
        Err(err) => err.into_response(),
    }
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();

    info!(
        target: "gatekeeper::middleware",
        %request_id,
        method = %method,
        uri = %uri,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "gatekeeper::middleware",
        %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}
