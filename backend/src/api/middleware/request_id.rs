//! Per-request id and tracing span.
//!
//! Honors an inbound `X-Request-ID`, otherwise takes the trace id from a W3C
//! `traceparent` header, otherwise generates a UUID. The id is echoed on the
//! response.

use axum::{extract::Request, http::header::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const TRACEPARENT_HEADER: &str = "traceparent";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn inbound_request_id(request: &Request) -> Option<RequestId> {
    let headers = request.headers();
    if let Some(id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty())
    {
        return Some(RequestId(id.to_string()));
    }

    // version-traceid-parentid-flags
    headers
        .get(TRACEPARENT_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|tp| tp.split('-').nth(1))
        .filter(|trace_id| !trace_id.is_empty())
        .map(|trace_id| RequestId(trace_id.to_string()))
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id =
        inbound_request_id(&request).unwrap_or_else(|| RequestId(Uuid::new_v4().to_string()));

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(request_id.clone());

    async move {
        let mut response = next.run(request).await;
        if let Ok(value) = HeaderValue::from_str(&request_id.0) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        tracing::info!(status = response.status().as_u16(), "Request completed");
        response
    }
    .instrument(span)
    .await
}
