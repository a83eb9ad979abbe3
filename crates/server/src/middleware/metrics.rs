//! Prometheus metrics collection middleware
//!
//! Records `http_requests_total` (counter) and `http_request_duration_seconds`
//! (histogram) for every request, with method/path/status labels.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Normalize request paths to avoid high-cardinality labels.
/// Summary ids are UUIDs and admission ids are integers; both collapse to
/// `:id` so per-resource requests share one label.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if uuid::Uuid::try_parse(seg).is_ok() || seg.parse::<i64>().is_ok() {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware that records request count and duration metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();

    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

#[cfg(test)]
mod tests {
    use super::normalize_path;

    #[test]
    fn numeric_and_uuid_segments_collapse() {
        assert_eq!(normalize_path("/patients/170490"), "/patients/:id");
        assert_eq!(
            normalize_path("/ai/summaries/6c2d2c9f-9f5e-4e1e-8b87-2f8f3f1c2a4d"),
            "/ai/summaries/:id"
        );
        assert_eq!(
            normalize_path("/ai/summaries/patient/170490"),
            "/ai/summaries/patient/:id"
        );
        assert_eq!(normalize_path("/health"), "/health");
    }
}
