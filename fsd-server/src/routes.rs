use std::time::Duration;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header, request::Parts},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{disk, health, metadata, proc};
use crate::infra::AppState;

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

/// Full application router with middleware attached.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/metadata", get(metadata::list_metadata))
        .route("/metadata/latest", get(metadata::latest_metadata))
        .route("/disk", get(disk::list_disk_stats))
        .route("/disk/latest", get(disk::latest_disk_stats))
        .route("/proc", get(proc::list_procs).post(proc::submit_proc))
        .route("/proc/available", get(proc::available_procs))
        .route("/proc/results", get(proc::list_proc_results))
        .route("/proc/results/{id}", get(proc::proc_results_for))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(state)
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(is_http_origin))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-auth-token"),
        ])
        .expose_headers([header::LINK])
        .max_age(CORS_MAX_AGE)
}

fn is_http_origin(origin: &HeaderValue, _parts: &Parts) -> bool {
    let origin = origin.as_bytes();
    origin.starts_with(b"http://") || origin.starts_with(b"https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts() -> Parts {
        Request::new(()).into_parts().0
    }

    #[test]
    fn only_http_origins_are_allowed() {
        let p = parts();
        assert!(is_http_origin(&HeaderValue::from_static("http://localhost:3000"), &p));
        assert!(is_http_origin(&HeaderValue::from_static("https://example.org"), &p));
        assert!(!is_http_origin(&HeaderValue::from_static("file://"), &p));
        assert!(!is_http_origin(&HeaderValue::from_static("null"), &p));
    }
}
