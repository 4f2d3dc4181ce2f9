use std::any::Any;
use std::time::Duration;

use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::error::HttpError;

/// Settings for the layers wrapped around the mounted routes.
#[derive(Clone, Debug)]
pub struct BootOptions {
    pub body_limit_bytes: usize,
    pub request_timeout: Duration,
    pub cors_enabled: bool,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            body_limit_bytes: 2 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            cors_enabled: false,
        }
    }
}

/// Outermost first: panic catcher, trace span, error envelope, timeout, body limit, CORS.
pub(crate) fn apply_host_layers(mut router: Router, opts: &BootOptions) -> Router {
    if opts.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }
    router = router.layer(RequestBodyLimitLayer::new(opts.body_limit_bytes));
    router = router.layer(TimeoutLayer::new(opts.request_timeout));
    router = router.layer(map_response(envelope_layer_rejections));
    router = router.layer(
        TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<axum::body::Body>| {
            tracing::info_span!(
                "http_request",
                method = %req.method(),
                uri = %req.uri().path(),
                version = ?req.version(),
            )
        }),
    );
    router.layer(CatchPanicLayer::custom(panic_response))
}

/// The limit and timeout layers answer with bare bodies; give them the error envelope.
async fn envelope_layer_rejections(resp: Response) -> Response {
    let message = match resp.status() {
        StatusCode::PAYLOAD_TOO_LARGE => "request body too large",
        StatusCode::REQUEST_TIMEOUT => "request timed out",
        _ => return resp,
    };
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        return resp;
    }
    HttpError::new(resp.status(), message).into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    HttpError::internal_error("Internal Server Error").into_response()
}
