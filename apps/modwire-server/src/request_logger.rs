use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use modwire::axum::extract::Request;
use modwire::axum::middleware::Next;
use modwire::axum::response::Response;
use modwire::{HttpError, Middleware};

use crate::services::LoggerService;

/// Logs method, path, status and latency of every request it sees.
pub struct RequestLogger {
    logger: Arc<LoggerService>,
}

impl RequestLogger {
    pub fn new(logger: Arc<LoggerService>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, req: Request, next: Next) -> Result<Response, HttpError> {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let started = Instant::now();

        let resp = next.run(req).await;

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.logger
            .request(&method, &path, resp.status().as_u16(), latency_ms);
        Ok(resp)
    }
}
