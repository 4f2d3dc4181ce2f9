use async_trait::async_trait;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::dispatch::{Args, HttpError};

/// Outcome of a handler: `Ok(None)` means "nothing to serialize".
pub type HandlerResult = Result<Option<serde_json::Value>, HttpError>;

/// A group of routes served by one singleton.
///
/// Routes are declared in the registry against the controller's token; at request
/// time the dispatcher calls `invoke` with the declared handler name and the
/// arguments extracted from the request.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    async fn invoke(&self, handler: &str, args: Args) -> HandlerResult;
}

/// A request-pipeline stage that runs before controller dispatch.
///
/// Call `next.run(req)` to continue the chain, or return a response to stop it.
/// An `Err` goes through the same error envelope as handler failures.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next) -> Result<Response, HttpError>;
}
