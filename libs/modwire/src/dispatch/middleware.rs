use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::IntoResponse;
use axum::Router;

use crate::contracts::Middleware;
use crate::registry::MiddlewareScope;
use crate::token::Token;

#[derive(Clone)]
pub(crate) struct MountedMiddleware {
    pub(crate) token: Token,
    pub(crate) scope: MiddlewareScope,
    pub(crate) middleware: Arc<dyn Middleware>,
}

/// Middlewares in resolution order. The first one runs first.
#[derive(Clone, Default)]
pub(crate) struct MiddlewareChain {
    stages: Vec<MountedMiddleware>,
}

impl MiddlewareChain {
    pub(crate) fn push(&mut self, stage: MountedMiddleware) {
        self.stages.push(stage);
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    /// Wrap every route already on `router`. The last layer added is the outermost,
    /// so stages are layered back to front.
    pub(crate) fn apply(self, mut router: Router) -> Router {
        for stage in self.stages.into_iter().rev() {
            router = router.layer(from_fn(move |req: Request, next: Next| {
                let stage = stage.clone();
                async move {
                    if !stage.scope.matches(req.uri().path()) {
                        return next.run(req).await;
                    }
                    match stage.middleware.handle(req, next).await {
                        Ok(resp) => resp,
                        Err(err) => {
                            tracing::debug!(middleware = %stage.token, error = %err, "Middleware rejected request");
                            err.into_response()
                        }
                    }
                }
            }));
        }
        router
    }
}
