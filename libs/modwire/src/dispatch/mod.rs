//! Request Dispatcher: turns resolved controllers and middlewares into a live router.
//!
//! Everything that can fail does so at mount time with a [`ConfigError`]; once a
//! router is returned, the route table is frozen.
use std::collections::BTreeMap;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodRouter};
use axum::Router;
use http::StatusCode;

use crate::error::ConfigError;
use crate::instance::Instance;
use crate::registry::MetadataRegistry;
use crate::token::Token;

mod adapter;
mod args;
mod context;
mod error;
mod host;
mod middleware;
mod routes;

pub use adapter::MAX_BINDING_INDEX;
pub use args::{Args, Argument};
pub use context::{RequestContext, Section};
pub use error::{json, HttpError};
pub use host::BootOptions;
pub use routes::{MountedRoute, RouteTable};

pub(crate) use host::apply_host_layers;
pub(crate) use middleware::MiddlewareChain;

use adapter::RouteAdapter;
use middleware::MountedMiddleware;
use routes::{axum_path, mounted_path};

/// Look up each middleware's scope and handler capability, in resolution order.
pub(crate) fn mount_middlewares(
    registry: &MetadataRegistry,
    middlewares: Vec<(Token, Instance)>,
) -> Result<MiddlewareChain, ConfigError> {
    let mut chain = MiddlewareChain::default();
    for (token, instance) in middlewares {
        let middleware = instance.as_middleware().ok_or(ConfigError::NotAMiddleware {
            token,
            type_name: instance.type_name(),
        })?;
        let scope = registry
            .middleware(token)
            .map(|d| d.scope.clone())
            .unwrap_or_default();
        tracing::debug!(middleware = %token, scope = ?scope, "Mounted middleware");
        chain.push(MountedMiddleware {
            token,
            scope,
            middleware,
        });
    }
    Ok(chain)
}

/// Bind every declared route of every controller and build the router.
pub(crate) fn mount_controllers(
    registry: &MetadataRegistry,
    controllers: Vec<(Token, Instance)>,
) -> Result<(Router, RouteTable), ConfigError> {
    let mut table = RouteTable::default();
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for (token, instance) in controllers {
        let descriptor = registry
            .controller(token)
            .ok_or(ConfigError::ControllerNotDeclared(token))?;
        let controller = instance.as_controller().ok_or(ConfigError::NotAController {
            token,
            type_name: instance.type_name(),
        })?;

        for route in registry.routes(token) {
            let path = mounted_path(token, &descriptor.prefix, &route.path)?;
            table.insert(MountedRoute {
                method: route.method,
                path: path.clone(),
                controller: token,
                handler: route.handler.clone(),
            })?;

            let adapter = RouteAdapter::new(
                token,
                &route.handler,
                controller.clone(),
                registry.param_bindings(token, &route.handler),
            )?;
            let handler = move |req: Request| {
                let adapter = adapter.clone();
                async move { adapter.call(req).await }
            };
            let filter = route.method.filter();
            let method_router = match by_path.remove(&path) {
                Some(existing) => existing.on(filter, handler),
                None => on(filter, handler),
            };
            by_path.insert(path.clone(), method_router);

            tracing::debug!(
                method = %route.method,
                path = %path,
                controller = %token,
                handler = %route.handler,
                "Mounted route"
            );
        }
    }

    let mut router = Router::new();
    for (path, method_router) in by_path {
        router = router.route(&axum_path(&path), method_router);
    }
    // must follow the routes: it only reaches method routers registered before it
    let router = router
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found);
    Ok((router, table))
}

async fn not_found(req: Request) -> Response {
    HttpError::not_found(format!("Cannot {} {}", req.method(), req.uri().path())).into_response()
}

async fn method_not_allowed(req: Request) -> Response {
    HttpError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Cannot {} {}", req.method(), req.uri().path()),
    )
    .into_response()
}
