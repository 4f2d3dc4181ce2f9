//! Declarative sugar over the primitive registry writes.
//!
//! ```ignore
//! registry
//!     .declare_controller(USERS, "/users")
//!     .constructor(UsersController::instance)
//!     .get("/:id", "find_one")
//!     .bind("find_one", ParamBinding::param(0).key("id"));
//! ```
use crate::instance::Constructor;
use crate::registry::{
    HttpMethod, MetadataRegistry, MiddlewareScope, ParamBinding, RouteDescriptor,
};
use crate::token::Token;

pub struct ControllerDecl<'a> {
    registry: &'a mut MetadataRegistry,
    token: Token,
}

impl ControllerDecl<'_> {
    pub fn constructor(self, construct: Constructor) -> Self {
        self.registry.attach_constructor(self.token, construct);
        self
    }

    pub fn route(self, method: HttpMethod, path: &str, handler: &str) -> Self {
        self.registry.append_route(
            self.token,
            RouteDescriptor {
                method,
                path: path.to_string(),
                handler: handler.to_string(),
            },
        );
        self
    }

    pub fn get(self, path: &str, handler: &str) -> Self {
        self.route(HttpMethod::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: &str) -> Self {
        self.route(HttpMethod::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: &str) -> Self {
        self.route(HttpMethod::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: &str) -> Self {
        self.route(HttpMethod::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: &str) -> Self {
        self.route(HttpMethod::Patch, path, handler)
    }

    pub fn bind(self, handler: &str, binding: ParamBinding) -> Self {
        self.registry
            .append_param_binding(self.token, handler, binding);
        self
    }
}

pub struct MiddlewareDecl<'a> {
    registry: &'a mut MetadataRegistry,
    token: Token,
    scope: MiddlewareScope,
    construct: Option<Constructor>,
}

impl MiddlewareDecl<'_> {
    /// `*` or an empty string keeps the middleware global.
    pub fn scope(mut self, path: &str) -> Self {
        self.scope = MiddlewareScope::parse(path);
        self
    }

    pub fn constructor(mut self, construct: Constructor) -> Self {
        self.construct = Some(construct);
        self
    }
}

impl Drop for MiddlewareDecl<'_> {
    fn drop(&mut self) {
        let scope = std::mem::take(&mut self.scope);
        self.registry.attach_middleware(self.token, scope);
        if let Some(construct) = self.construct.take() {
            self.registry.attach_constructor(self.token, construct);
        }
    }
}

impl MetadataRegistry {
    /// Attach a controller prefix and return a builder for its routes.
    pub fn declare_controller(&mut self, token: Token, prefix: &str) -> ControllerDecl<'_> {
        self.attach_controller(token, prefix);
        ControllerDecl {
            registry: self,
            token,
        }
    }

    /// Declare a middleware. The scope is recorded when the builder is dropped.
    pub fn declare_middleware(&mut self, token: Token) -> MiddlewareDecl<'_> {
        MiddlewareDecl {
            registry: self,
            token,
            scope: MiddlewareScope::Global,
            construct: None,
        }
    }
}
