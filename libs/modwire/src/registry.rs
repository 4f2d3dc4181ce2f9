//! Declaration-time metadata: module descriptors, controller prefixes, routes,
//! parameter bindings, middleware scopes and zero-argument constructors.
//!
//! Writes are append-only and keyed by identity. A second attachment for the same
//! module/controller/middleware never replaces the first one; the conflict is
//! recorded and reported when the runtime boots.
use std::collections::{HashMap, HashSet};
use std::fmt;

use axum::routing::MethodFilter;

use crate::container::ProviderSpec;
use crate::instance::Constructor;
use crate::jobs::JobDefinition;
use crate::token::{ModuleName, Token};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    pub(crate) fn filter(&self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Delete => MethodFilter::DELETE,
            HttpMethod::Patch => MethodFilter::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a module declares. Immutable once attached.
#[derive(Clone, Default)]
pub struct ModuleDescriptor {
    pub imports: Vec<ModuleName>,
    pub providers: Vec<ProviderSpec>,
    pub controllers: Vec<Token>,
    pub middlewares: Vec<Token>,
    pub jobs: Vec<JobDefinition>,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("imports", &self.imports)
            .field(
                "providers",
                &self.providers.iter().map(|p| p.token()).collect::<Vec<_>>(),
            )
            .field("controllers", &self.controllers)
            .field("middlewares", &self.middlewares)
            .field(
                "jobs",
                &self.jobs.iter().map(|j| j.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ModuleDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Imports are unique by identity; repeating one is a no-op.
    pub fn import(mut self, module: ModuleName) -> Self {
        if !self.imports.contains(&module) {
            self.imports.push(module);
        }
        self
    }

    pub fn provider(mut self, spec: ProviderSpec) -> Self {
        self.providers.push(spec);
        self
    }

    pub fn controller(mut self, token: Token) -> Self {
        self.controllers.push(token);
        self
    }

    pub fn middleware(mut self, token: Token) -> Self {
        self.middlewares.push(token);
        self
    }

    pub fn job(mut self, job: JobDefinition) -> Self {
        self.jobs.push(job);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerDescriptor {
    pub prefix: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub handler: String,
}

/// Request section a parameter binding reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Body,
    Query,
    Param,
    Headers,
    Cookie,
    /// The whole request context instead of one section.
    Context,
}

/// Instruction for building one positional handler argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamBinding {
    pub kind: ParamKind,
    pub index: usize,
    pub key: Option<String>,
}

impl ParamBinding {
    pub fn new(kind: ParamKind, index: usize) -> Self {
        Self {
            kind,
            index,
            key: None,
        }
    }

    pub fn body(index: usize) -> Self {
        Self::new(ParamKind::Body, index)
    }

    pub fn query(index: usize) -> Self {
        Self::new(ParamKind::Query, index)
    }

    pub fn param(index: usize) -> Self {
        Self::new(ParamKind::Param, index)
    }

    pub fn headers(index: usize) -> Self {
        Self::new(ParamKind::Headers, index)
    }

    pub fn cookie(index: usize) -> Self {
        Self::new(ParamKind::Cookie, index)
    }

    pub fn context(index: usize) -> Self {
        Self::new(ParamKind::Context, index)
    }

    /// Project a single field out of the section instead of passing all of it.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Where a middleware applies. `*` (or an empty path) means everywhere.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MiddlewareScope {
    #[default]
    Global,
    Path(String),
}

impl MiddlewareScope {
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "*" {
            MiddlewareScope::Global
        } else {
            MiddlewareScope::Path(trimmed.to_string())
        }
    }

    /// Prefix match on segment boundaries: `/api` covers `/api` and `/api/x`, not `/apix`.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            MiddlewareScope::Global => true,
            MiddlewareScope::Path(prefix) => {
                let prefix = prefix.trim_end_matches('/');
                prefix.is_empty()
                    || path == prefix
                    || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MiddlewareDescriptor {
    pub scope: MiddlewareScope,
}

#[derive(Default)]
pub struct MetadataRegistry {
    modules: HashMap<ModuleName, ModuleDescriptor>,
    controllers: HashMap<Token, ControllerDescriptor>,
    routes: HashMap<Token, Vec<RouteDescriptor>>,
    bindings: HashMap<Token, HashMap<String, Vec<ParamBinding>>>,
    middlewares: HashMap<Token, MiddlewareDescriptor>,
    constructors: HashMap<Token, Constructor>,
    errors: Vec<String>,
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self.modules.keys().copied().collect();
        modules.sort_unstable();
        f.debug_struct("MetadataRegistry")
            .field("modules", &modules)
            .field("controllers_count", &self.controllers.len())
            .field("middlewares_count", &self.middlewares.len())
            .field("errors", &self.errors)
            .finish()
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_module(&mut self, name: ModuleName, descriptor: ModuleDescriptor) {
        if self.modules.contains_key(name) {
            self.errors
                .push(format!("Module '{name}' is already attached"));
            return;
        }
        self.modules.insert(name, descriptor);
    }

    pub fn attach_controller(&mut self, token: Token, prefix: impl Into<String>) {
        if self.controllers.contains_key(&token) {
            self.errors
                .push(format!("Controller '{token}' is already attached"));
            return;
        }
        self.controllers.insert(
            token,
            ControllerDescriptor {
                prefix: prefix.into(),
            },
        );
    }

    pub fn append_route(&mut self, controller: Token, route: RouteDescriptor) {
        self.routes.entry(controller).or_default().push(route);
    }

    pub fn append_param_binding(
        &mut self,
        controller: Token,
        handler: impl Into<String>,
        binding: ParamBinding,
    ) {
        self.bindings
            .entry(controller)
            .or_default()
            .entry(handler.into())
            .or_default()
            .push(binding);
    }

    pub fn attach_middleware(&mut self, token: Token, scope: MiddlewareScope) {
        if self.middlewares.contains_key(&token) {
            self.errors
                .push(format!("Middleware '{token}' is already attached"));
            return;
        }
        self.middlewares.insert(token, MiddlewareDescriptor { scope });
    }

    pub fn attach_constructor(&mut self, token: Token, construct: Constructor) {
        if self.constructors.contains_key(&token) {
            self.errors
                .push(format!("Constructor for '{token}' is already attached"));
            return;
        }
        self.constructors.insert(token, construct);
    }

    pub fn module(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    pub fn controller(&self, token: Token) -> Option<&ControllerDescriptor> {
        self.controllers.get(&token)
    }

    pub fn routes(&self, controller: Token) -> &[RouteDescriptor] {
        self.routes
            .get(&controller)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Bindings in declaration order; the dispatcher sorts them when it mounts the route.
    pub fn param_bindings(&self, controller: Token, handler: &str) -> &[ParamBinding] {
        self.bindings
            .get(&controller)
            .and_then(|by_handler| by_handler.get(handler))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn middleware(&self, token: Token) -> Option<&MiddlewareDescriptor> {
        self.middlewares.get(&token)
    }

    pub fn constructor(&self, token: Token) -> Option<Constructor> {
        self.constructors.get(&token).copied()
    }

    /// Conflicts recorded while declaring; boot refuses to proceed when non-empty.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Bindings declared for handlers that no route of the controller uses.
    pub(crate) fn orphan_bindings(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (controller, by_handler) in &self.bindings {
            let handlers: HashSet<&str> = self
                .routes(*controller)
                .iter()
                .map(|r| r.handler.as_str())
                .collect();
            for handler in by_handler.keys() {
                if !handlers.contains(handler.as_str()) {
                    out.push(format!(
                        "Parameter bindings declared for '{controller}::{handler}' but no route uses that handler"
                    ));
                }
            }
        }
        out.sort();
        out
    }
}
