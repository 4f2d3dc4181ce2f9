use thiserror::Error;

use crate::registry::HttpMethod;
use crate::token::{ModuleName, Token};

/// Boot-time configuration errors. All of them abort boot; nothing is served.
#[derive(Debug, Error)]
pub enum ConfigError {
    // Module graph
    #[error("unknown module '{0}'")]
    UnknownModule(ModuleName),
    #[error("cyclic module import detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<ModuleName> },

    // Providers
    #[error("dependency '{token}' is not registered (requested by '{requested_by}')")]
    DependencyNotRegistered { token: Token, requested_by: Token },
    #[error("factory for provider '{token}' failed")]
    ProviderFactory {
        token: Token,
        #[source]
        source: anyhow::Error,
    },
    #[error("provider '{0}' is not registered")]
    NotRegistered(Token),
    #[error("provider '{token}' holds a {actual}, not a {expected}")]
    TypeMismatch {
        token: Token,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("'{0}' has no provider and no zero-argument constructor")]
    NoConstructor(Token),

    // Dispatcher
    #[error("'{token}' ({type_name}) is listed as a controller but does not serve routes")]
    NotAController {
        token: Token,
        type_name: &'static str,
    },
    #[error("'{token}' ({type_name}) is listed as a middleware but does not handle requests")]
    NotAMiddleware {
        token: Token,
        type_name: &'static str,
    },
    #[error("controller '{0}' is listed by a module but has no controller descriptor")]
    ControllerNotDeclared(Token),
    #[error("mounted path '{path}' of controller '{controller}' is not a valid route path")]
    InvalidRoutePath { controller: Token, path: String },
    #[error("binding #{index} of '{controller}::{handler}' exceeds the maximum index {max}")]
    BindingIndexOutOfRange {
        controller: Token,
        handler: String,
        index: usize,
        max: usize,
    },
    #[error("route {method} {path} is declared by both '{first}' and '{second}'")]
    DuplicateRoute {
        method: HttpMethod,
        path: String,
        first: Token,
        second: Token,
    },
    #[error("route path '{path}' conflicts with '{existing}' (same shape, different parameter names)")]
    ConflictingRoutePath { path: String, existing: String },

    // Lifecycle
    #[error("runtime has already been booted")]
    AlreadyBooted,
    #[error("invalid declarations:\n{errors:#?}")]
    InvalidDeclarations { errors: Vec<String> },
}
