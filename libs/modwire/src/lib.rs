//! # modwire - modules, providers and routes wired at boot
//!
//! A module names its imports, providers, controllers, middlewares and jobs.
//! Booting a root module flattens that graph, builds every provider once and
//! mounts a live axum router.
//!
//! ## Lifecycle
//!
//! declare → resolve → instantiate → mount, once, before traffic.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modwire::{
//!     json, Args, BootOptions, Controller, HandlerResult, HttpError, Instance,
//!     ModuleDescriptor, ParamBinding, Runtime, Token,
//! };
//!
//! const USERS: Token = Token::new("users_controller");
//!
//! struct UsersController;
//!
//! #[async_trait::async_trait]
//! impl Controller for UsersController {
//!     async fn invoke(&self, handler: &str, args: Args) -> HandlerResult {
//!         match handler {
//!             "find_one" => json(serde_json::json!({ "id": args.str(0) })),
//!             other => Err(HttpError::unknown_handler(other)),
//!         }
//!     }
//! }
//!
//! let mut rt = Runtime::new();
//! let reg = rt.registry_mut();
//! reg.declare_controller(USERS, "/users")
//!     .constructor(|| Instance::controller(UsersController))
//!     .get("/:id", "find_one")
//!     .bind("find_one", ParamBinding::param(0).key("id"));
//! reg.attach_module("users", ModuleDescriptor::new().controller(USERS));
//!
//! let app = rt.boot("users", &BootOptions::default())?;
//! axum::serve(listener, app.router).await?;
//! ```

pub mod container;
pub mod contracts;
pub mod declare;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod instance;
pub mod jobs;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod token;

pub use container::{Deps, ProviderContainer, ProviderSpec};
pub use contracts::{Controller, HandlerResult, Middleware};
pub use declare::{ControllerDecl, MiddlewareDecl};
pub use dispatch::{
    json, Args, Argument, BootOptions, HttpError, MountedRoute, RequestContext, RouteTable, Section,
    MAX_BINDING_INDEX,
};
pub use error::ConfigError;
pub use fallback::FallbackContainer;
pub use instance::{Constructor, Instance};
pub use jobs::{Job, JobDefinition, JobHandle, JobQueue, JobReceiver, QueuedJob, Worker, JOB_QUEUE, QUEUE_MODULE};
pub use registry::{
    HttpMethod, MetadataRegistry, MiddlewareScope, ModuleDescriptor, ParamBinding, ParamKind,
    RouteDescriptor,
};
pub use resolver::ModuleGraph;
pub use runtime::{App, Runtime};
pub use token::{ModuleName, Token};

// Re-exported so controllers and middlewares don't need direct deps.
pub use async_trait::async_trait;
pub use axum;
