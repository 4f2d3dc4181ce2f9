//! Runtime - owns the registry and both containers and drives boot:
//! declarations → providers → middlewares → controllers → host layers.
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;

use crate::container::ProviderContainer;
use crate::dispatch::{self, apply_host_layers, BootOptions, RouteTable};
use crate::error::ConfigError;
use crate::fallback::FallbackContainer;
use crate::instance::Instance;
use crate::jobs::JobDefinition;
use crate::registry::MetadataRegistry;
use crate::resolver::ModuleGraph;
use crate::token::{ModuleName, Token};

/// A booted application: the router to serve, its frozen route table and the flattened jobs.
pub struct App {
    pub router: Router,
    pub routes: RouteTable,
    pub jobs: Vec<JobDefinition>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.routes.len())
            .field("jobs", &self.jobs.iter().map(|j| j.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct Runtime {
    registry: MetadataRegistry,
    container: ProviderContainer,
    fallback: FallbackContainer,
    booted: AtomicBool,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Declarations go here, before [`Runtime::boot`].
    pub fn registry_mut(&mut self) -> &mut MetadataRegistry {
        &mut self.registry
    }

    pub fn container(&self) -> &ProviderContainer {
        &self.container
    }

    /// Declared provider if there is one, otherwise a lazily built fallback singleton.
    pub fn instance(&self, token: Token) -> Result<Instance, ConfigError> {
        match self.container.get(token) {
            Some(inst) => Ok(inst),
            None => self.fallback.get(token, &self.registry),
        }
    }

    /// Resolve `root`, build every provider and mount the serving pipeline. Runs once.
    pub fn boot(&self, root: ModuleName, opts: &BootOptions) -> Result<App, ConfigError> {
        if self.booted.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::AlreadyBooted);
        }

        tracing::info!("Phase: declarations");
        if !self.registry.errors().is_empty() {
            return Err(ConfigError::InvalidDeclarations {
                errors: self.registry.errors().to_vec(),
            });
        }
        for orphan in self.registry.orphan_bindings() {
            tracing::warn!("{orphan}");
        }

        let graph = ModuleGraph::new(&self.registry);

        tracing::info!("Phase: providers");
        let providers = graph.resolve_providers(root)?;
        self.container.register_providers(&providers)?;
        tracing::debug!(root, count = providers.len(), "Providers registered");

        tracing::info!("Phase: middlewares");
        let middlewares = graph
            .resolve_middlewares(root)?
            .into_iter()
            .map(|token| Ok((token, self.instance(token)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let chain = dispatch::mount_middlewares(&self.registry, middlewares)?;

        tracing::info!("Phase: controllers");
        let controllers = graph
            .resolve_controllers(root)?
            .into_iter()
            .map(|token| Ok((token, self.instance(token)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let (router, routes) = dispatch::mount_controllers(&self.registry, controllers)?;

        tracing::info!("Phase: host layers");
        let middleware_count = chain.len();
        let router = apply_host_layers(chain.apply(router), opts);

        let jobs = graph.resolve_jobs(root)?;
        tracing::info!(
            root,
            routes = routes.len(),
            middlewares = middleware_count,
            jobs = jobs.len(),
            "Boot complete"
        );
        Ok(App {
            router,
            routes,
            jobs,
        })
    }
}
