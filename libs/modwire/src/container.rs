use std::fmt;
use std::sync::Arc;

use anyhow::Context as _;
use dashmap::DashMap;

use crate::error::ConfigError;
use crate::instance::{Constructor, Instance};
use crate::token::Token;

pub type FactoryFn = Arc<dyn Fn(&Deps) -> anyhow::Result<Instance> + Send + Sync>;

/// How a provider is built.
#[derive(Clone)]
pub enum ProviderSpec {
    /// Built with no arguments.
    Class { token: Token, construct: Constructor },
    /// Built from already registered providers, in `inject` order.
    Factory {
        token: Token,
        inject: Vec<Token>,
        factory: FactoryFn,
    },
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSpec::Class { token, .. } => f.debug_struct("Class").field("token", token).finish(),
            ProviderSpec::Factory { token, inject, .. } => f
                .debug_struct("Factory")
                .field("token", token)
                .field("inject", inject)
                .finish(),
        }
    }
}

impl ProviderSpec {
    pub fn class(token: Token, construct: Constructor) -> Self {
        ProviderSpec::Class { token, construct }
    }

    pub fn factory<F>(token: Token, inject: &[Token], factory: F) -> Self
    where
        F: Fn(&Deps) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        ProviderSpec::Factory {
            token,
            inject: inject.to_vec(),
            factory: Arc::new(factory),
        }
    }

    /// Register a value that already exists.
    pub fn instance(token: Token, instance: Instance) -> Self {
        Self::factory(token, &[], move |_| Ok(instance.clone()))
    }

    pub fn token(&self) -> Token {
        match self {
            ProviderSpec::Class { token, .. } | ProviderSpec::Factory { token, .. } => *token,
        }
    }

    pub fn dependencies(&self) -> &[Token] {
        match self {
            ProviderSpec::Class { .. } => &[],
            ProviderSpec::Factory { inject, .. } => inject,
        }
    }
}

/// Resolved dependencies handed to a factory, positionally matching `inject`.
pub struct Deps {
    requester: Token,
    entries: Vec<(Token, Instance)>,
}

impl Deps {
    pub fn requester(&self) -> Token {
        self.requester
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn instance(&self, idx: usize) -> Option<&Instance> {
        self.entries.get(idx).map(|(_, inst)| inst)
    }

    /// Typed access to the dependency at `idx`.
    pub fn get<T: Send + Sync + 'static>(&self, idx: usize) -> anyhow::Result<Arc<T>> {
        let (token, inst) = self.entries.get(idx).with_context(|| {
            format!(
                "factory '{}' asked for dependency #{idx}, only {} injected",
                self.requester,
                self.entries.len()
            )
        })?;
        inst.downcast::<T>().with_context(|| {
            format!(
                "dependency '{token}' of '{}' holds a {}, not a {}",
                self.requester,
                inst.type_name(),
                std::any::type_name::<T>()
            )
        })
    }
}

/// Token → singleton cache. Every token is instantiated at most once.
#[derive(Default)]
pub struct ProviderContainer {
    instances: DashMap<Token, Instance>,
}

impl fmt::Debug for ProviderContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens: Vec<_> = self.instances.iter().map(|e| *e.key()).collect();
        tokens.sort_unstable();
        f.debug_struct("ProviderContainer").field("tokens", &tokens).finish()
    }
}

impl ProviderContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register specs in order. Stops at the first failure.
    pub fn register_providers(&self, specs: &[ProviderSpec]) -> Result<(), ConfigError> {
        for spec in specs {
            self.register(spec)?;
        }
        Ok(())
    }

    /// Instantiate `spec` unless its token is already cached. Returns the cached singleton.
    pub fn register(&self, spec: &ProviderSpec) -> Result<Instance, ConfigError> {
        let token = spec.token();
        if let Some(existing) = self.get(token) {
            return Ok(existing);
        }

        let built = match spec {
            ProviderSpec::Class { construct, .. } => construct(),
            ProviderSpec::Factory {
                inject, factory, ..
            } => {
                let mut entries = Vec::with_capacity(inject.len());
                for dep in inject {
                    let inst = self.get(*dep).ok_or(ConfigError::DependencyNotRegistered {
                        token: *dep,
                        requested_by: token,
                    })?;
                    entries.push((*dep, inst));
                }
                let deps = Deps {
                    requester: token,
                    entries,
                };
                factory(&deps).map_err(|source| ConfigError::ProviderFactory { token, source })?
            }
        };

        let inst = self.instances.entry(token).or_insert(built).clone();
        tracing::debug!(token = %token, type_name = inst.type_name(), "Provider registered");
        Ok(inst)
    }

    pub fn get(&self, token: Token) -> Option<Instance> {
        self.instances.get(&token).map(|e| e.value().clone())
    }

    pub fn get_as<T: Send + Sync + 'static>(&self, token: Token) -> Option<Arc<T>> {
        self.get(token).and_then(|inst| inst.downcast::<T>())
    }

    pub fn require(&self, token: Token) -> Result<Instance, ConfigError> {
        self.get(token).ok_or(ConfigError::NotRegistered(token))
    }

    pub fn require_as<T: Send + Sync + 'static>(&self, token: Token) -> Result<Arc<T>, ConfigError> {
        let inst = self.require(token)?;
        inst.downcast::<T>().ok_or(ConfigError::TypeMismatch {
            token,
            expected: std::any::type_name::<T>(),
            actual: inst.type_name(),
        })
    }

    pub fn contains(&self, token: Token) -> bool {
        self.instances.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SETTINGS: Token = Token::new("settings");
    const GREETER: Token = Token::new("greeter");

    struct Settings {
        name: String,
    }

    struct Greeter {
        line: String,
    }

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    fn settings() -> Instance {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Instance::new(Settings {
            name: "modwire".into(),
        })
    }

    fn greeter_spec() -> ProviderSpec {
        ProviderSpec::factory(GREETER, &[SETTINGS], |deps| {
            let settings = deps.get::<Settings>(0)?;
            Ok(Instance::new(Greeter {
                line: format!("hello from {}", settings.name),
            }))
        })
    }

    #[test]
    fn factory_sees_previously_registered_dependency() {
        let c = ProviderContainer::new();
        c.register_providers(&[ProviderSpec::class(SETTINGS, settings), greeter_spec()])
            .unwrap();

        let greeter = c.require_as::<Greeter>(GREETER).unwrap();
        assert_eq!(greeter.line, "hello from modwire");
    }

    #[test]
    fn missing_dependency_names_the_token_and_requester() {
        let c = ProviderContainer::new();
        let err = c.register_providers(&[greeter_spec()]).unwrap_err();
        match err {
            ConfigError::DependencyNotRegistered {
                token,
                requested_by,
            } => {
                assert_eq!(token, SETTINGS);
                assert_eq!(requested_by, GREETER);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!c.contains(GREETER));
    }

    #[test]
    fn singletons_are_built_once() {
        let c = ProviderContainer::new();
        let before = BUILT.load(Ordering::SeqCst);
        let spec = ProviderSpec::class(SETTINGS, settings);
        let a = c.register(&spec).unwrap();
        let b = c.register(&spec).unwrap();
        assert!(a.same_as(&b));
        assert_eq!(BUILT.load(Ordering::SeqCst) - before, 1);
    }

    #[test]
    fn first_registration_wins() {
        let c = ProviderContainer::new();
        c.register(&ProviderSpec::instance(SETTINGS, Instance::new(Settings { name: "first".into() })))
            .unwrap();
        c.register(&ProviderSpec::instance(SETTINGS, Instance::new(Settings { name: "second".into() })))
            .unwrap();
        assert_eq!(c.get_as::<Settings>(SETTINGS).unwrap().name, "first");
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn failing_factory_is_a_config_error() {
        let c = ProviderContainer::new();
        let spec = ProviderSpec::factory(GREETER, &[], |_| anyhow::bail!("no greeting today"));
        let err = c.register(&spec).unwrap_err();
        assert!(matches!(err, ConfigError::ProviderFactory { token, .. } if token == GREETER));
    }

    #[test]
    fn typed_lookups_report_absence_and_mismatch() {
        let c = ProviderContainer::new();
        assert!(c.get(SETTINGS).is_none());
        assert!(matches!(c.require(SETTINGS), Err(ConfigError::NotRegistered(_))));

        c.register(&ProviderSpec::class(SETTINGS, settings)).unwrap();
        assert!(c.get_as::<Greeter>(SETTINGS).is_none());
        assert!(matches!(
            c.require_as::<Greeter>(SETTINGS),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }
}
