use dashmap::DashMap;

use crate::error::ConfigError;
use crate::instance::Instance;
use crate::registry::MetadataRegistry;
use crate::token::Token;

/// Lazily built singletons for controllers and middlewares nobody declared as a provider.
///
/// Only zero-argument constructors attached in the registry are used; anything
/// that needs injected dependencies has to be declared as a provider instead.
#[derive(Debug, Default)]
pub struct FallbackContainer {
    instances: DashMap<Token, Instance>,
}

impl FallbackContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: Token, registry: &MetadataRegistry) -> Result<Instance, ConfigError> {
        if let Some(existing) = self.instances.get(&token) {
            return Ok(existing.value().clone());
        }
        let construct = registry
            .constructor(token)
            .ok_or(ConfigError::NoConstructor(token))?;
        let inst = self
            .instances
            .entry(token)
            .or_insert_with(|| {
                tracing::debug!(token = %token, "Constructing fallback singleton");
                construct()
            })
            .clone();
        Ok(inst)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.instances.contains_key(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIT: Token = Token::new("audit");

    struct Audit;

    #[test]
    fn constructs_once_and_caches() {
        let mut reg = MetadataRegistry::new();
        reg.attach_constructor(AUDIT, || Instance::new(Audit));
        let fallback = FallbackContainer::new();

        let a = fallback.get(AUDIT, &reg).unwrap();
        let b = fallback.get(AUDIT, &reg).unwrap();
        assert!(a.same_as(&b));
        assert!(fallback.contains(AUDIT));
    }

    #[test]
    fn missing_constructor_is_reported() {
        let reg = MetadataRegistry::new();
        let err = FallbackContainer::new().get(AUDIT, &reg).unwrap_err();
        assert!(matches!(err, ConfigError::NoConstructor(t) if t == AUDIT));
    }
}
