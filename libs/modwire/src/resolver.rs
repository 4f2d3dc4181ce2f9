//! Flattening of a root module's import graph.
//!
//! Controllers, middlewares and jobs come out in pre-order (a module's own
//! declarations, then its imports). Providers come out in post-order so that a
//! factory always sees the providers of the modules it imports.
use std::collections::{HashMap, HashSet};

use crate::container::ProviderSpec;
use crate::error::ConfigError;
use crate::jobs::JobDefinition;
use crate::registry::{MetadataRegistry, ModuleDescriptor};
use crate::token::{ModuleName, Token};

#[derive(Clone, Copy, PartialEq)]
enum Color {
    Gray,  // on the current path
    Black, // finished
}

/// Visit order of every module reachable from a root, each module once.
#[derive(Debug, Default)]
struct Walk {
    pre: Vec<ModuleName>,
    post: Vec<ModuleName>,
}

pub struct ModuleGraph<'a> {
    registry: &'a MetadataRegistry,
}

impl<'a> ModuleGraph<'a> {
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve_controllers(&self, root: ModuleName) -> Result<Vec<Token>, ConfigError> {
        let walk = self.walk(root)?;
        Ok(dedup(self.descriptors(&walk.pre).flat_map(|m| m.controllers.iter().copied())))
    }

    pub fn resolve_middlewares(&self, root: ModuleName) -> Result<Vec<Token>, ConfigError> {
        let walk = self.walk(root)?;
        Ok(dedup(self.descriptors(&walk.pre).flat_map(|m| m.middlewares.iter().copied())))
    }

    /// Jobs, unique by name. The first definition seen wins.
    pub fn resolve_jobs(&self, root: ModuleName) -> Result<Vec<JobDefinition>, ConfigError> {
        let walk = self.walk(root)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for job in self.descriptors(&walk.pre).flat_map(|m| m.jobs.iter()) {
            if seen.insert(job.name()) {
                out.push(job.clone());
            } else {
                tracing::debug!(job = job.name(), "Skipping duplicate job definition");
            }
        }
        Ok(out)
    }

    /// Provider specs, imports before self, unique by token.
    pub fn resolve_providers(&self, root: ModuleName) -> Result<Vec<ProviderSpec>, ConfigError> {
        let walk = self.walk(root)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for spec in self.descriptors(&walk.post).flat_map(|m| m.providers.iter()) {
            if seen.insert(spec.token()) {
                out.push(spec.clone());
            } else {
                tracing::debug!(token = %spec.token(), "Skipping duplicate provider declaration");
            }
        }
        Ok(out)
    }

    fn descriptors<'w>(
        &self,
        order: &'w [ModuleName],
    ) -> impl Iterator<Item = &'a ModuleDescriptor> + 'w
    where
        'a: 'w,
    {
        let registry = self.registry;
        order.iter().filter_map(move |name| registry.module(name))
    }

    fn walk(&self, root: ModuleName) -> Result<Walk, ConfigError> {
        if self.registry.module(root).is_none() {
            return Err(ConfigError::UnknownModule(root));
        }
        let mut colors = HashMap::new();
        let mut path = Vec::new();
        let mut walk = Walk::default();
        self.visit(root, &mut colors, &mut path, &mut walk)?;
        Ok(walk)
    }

    fn visit(
        &self,
        name: ModuleName,
        colors: &mut HashMap<ModuleName, Color>,
        path: &mut Vec<ModuleName>,
        walk: &mut Walk,
    ) -> Result<(), ConfigError> {
        let Some(module) = self.registry.module(name) else {
            tracing::warn!(module = name, "Imported module is not attached; skipping");
            colors.insert(name, Color::Black);
            return Ok(());
        };

        colors.insert(name, Color::Gray);
        path.push(name);
        walk.pre.push(name);

        for &import in &module.imports {
            match colors.get(import) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|&n| n == import).unwrap_or(0);
                    let mut cycle: Vec<ModuleName> = path[start..].to_vec();
                    cycle.push(import);
                    return Err(ConfigError::CycleDetected { path: cycle });
                }
                Some(Color::Black) => {}
                None => self.visit(import, colors, path, walk)?,
            }
        }

        path.pop();
        colors.insert(name, Color::Black);
        walk.post.push(name);
        Ok(())
    }
}

fn dedup(items: impl Iterator<Item = Token>) -> Vec<Token> {
    let mut seen = HashSet::new();
    items.filter(|t| seen.insert(*t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;

    const X: Token = Token::new("x");
    const Y: Token = Token::new("y");

    fn unit() -> Instance {
        Instance::new(())
    }

    #[test]
    fn diamond_import_yields_each_controller_once() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module("a", ModuleDescriptor::new().import("b").import("c"));
        reg.attach_module("b", ModuleDescriptor::new().import("d"));
        reg.attach_module("c", ModuleDescriptor::new().import("d"));
        reg.attach_module("d", ModuleDescriptor::new().controller(X));

        let graph = ModuleGraph::new(&reg);
        assert_eq!(graph.resolve_controllers("a").unwrap(), vec![X]);
    }

    #[test]
    fn own_declarations_come_before_imports() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module("a", ModuleDescriptor::new().import("b").middleware(X));
        reg.attach_module("b", ModuleDescriptor::new().middleware(Y));

        let graph = ModuleGraph::new(&reg);
        assert_eq!(graph.resolve_middlewares("a").unwrap(), vec![X, Y]);
    }

    #[test]
    fn providers_are_flattened_imports_first() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module(
            "m1",
            ModuleDescriptor::new()
                .import("m2")
                .provider(ProviderSpec::class(X, unit)),
        );
        reg.attach_module("m2", ModuleDescriptor::new().provider(ProviderSpec::class(Y, unit)));

        let graph = ModuleGraph::new(&reg);
        let tokens: Vec<_> = graph
            .resolve_providers("m1")
            .unwrap()
            .iter()
            .map(|p| p.token())
            .collect();
        assert_eq!(tokens, vec![Y, X]);
    }

    #[test]
    fn duplicate_provider_tokens_keep_the_first() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module(
            "a",
            ModuleDescriptor::new()
                .import("b")
                .provider(ProviderSpec::class(X, unit)),
        );
        reg.attach_module("b", ModuleDescriptor::new().provider(ProviderSpec::class(X, unit)));

        let graph = ModuleGraph::new(&reg);
        assert_eq!(graph.resolve_providers("a").unwrap().len(), 1);
    }

    #[test]
    fn import_cycle_is_reported_with_its_path() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module("a", ModuleDescriptor::new().import("b"));
        reg.attach_module("b", ModuleDescriptor::new().import("a"));

        let err = ModuleGraph::new(&reg).resolve_controllers("a").unwrap_err();
        match err {
            ConfigError::CycleDetected { path } => assert_eq!(path, vec!["a", "b", "a"]),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn self_import_is_a_cycle() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module("a", ModuleDescriptor::new().import("a"));
        let err = ModuleGraph::new(&reg).resolve_providers("a").unwrap_err();
        assert!(err.to_string().contains("a -> a"));
    }

    #[test]
    fn unknown_root_fails_and_unknown_import_is_skipped() {
        let mut reg = MetadataRegistry::new();
        reg.attach_module("a", ModuleDescriptor::new().import("ghost").controller(X));

        let graph = ModuleGraph::new(&reg);
        assert!(matches!(
            graph.resolve_controllers("nope"),
            Err(ConfigError::UnknownModule("nope"))
        ));
        assert_eq!(graph.resolve_controllers("a").unwrap(), vec![X]);
    }
}
