/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Host-registered helpers.
//!
//! Helpers supplied by the embedding application are registered explicitly
//! through a [`HelperRegistrar`], each with a declared arity: 2 parameters
//! (arguments, context) make a regular helper that returns a value, 3
//! (arguments, context, body) make a block helper that returns rendered
//! content. Anything else is rejected at registration time.
//!
//! Registration order is framework providers, then plugins in reverse
//! dependency order, then site providers. A later registration of the same
//! `(name, kind)` replaces the earlier one, so site helpers always win.
//! Registered helpers take precedence over built-ins of the same kind.
//!
//! Once built, the registry is shared read-only behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::args::HelperArgs;
use crate::context::TemplateContext;
use crate::error::HelperResult;
use crate::value::{TemplateValue, ValueMap};

/// Content of a block helper invocation.
///
/// `render` expands the main body and `inverse` the `{{else}}` branch, each
/// in a child scope holding `locals`.
pub trait BlockBody {
    fn render(&mut self, locals: ValueMap) -> HelperResult<String>;
    fn inverse(&mut self, locals: ValueMap) -> HelperResult<String>;
    fn has_inverse(&self) -> bool;
}

pub type RegularFn =
    Arc<dyn Fn(&HelperArgs, &TemplateContext) -> HelperResult<TemplateValue> + Send + Sync>;

pub type BlockFn = Arc<
    dyn Fn(&HelperArgs, &TemplateContext, &mut dyn BlockBody) -> HelperResult<String>
        + Send
        + Sync,
>;

/// A helper implementation. The variant fixes the handler's arity.
#[derive(Clone)]
pub enum HelperHandler {
    /// `(args, context) -> value`
    Regular(RegularFn),
    /// `(args, context, body) -> content`
    Block(BlockFn),
}

impl HelperHandler {
    pub fn regular<F>(f: F) -> Self
    where
        F: Fn(&HelperArgs, &TemplateContext) -> HelperResult<TemplateValue> + Send + Sync + 'static,
    {
        HelperHandler::Regular(Arc::new(f))
    }

    pub fn block<F>(f: F) -> Self
    where
        F: Fn(&HelperArgs, &TemplateContext, &mut dyn BlockBody) -> HelperResult<String>
            + Send
            + Sync
            + 'static,
    {
        HelperHandler::Block(Arc::new(f))
    }

    /// Number of parameters the handler takes.
    pub fn arity(&self) -> usize {
        match self {
            HelperHandler::Regular(_) => 2,
            HelperHandler::Block(_) => 3,
        }
    }

    pub fn kind(&self) -> HelperKind {
        match self {
            HelperHandler::Regular(_) => HelperKind::Regular,
            HelperHandler::Block(_) => HelperKind::Block,
        }
    }
}

/// Whether a helper produces a value or rendered block content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperKind {
    Regular,
    Block,
}

impl HelperKind {
    /// Derive the kind from a handler arity.
    pub fn from_arity(arity: usize) -> Option<Self> {
        match arity {
            2 => Some(HelperKind::Regular),
            3 => Some(HelperKind::Block),
            _ => None,
        }
    }
}

impl fmt::Display for HelperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperKind::Regular => write!(f, "regular"),
            HelperKind::Block => write!(f, "block"),
        }
    }
}

/// Who registered a helper.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HelperSource {
    #[default]
    Framework,
    Site,
    Plugin(String),
}

impl fmt::Display for HelperSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperSource::Framework => write!(f, "framework"),
            HelperSource::Site => write!(f, "site"),
            HelperSource::Plugin(id) => write!(f, "plugin:{id}"),
        }
    }
}

/// Documentation attached to a registration.
#[derive(Debug, Clone, Default)]
pub struct HelperMeta {
    pub description: String,
    pub example: String,
}

impl HelperMeta {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            example: String::new(),
        }
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }
}

/// A registered helper.
#[derive(Clone)]
pub struct HelperDescriptor {
    pub name: String,
    pub kind: HelperKind,
    pub source: HelperSource,
    pub description: String,
    pub example: String,
    pub handler: HelperHandler,
}

impl fmt::Debug for HelperDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Serializable listing entry for a helper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HelperSummary {
    pub name: String,
    pub kind: HelperKind,
    pub source: String,
    pub description: String,
    pub example: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("helper name must not be empty")]
    EmptyName,

    #[error("helper '{name}' has arity {arity}; expected 2 (regular) or 3 (block)")]
    InvalidArity { name: String, arity: usize },

    #[error("helper '{name}' declared with arity {declared} but its handler takes {actual}")]
    ArityMismatch {
        name: String,
        declared: usize,
        actual: usize,
    },
}

/// Provider of helpers: a plugin, or the framework/site helper sets.
pub trait HelperPlugin {
    /// Identifier used in [`HelperSource::Plugin`].
    fn id(&self) -> &str;

    fn register_helpers(&self, registrar: &mut HelperRegistrar<'_>) -> Result<(), RegistryError>;
}

/// The process-wide table of host-registered helpers.
#[derive(Debug, Clone, Default)]
pub struct HelperRegistry {
    helpers: IndexMap<(HelperKind, String), HelperDescriptor>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from helper providers in precedence order.
    ///
    /// `plugins` is given in load order (dependencies first) and registered
    /// in reverse. Site providers are registered last and override both.
    pub fn load(
        framework: &[&dyn HelperPlugin],
        plugins: &[&dyn HelperPlugin],
        site: &[&dyn HelperPlugin],
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for provider in framework {
            provider.register_helpers(&mut registry.registrar(HelperSource::Framework))?;
        }
        for plugin in plugins.iter().rev() {
            let source = HelperSource::Plugin(plugin.id().to_string());
            plugin.register_helpers(&mut registry.registrar(source))?;
        }
        for provider in site {
            provider.register_helpers(&mut registry.registrar(HelperSource::Site))?;
        }
        tracing::debug!(helpers = registry.len(), "helper registry loaded");
        Ok(registry)
    }

    /// A registrar that records `source` on everything it registers.
    pub fn registrar(&mut self, source: HelperSource) -> HelperRegistrar<'_> {
        HelperRegistrar {
            registry: self,
            source,
        }
    }

    /// Register a helper, validating its declared arity against the handler.
    pub fn register(
        &mut self,
        name: &str,
        declared_arity: usize,
        handler: HelperHandler,
        source: HelperSource,
        meta: HelperMeta,
    ) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let Some(kind) = HelperKind::from_arity(declared_arity) else {
            return Err(RegistryError::InvalidArity {
                name: name.to_string(),
                arity: declared_arity,
            });
        };
        if handler.arity() != declared_arity {
            return Err(RegistryError::ArityMismatch {
                name: name.to_string(),
                declared: declared_arity,
                actual: handler.arity(),
            });
        }

        let key = (kind, name.to_string());
        if let Some(previous) = self.helpers.get(&key) {
            tracing::debug!(
                helper = name,
                %kind,
                replaced = %previous.source,
                by = %source,
                "helper overridden"
            );
        }
        self.helpers.insert(
            key,
            HelperDescriptor {
                name: name.to_string(),
                kind,
                source,
                description: meta.description,
                example: meta.example,
                handler,
            },
        );
        Ok(())
    }

    pub fn regular(&self, name: &str) -> Option<&RegularFn> {
        match &self.helpers.get(&(HelperKind::Regular, name.to_string()))?.handler {
            HelperHandler::Regular(f) => Some(f),
            HelperHandler::Block(_) => None,
        }
    }

    pub fn block(&self, name: &str) -> Option<&BlockFn> {
        match &self.helpers.get(&(HelperKind::Block, name.to_string()))?.handler {
            HelperHandler::Block(f) => Some(f),
            HelperHandler::Regular(_) => None,
        }
    }

    pub fn get(&self, kind: HelperKind, name: &str) -> Option<&HelperDescriptor> {
        self.helpers.get(&(kind, name.to_string()))
    }

    /// Every registered helper, in registration order.
    pub fn descriptors(&self) -> Vec<HelperSummary> {
        self.helpers
            .values()
            .map(|d| HelperSummary {
                name: d.name.clone(),
                kind: d.kind,
                source: d.source.to_string(),
                description: d.description.clone(),
                example: d.example.clone(),
            })
            .collect()
    }

    /// Names of the fixed built-in catalog.
    pub fn builtin_names() -> &'static [&'static str] {
        &crate::helpers::BUILTIN_NAMES
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

/// Registration handle bound to one helper source.
pub struct HelperRegistrar<'a> {
    registry: &'a mut HelperRegistry,
    source: HelperSource,
}

impl HelperRegistrar<'_> {
    /// Register with an explicit arity contract.
    pub fn register(
        &mut self,
        name: &str,
        declared_arity: usize,
        handler: HelperHandler,
        meta: HelperMeta,
    ) -> Result<(), RegistryError> {
        self.registry
            .register(name, declared_arity, handler, self.source.clone(), meta)
    }

    pub fn regular<F>(&mut self, name: &str, meta: HelperMeta, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&HelperArgs, &TemplateContext) -> HelperResult<TemplateValue> + Send + Sync + 'static,
    {
        self.register(name, 2, HelperHandler::regular(f), meta)
    }

    pub fn block<F>(&mut self, name: &str, meta: HelperMeta, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&HelperArgs, &TemplateContext, &mut dyn BlockBody) -> HelperResult<String>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, 3, HelperHandler::block(f), meta)
    }

    pub fn source(&self) -> &HelperSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: &'static str) -> HelperHandler {
        HelperHandler::regular(move |_, _| Ok(value.into()))
    }

    struct Plugin {
        id: &'static str,
        value: &'static str,
    }

    impl HelperPlugin for Plugin {
        fn id(&self) -> &str {
            self.id
        }

        fn register_helpers(&self, r: &mut HelperRegistrar<'_>) -> Result<(), RegistryError> {
            r.register("greet", 2, constant(self.value), HelperMeta::default())
        }
    }

    fn call(registry: &HelperRegistry, name: &str) -> TemplateValue {
        let f = registry.regular(name).expect("helper registered");
        f(&HelperArgs::new(name), &TemplateContext::new()).unwrap()
    }

    #[test]
    fn test_arity_contract() {
        let mut registry = HelperRegistry::new();
        assert_eq!(
            registry.register("x", 4, constant("a"), HelperSource::Site, HelperMeta::default()),
            Err(RegistryError::InvalidArity {
                name: "x".into(),
                arity: 4
            })
        );
        assert_eq!(
            registry.register("x", 3, constant("a"), HelperSource::Site, HelperMeta::default()),
            Err(RegistryError::ArityMismatch {
                name: "x".into(),
                declared: 3,
                actual: 2
            })
        );
        assert_eq!(
            registry.register(" ", 2, constant("a"), HelperSource::Site, HelperMeta::default()),
            Err(RegistryError::EmptyName)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_site_overrides_plugins_and_framework() {
        let framework = Plugin { id: "core", value: "framework" };
        let base = Plugin { id: "base", value: "base" };
        let site = Plugin { id: "site", value: "site" };

        let registry = HelperRegistry::load(&[&framework], &[&base], &[&site]).unwrap();
        assert_eq!(call(&registry, "greet"), "site".into());
        assert_eq!(registry.get(HelperKind::Regular, "greet").unwrap().source, HelperSource::Site);
    }

    #[test]
    fn test_plugins_register_in_reverse_dependency_order() {
        // `base` is a dependency of `theme`: registered last, so it wins
        let base = Plugin { id: "base", value: "base" };
        let theme = Plugin { id: "theme", value: "theme" };

        let registry = HelperRegistry::load(&[], &[&base, &theme], &[]).unwrap();
        assert_eq!(call(&registry, "greet"), "base".into());
        assert_eq!(
            registry.descriptors()[0].source,
            "plugin:base".to_string()
        );
    }

    #[test]
    fn test_regular_and_block_are_separate_keys() {
        let mut registry = HelperRegistry::new();
        let mut r = registry.registrar(HelperSource::Site);
        r.regular("panel", HelperMeta::new("value"), |_, _| Ok("v".into()))
            .unwrap();
        r.block("panel", HelperMeta::new("block"), |_, _, body| body.render(ValueMap::new()))
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.regular("panel").is_some());
        assert!(registry.block("panel").is_some());
    }
}
