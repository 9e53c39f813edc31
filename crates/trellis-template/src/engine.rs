/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The process-wide template engine.
//!
//! An [`Engine`] owns the services shared by all renders: the frozen helper
//! registry, the configuration snapshot cell, the file collaborators, the
//! localizer and the include cache. It is `Send + Sync` and meant to be
//! shared behind an `Arc`. Everything a single render needs (context,
//! component registry, call stack, diagnostics) is created per call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Serialize;

use crate::ast::TemplateNode;
use crate::builder::{Localizer, NoLocalizer, RequestFacts, build_render_context};
use crate::config::{ConfigSnapshot, EngineConfig, SnapshotCell};
use crate::context::TemplateContext;
use crate::eval_context::Diagnostic;
use crate::files::{FileCache, MemoryFiles};
use crate::parser::Template;
use crate::registry::HelperRegistry;
use crate::render::Renderer;
use crate::resolver::ModuleResolver;
use crate::value::TemplateValue;

/// Rendered text plus everything that went wrong while producing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOutput {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
struct CachedInclude {
    template: Arc<Template>,
    modified: Option<SystemTime>,
}

pub struct Engine {
    registry: Arc<HelperRegistry>,
    config: Arc<SnapshotCell>,
    files: Arc<dyn FileCache>,
    resolver: Arc<dyn ModuleResolver>,
    localizer: Arc<dyn Localizer>,
    includes: RwLock<HashMap<PathBuf, CachedInclude>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Render `source` for an anonymous request with `extra` merged into the
    /// context. Never fails: problems become inline diagnostics.
    pub fn render(&self, source: &str, extra: TemplateValue) -> String {
        self.render_at_depth(source, extra, 0)
    }

    /// Like [`Engine::render`], starting `depth` levels deep.
    pub fn render_at_depth(&self, source: &str, extra: TemplateValue, depth: usize) -> String {
        self.render_detailed(source, &RequestFacts::default(), extra, depth)
            .text
    }

    /// Render for a specific request.
    pub fn render_request(&self, source: &str, facts: &RequestFacts, extra: TemplateValue) -> String {
        self.render_detailed(source, facts, extra, 0).text
    }

    /// Render and return the diagnostics alongside the text.
    pub fn render_detailed(
        &self,
        source: &str,
        facts: &RequestFacts,
        extra: TemplateValue,
        depth: usize,
    ) -> RenderOutput {
        let template = Template::parse(source);
        let (mut renderer, mut ctx) = self.start(facts, extra);
        let text = renderer.render_template(&template, &mut ctx, depth);
        RenderOutput {
            text,
            diagnostics: renderer.finish(),
        }
    }

    /// Evaluate `source` to a native value.
    ///
    /// A template that is a single expression (surrounding whitespace
    /// ignored) yields that expression's value with its type intact; any
    /// other template yields its rendered text.
    pub fn evaluate(&self, source: &str, extra: TemplateValue) -> TemplateValue {
        let template = Template::parse(source);
        let mut significant = template
            .nodes()
            .iter()
            .filter(|node| !matches!(node, TemplateNode::Text(text) if text.trim().is_empty()));
        let single = match (significant.next(), significant.next()) {
            (Some(TemplateNode::Expression(expr)), None) => Some(expr),
            _ => None,
        };

        let (mut renderer, mut ctx) = self.start(&RequestFacts::default(), extra);
        match single {
            Some(expr) => renderer.evaluate_expression(&template, expr, &mut ctx),
            None => renderer.render_template(&template, &mut ctx, 0).into(),
        }
    }

    fn start(&self, facts: &RequestFacts, extra: TemplateValue) -> (Renderer<'_>, TemplateContext) {
        let snapshot = self.config.load();
        let context = build_render_context(&snapshot, self.localizer.as_ref(), facts, extra);
        (
            Renderer::new(self, snapshot),
            TemplateContext::from_value(context),
        )
    }

    pub fn registry(&self) -> &HelperRegistry {
        &self.registry
    }

    /// The configuration snapshot new renders will use.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.config.load()
    }

    pub fn config_cell(&self) -> &Arc<SnapshotCell> {
        &self.config
    }

    /// Install a new configuration. Renders already running keep the
    /// snapshot they started with.
    pub fn reload_config(&self, config: EngineConfig) {
        self.config.replace(ConfigSnapshot::new(config));
        tracing::info!("template configuration reloaded");
    }

    pub fn files(&self) -> &dyn FileCache {
        self.files.as_ref()
    }

    pub fn resolver(&self) -> &dyn ModuleResolver {
        self.resolver.as_ref()
    }

    /// Parsed include template for a resolved path.
    ///
    /// With `cacheIncludes.enabled`, the parse is reused until the file's
    /// modification time changes or the entry is invalidated.
    pub(crate) fn load_include(&self, path: &Path) -> Option<Arc<Template>> {
        let use_cache = self.config.load().cache_includes();
        let modified = self.files.modified(path);
        if use_cache {
            if let Some(cached) = self.includes.read().get(path) {
                if cached.modified == modified {
                    return Some(Arc::clone(&cached.template));
                }
            }
        }

        let content = self.files.get_file(path)?;
        let template = Arc::new(Template::parse(&content));
        if use_cache {
            self.includes.write().insert(
                path.to_path_buf(),
                CachedInclude {
                    template: Arc::clone(&template),
                    modified,
                },
            );
        }
        Some(template)
    }

    pub fn invalidate_include(&self, path: &Path) {
        if self.includes.write().remove(path).is_some() {
            tracing::debug!(path = %path.display(), "include cache entry invalidated");
        }
    }

    pub fn clear_include_cache(&self) {
        self.includes.write().clear();
    }

    pub fn cached_includes(&self) -> usize {
        self.includes.read().len()
    }
}

/// Builder for [`Engine`]. Unset collaborators default to an empty
/// in-memory file set, no localization and the default configuration.
#[derive(Default)]
pub struct EngineBuilder {
    registry: Option<HelperRegistry>,
    config: Option<Arc<SnapshotCell>>,
    files: Option<Arc<dyn FileCache>>,
    resolver: Option<Arc<dyn ModuleResolver>>,
    localizer: Option<Arc<dyn Localizer>>,
}

impl EngineBuilder {
    pub fn registry(mut self, registry: HelperRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(Arc::new(SnapshotCell::new(ConfigSnapshot::new(config))));
        self
    }

    /// Share a snapshot cell with a config watcher.
    pub fn snapshot_cell(mut self, cell: Arc<SnapshotCell>) -> Self {
        self.config = Some(cell);
        self
    }

    pub fn files(mut self, files: Arc<dyn FileCache>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use one in-memory file set as both file cache and resolver.
    pub fn memory_files(self, files: Arc<MemoryFiles>) -> Self {
        self.files(files.clone()).resolver(files)
    }

    pub fn localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn build(self) -> Engine {
        let memory = Arc::new(MemoryFiles::new());
        let default_files: Arc<dyn FileCache> = memory.clone();
        let default_resolver: Arc<dyn ModuleResolver> = memory;
        let default_localizer: Arc<dyn Localizer> = Arc::new(NoLocalizer);
        let engine = Engine {
            registry: Arc::new(self.registry.unwrap_or_default()),
            config: self.config.unwrap_or_default(),
            files: self.files.unwrap_or(default_files),
            resolver: self.resolver.unwrap_or(default_resolver),
            localizer: self.localizer.unwrap_or(default_localizer),
            includes: RwLock::new(HashMap::new()),
        };
        tracing::debug!(helpers = engine.registry.len(), "template engine ready");
        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine_with(files: &[(&str, &str)]) -> (Engine, Arc<MemoryFiles>) {
        let memory = Arc::new(MemoryFiles::with_files(files.iter().copied()));
        let engine = Engine::builder().memory_files(memory.clone()).build();
        (engine, memory)
    }

    #[test]
    fn test_evaluate_keeps_native_type() {
        let engine = Engine::new();
        assert_eq!(engine.evaluate("  {{math.add 2 3}}\n", TemplateValue::Null), 5.0.into());
        assert_eq!(
            engine.evaluate("{{json.parse '[1,2]'}}", TemplateValue::Null),
            TemplateValue::from(json!([1, 2]))
        );
        assert_eq!(
            engine.evaluate("sum: {{math.add 2 3}}", TemplateValue::Null),
            "sum: 5".into()
        );
    }

    #[test]
    fn test_include_cache_follows_modification() {
        let (engine, memory) = engine_with(&[("a.html", "one")]);
        assert_eq!(engine.render("{{file.include 'a.html'}}", TemplateValue::Null), "one");
        assert_eq!(engine.cached_includes(), 1);

        std::thread::sleep(std::time::Duration::from_millis(5));
        memory.add("a.html", "two");
        assert_eq!(engine.render("{{file.include 'a.html'}}", TemplateValue::Null), "two");

        engine.invalidate_include(Path::new("a.html"));
        assert_eq!(engine.cached_includes(), 0);
    }

    #[test]
    fn test_include_cache_can_be_disabled() {
        let memory = Arc::new(MemoryFiles::with_files([("a.html", "one")]));
        let mut config = EngineConfig::default();
        config.template.cache_includes.enabled = false;
        let engine = Engine::builder()
            .memory_files(memory)
            .config(config)
            .build();
        engine.render("{{file.include 'a.html'}}", TemplateValue::Null);
        assert_eq!(engine.cached_includes(), 0);
    }

    #[test]
    fn test_reload_config_applies_to_new_renders() {
        let engine = Engine::new();
        let mut config = EngineConfig::default();
        config.site = json!({"title": "Docs"});
        engine.reload_config(config);
        assert_eq!(engine.render("{{config.title}}", TemplateValue::Null), "Docs");
    }

    #[test]
    fn test_render_detailed_collects_diagnostics() {
        let engine = Engine::new();
        let output = engine.render_detailed(
            "{{nope 1}} {{file.include 'missing.html'}}",
            &RequestFacts::default(),
            TemplateValue::Null,
            0,
        );
        assert_eq!(output.diagnostics.len(), 2);
        assert!(output.text.contains("<!-- template error: unknown helper: nope -->"));
        assert!(output.text.contains("<!-- template error: include not found: missing.html -->"));
    }
}
