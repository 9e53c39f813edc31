/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Scoped variable context.
//!
//! A [`TemplateContext`] is a stack of frames. The bottom frame holds the
//! data assembled for the render call; each block pushes a frame for its
//! local bindings (`this`, `@index`, `let` variables, component parameters)
//! and pops it when the block's content is done. Frames are reference
//! counted and copied on write, so cloning a context is cheap and a child
//! scope never mutates the parent's view.

use std::sync::Arc;

use crate::value::{TemplateValue, ValueMap};

/// Namespace that `let` writes into.
pub const VARS_NAMESPACE: &str = "vars";

#[derive(Debug, Clone, Default)]
struct Frame {
    variables: ValueMap,
    /// Lookups stop at an isolated frame instead of falling through to the
    /// frames below it (`{{#with}}` replaces the visible root this way).
    isolated: bool,
}

/// A context for template evaluation containing variable bindings.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    frames: Vec<Arc<Frame>>,
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self {
            frames: vec![Arc::new(Frame::default())],
        }
    }

    /// Create a context whose root frame holds the given bindings.
    pub fn from_map(variables: ValueMap) -> Self {
        Self {
            frames: vec![Arc::new(Frame {
                variables,
                isolated: false,
            })],
        }
    }

    /// Create a context from a value; non-map values produce an empty context.
    pub fn from_value(value: TemplateValue) -> Self {
        match value {
            TemplateValue::Map(map) => Self::from_map(map),
            _ => Self::new(),
        }
    }

    /// Insert a variable into the innermost scope.
    pub fn insert(&mut self, key: impl Into<String>, value: TemplateValue) {
        self.top_mut().variables.insert(key.into(), value);
    }

    /// Insert a variable into the root scope, visible to every later node of
    /// the render.
    pub fn insert_root(&mut self, key: impl Into<String>, value: TemplateValue) {
        if let Some(root) = self.frames.first_mut() {
            Arc::make_mut(root).variables.insert(key.into(), value);
        }
    }

    /// Get a variable from the context, checking enclosing scopes.
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.variables.get(key) {
                return Some(value);
            }
            if frame.isolated {
                return None;
            }
        }
        None
    }

    /// Whether a root name is visible from the innermost scope.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get a variable by path (e.g., `["employee", "salary"]`).
    pub fn get_path(&self, path: &[&str]) -> Option<&TemplateValue> {
        let (first, rest) = path.split_first()?;
        self.get(first).and_then(|v| v.get_path(rest))
    }

    /// Get a variable by dotted path (e.g., `"employee.salary"`).
    pub fn lookup(&self, dotted: &str) -> Option<&TemplateValue> {
        let path: Vec<&str> = dotted.split('.').collect();
        self.get_path(&path)
    }

    /// Push a child scope holding the given bindings.
    pub fn push_scope(&mut self, variables: ValueMap) {
        self.frames.push(Arc::new(Frame {
            variables,
            isolated: false,
        }));
    }

    /// Push a child scope that hides every enclosing binding.
    pub fn push_isolated_scope(&mut self, variables: ValueMap) {
        self.frames.push(Arc::new(Frame {
            variables,
            isolated: true,
        }));
    }

    /// Pop the innermost scope. The root scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Run `f` inside a child scope, popping it afterwards.
    pub fn with_scope<R>(&mut self, variables: ValueMap, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push_scope(variables);
        let result = f(self);
        self.pop_scope();
        result
    }

    /// Run `f` inside an isolated child scope, popping it afterwards.
    pub fn with_isolated_scope<R>(
        &mut self,
        variables: ValueMap,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.push_isolated_scope(variables);
        let result = f(self);
        self.pop_scope();
        result
    }

    /// Number of scopes (the root counts as one).
    pub fn scope_depth(&self) -> usize {
        self.frames.len()
    }

    /// The `vars` namespace as currently visible.
    pub fn vars(&self) -> ValueMap {
        self.get(VARS_NAMESPACE)
            .and_then(|v| v.as_map())
            .cloned()
            .unwrap_or_default()
    }

    /// Set a `let` variable in the innermost scope.
    ///
    /// The visible `vars` map is copied into the innermost frame before the
    /// write, so enclosing scopes keep their own view.
    pub fn set_var(&mut self, name: impl Into<String>, value: TemplateValue) {
        let mut vars = self.vars();
        vars.insert(name.into(), value);
        self.insert(VARS_NAMESPACE, TemplateValue::Map(vars));
    }

    /// Set a dotted path inside a root-level namespace map, creating
    /// intermediate maps as needed (`set_namespaced("components", "icons.svg", v)`).
    pub fn set_namespaced(&mut self, namespace: &str, dotted: &str, value: TemplateValue) {
        let mut root = self
            .frames
            .first()
            .and_then(|f| f.variables.get(namespace))
            .cloned()
            .filter(|v| matches!(v, TemplateValue::Map(_)))
            .unwrap_or_else(TemplateValue::empty_map);

        let segments: Vec<&str> = dotted.split('.').collect();
        insert_path(&mut root, &segments, value);
        self.insert_root(namespace, root);
    }

    /// Merge every visible binding into a single map, inner scopes winning.
    pub fn flatten(&self) -> ValueMap {
        let start = self
            .frames
            .iter()
            .rposition(|f| f.isolated)
            .unwrap_or(0);
        let mut merged = ValueMap::new();
        for frame in &self.frames[start..] {
            for (k, v) in &frame.variables {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    fn top_mut(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Arc::new(Frame::default()));
        }
        let last = self.frames.len() - 1;
        Arc::make_mut(&mut self.frames[last])
    }
}

/// Insert `value` at `path` inside `target`, replacing non-map
/// intermediates with maps.
pub(crate) fn insert_path(target: &mut TemplateValue, path: &[&str], value: TemplateValue) {
    let Some((first, rest)) = path.split_first() else {
        *target = value;
        return;
    };

    if !matches!(target, TemplateValue::Map(_)) {
        *target = TemplateValue::empty_map();
    }
    if let TemplateValue::Map(map) = target {
        if rest.is_empty() {
            map.insert((*first).to_string(), value);
        } else {
            let child = map
                .entry((*first).to_string())
                .or_insert_with(TemplateValue::empty_map);
            insert_path(child, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(v: serde_json::Value) -> TemplateValue {
        TemplateValue::from(v)
    }

    #[test]
    fn test_context_scoping() {
        let mut ctx = TemplateContext::new();
        ctx.insert("x", "parent_x".into());
        ctx.insert("y", "parent_y".into());

        let mut locals = ValueMap::new();
        locals.insert("x".into(), "child_x".into());
        ctx.with_scope(locals, |child| {
            // Child shadows parent for 'x'
            assert_eq!(child.get("x"), Some(&"child_x".into()));
            // Child inherits 'y' from parent
            assert_eq!(child.get("y"), Some(&"parent_y".into()));
            child.insert("z", "child_z".into());
        });

        // Parent unchanged
        assert_eq!(ctx.get("x"), Some(&"parent_x".into()));
        assert_eq!(ctx.get("z"), None);
    }

    #[test]
    fn test_isolated_scope_hides_parent() {
        let mut ctx = TemplateContext::from_value(value(json!({"outer": 1})));
        let inner = value(json!({"name": "n"})).as_map().cloned().unwrap();
        ctx.with_isolated_scope(inner, |scope| {
            assert_eq!(scope.get("outer"), None);
            assert_eq!(scope.lookup("name"), Some(&"n".into()));
            assert!(!scope.flatten().contains_key("outer"));
        });
        assert!(ctx.contains("outer"));
    }

    #[test]
    fn test_lookup_dotted_path() {
        let ctx = TemplateContext::from_value(value(json!({
            "user": {"profile": {"name": "Ada"}}
        })));
        assert_eq!(ctx.lookup("user.profile.name"), Some(&"Ada".into()));
        assert_eq!(ctx.lookup("user.missing"), None);
    }

    #[test]
    fn test_set_var_is_copy_on_write() {
        let mut ctx = TemplateContext::new();
        ctx.set_var("a", 1.0.into());
        ctx.with_scope(ValueMap::new(), |child| {
            child.set_var("b", 2.0.into());
            assert_eq!(child.lookup("vars.a"), Some(&1.0.into()));
            assert_eq!(child.lookup("vars.b"), Some(&2.0.into()));
        });
        assert_eq!(ctx.lookup("vars.a"), Some(&1.0.into()));
        assert_eq!(ctx.lookup("vars.b"), None);
    }

    #[test]
    fn test_clone_does_not_share_writes() {
        let mut ctx = TemplateContext::new();
        ctx.insert("a", 1.0.into());
        let snapshot = ctx.clone();
        ctx.insert("a", 2.0.into());
        assert_eq!(snapshot.get("a"), Some(&1.0.into()));
    }

    #[test]
    fn test_set_namespaced_goes_to_root() {
        let mut ctx = TemplateContext::new();
        ctx.with_scope(ValueMap::new(), |child| {
            child.set_namespaced("components", "icons.configSvg", "def".into());
        });
        assert_eq!(
            ctx.lookup("components.icons.configSvg"),
            Some(&"def".into())
        );
    }

    #[test]
    fn test_root_scope_is_never_popped() {
        let mut ctx = TemplateContext::new();
        ctx.insert("a", true.into());
        ctx.pop_scope();
        assert_eq!(ctx.scope_depth(), 1);
        assert!(ctx.contains("a"));
    }
}
