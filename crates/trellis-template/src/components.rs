/*
 * components.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-render component registry.
//!
//! `{{#component "card" title="Untitled"}}...{{/component}}` registers a
//! template fragment with default parameters; `{{components.card title="x"}}`
//! or `{{component "card" title="x"}}` expands it. The registry lives for one
//! top-level render only.
//!
//! Declared names are converted to usage names by turning each dot-separated
//! segment from kebab-case into camelCase (`icons.config-svg` becomes
//! `icons.configSvg`).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{TemplateError, TemplateResult};
use crate::parser::Template;
use crate::value::{TemplateValue, ValueMap};

/// Parameter that collapses the expanded component's whitespace.
pub const INLINE_PARAMETER: &str = "_inline";

static COMPONENT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z](?:[\w\-.]*[A-Za-z0-9])?$").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A registered component.
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    pub usage_name: String,
    /// The name as declared in the defining block.
    pub original_name: String,
    pub template: Template,
    pub defaults: ValueMap,
}

impl ComponentDefinition {
    /// Validate `declared` and build a definition for it.
    pub fn new(declared: &str, template: Template, defaults: ValueMap) -> TemplateResult<Self> {
        if !COMPONENT_NAME.is_match(declared) {
            return Err(TemplateError::InvalidComponentName {
                name: declared.to_string(),
            });
        }
        Ok(Self {
            usage_name: usage_name(declared),
            original_name: declared.to_string(),
            template,
            defaults,
        })
    }

    /// Summary mirrored into the `components` context namespace.
    pub fn summary(&self) -> TemplateValue {
        let mut map = ValueMap::new();
        map.insert("name".into(), self.original_name.as_str().into());
        map.insert("defaults".into(), TemplateValue::Map(self.defaults.clone()));
        TemplateValue::Map(map)
    }
}

/// Kebab-case to camelCase per dot segment.
pub fn usage_name(declared: &str) -> String {
    declared
        .split('.')
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            let mut upper = false;
            for c in segment.chars() {
                if c == '-' {
                    upper = !out.is_empty();
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    components: IndexMap<String, Arc<ComponentDefinition>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any earlier one with the same usage
    /// name.
    pub fn define(&mut self, definition: ComponentDefinition) -> Arc<ComponentDefinition> {
        let definition = Arc::new(definition);
        if let Some(previous) = self
            .components
            .insert(definition.usage_name.clone(), Arc::clone(&definition))
        {
            tracing::debug!(component = %previous.usage_name, "component redefined");
        }
        definition
    }

    /// Look up by usage name; a declared (kebab-case) name also works.
    pub fn get(&self, name: &str) -> Option<Arc<ComponentDefinition>> {
        self.components
            .get(name)
            .or_else(|| self.components.get(&usage_name(name)))
            .cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Usage names of the components currently being expanded.
#[derive(Debug, Clone, Default)]
pub struct CallStack(Rc<RefCell<Vec<String>>>);

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `name`, or fail with the full chain if it is already being
    /// expanded. The name is popped when the guard drops.
    pub fn enter(&self, name: &str) -> TemplateResult<CallGuard> {
        let mut stack = self.0.borrow_mut();
        if stack.iter().any(|entry| entry == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(TemplateError::CircularComponent { chain });
        }
        stack.push(name.to_string());
        Ok(CallGuard {
            stack: Rc::clone(&self.0),
        })
    }

    pub fn depth(&self) -> usize {
        self.0.borrow().len()
    }
}

/// Pops its component from the [`CallStack`] on every exit path.
#[derive(Debug)]
pub struct CallGuard {
    stack: Rc<RefCell<Vec<String>>>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

/// Merge defaults with call-site parameters (call site wins).
///
/// Keys starting with `_` are reserved for the framework and are not passed
/// to the component. Returns the merged parameters and whether `_inline`
/// was set.
pub fn merge_parameters(defaults: &ValueMap, call: &ValueMap) -> (ValueMap, bool) {
    let inline = call
        .get(INLINE_PARAMETER)
        .or_else(|| defaults.get(INLINE_PARAMETER))
        .is_some_and(|v| v.is_truthy() && v.as_str() != Some("false"));

    let mut merged = ValueMap::new();
    for (key, value) in defaults.iter().chain(call.iter()) {
        if !key.starts_with('_') {
            merged.insert(key.clone(), value.clone());
        }
    }
    (merged, inline)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}
