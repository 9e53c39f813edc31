/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Handlebars-style template engine for trellis.
//!
//! Supports:
//!
//! - Expressions: `{{helper arg key=value}}`, `{{user.name}}`
//! - Subexpressions: `{{math.add 1 (math.multiply 2 3)}}`
//! - Blocks: `{{#if cond}}...{{else}}...{{/if}}`, `{{#each items}}`,
//!   `{{#with obj}}`, `{{#let x=1}}`, `{{#eq a b}}`
//! - Components: `{{#component "card" title="Untitled"}}...{{/component}}`
//!   then `{{components.card title="Hi"}}`
//! - Includes: `{{file.include "partials/header.html" active="home"}}`
//! - Comments: `{{!-- comment --}}`
//!
//! # Architecture
//!
//! Templates are parsed into an AST ([`Template`]) and evaluated with native
//! [`TemplateValue`]s, so a number or list produced by one helper reaches the
//! next one with its type intact. Rendering never fails: malformed markup
//! and failing helpers become inline `<!-- template error: ... -->`
//! comments and are collected as [`Diagnostic`]s.
//!
//! # Example
//!
//! ```
//! use trellis_template::{Engine, TemplateValue};
//! use serde_json::json;
//!
//! let engine = Engine::new();
//! let data = TemplateValue::from(json!({"items": [3, 1, 2]}));
//! let out = engine.render(
//!     "{{#each (array.sort items)}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}",
//!     data,
//! );
//! assert_eq!(out, "1, 2, 3");
//! ```

pub mod args;
pub mod ast;
mod blocks;
pub mod builder;
pub mod components;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval_context;
pub mod expr;
pub mod files;
pub mod filter;
mod helpers;
pub mod lexer;
pub mod parser;
pub mod registry;
mod render;
pub mod resolver;
pub mod value;

// Re-export main types at crate root
pub use args::HelperArgs;
pub use ast::{Argument, Block, Call, Expression, Span, SyntaxDefect, TemplateNode};
pub use builder::{
    ContextBuilder, Localizer, NoLocalizer, RequestFacts, StaticLocalizer, UrlFacts, UserInfo,
    build_render_context, deep_merge,
};
pub use components::{ComponentDefinition, ComponentRegistry, usage_name};
pub use config::{ConfigError, ConfigSnapshot, EngineConfig, FilterLists, SnapshotCell};
pub use context::TemplateContext;
pub use engine::{Engine, EngineBuilder, RenderOutput};
pub use error::{HelperError, HelperResult, TemplateError, TemplateResult};
pub use eval_context::{Diagnostic, DiagnosticCollector, Severity};
pub use files::{DiskFileCache, FileCache, MemoryFiles};
pub use filter::{ContextFilter, PathPattern};
pub use helpers::BUILTIN_NAMES;
pub use parser::Template;
pub use registry::{
    BlockBody, HelperHandler, HelperKind, HelperMeta, HelperPlugin, HelperRegistrar,
    HelperRegistry, HelperSource, HelperSummary, RegistryError,
};
pub use resolver::{ModuleResolver, OverlayResolver, ResolveError};
pub use value::{TemplateValue, ValueMap};
