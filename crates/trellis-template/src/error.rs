/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template evaluation.
//!
//! None of these ever escape [`crate::Engine::render`]: the render driver turns
//! each one into an inline diagnostic at the failing node's location.

use thiserror::Error;

use crate::resolver::ResolveError;

/// Errors raised while evaluating a single template node.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Malformed markup that the parser could only partially recover.
    #[error("{message}")]
    Syntax { message: String },

    /// A `{{#name}}` block with no built-in or registered handler.
    #[error("unknown block helper: {name}")]
    UnknownBlock { name: String },

    /// A `{{name args}}` call with arguments but no matching helper.
    #[error("unknown helper: {name}")]
    UnknownHelper { name: String },

    /// A component invocation naming a component that was never defined.
    #[error("component not found: {name}")]
    ComponentNotFound { name: String },

    /// A component that (directly or indirectly) invokes itself.
    #[error("circular component reference: {}", chain.join(" -> "))]
    CircularComponent { chain: Vec<String> },

    /// A component definition whose name fails validation.
    #[error("invalid component name: {name:?}")]
    InvalidComponentName { name: String },

    /// Recursion (includes, components, nested blocks) went past the limit.
    #[error("maximum render depth ({max_depth}) exceeded")]
    DepthExceeded { max_depth: usize },

    /// An include whose file could not be read.
    #[error("include not found: {path}")]
    IncludeNotFound { path: String },

    /// A file argument rejected by the module resolver.
    #[error("path rejected: {0}")]
    Resolve(#[from] ResolveError),

    /// A helper handler returned an error.
    #[error("helper '{helper}' failed: {source}")]
    Helper {
        helper: String,
        #[source]
        source: HelperError,
    },
}

impl TemplateError {
    /// Wrap a handler error with the name of the helper that raised it.
    pub fn helper(helper: impl Into<String>, source: HelperError) -> Self {
        TemplateError::Helper {
            helper: helper.into(),
            source,
        }
    }

    /// Whether this is an ordinary "not found" condition (logged as a warning).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TemplateError::ComponentNotFound { .. }
                | TemplateError::IncludeNotFound { .. }
                | TemplateError::Resolve(ResolveError::NotFound(_))
        )
    }
}

/// Errors raised by helper handlers.
#[derive(Debug, Error)]
pub enum HelperError {
    /// The helper was called with the wrong number or shape of arguments.
    #[error("{0}")]
    InvalidArguments(String),

    /// The helper failed for any other reason.
    #[error("{0}")]
    Failed(String),
}

/// Result type for template evaluation.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for helper handlers.
pub type HelperResult<T> = Result<T, HelperError>;

/// Marker substituted for an unmatched parenthesis in an expression.
pub const UNBALANCED_SUBEXPRESSION: &str = "<!-- unbalanced subexpression -->";

/// Format a message as the inline HTML-comment diagnostic used in output.
pub fn inline_diagnostic(message: &str) -> String {
    // "--" may not appear inside an HTML comment
    format!(
        "<!-- template error: {} -->",
        message.replace("--", "- -")
    )
}
