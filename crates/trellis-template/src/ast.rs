/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! This module defines the abstract syntax tree for parsed templates.
//! Nodes carry byte spans into the template source so that a guard can hand
//! back the original, unexpanded text of any construct.

use std::ops::Range;

/// Byte range into a template's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The text this span covers, or `""` if it falls outside `source`.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.range()).unwrap_or("")
    }
}

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// Literal text to be output as-is.
    Text(String),

    /// Regular expression: `{{name args}}`
    Expression(Expression),

    /// Block expression: `{{#name args}}...{{else}}...{{/name}}`
    Block(Block),

    /// A syntax defect, rendered inline as a diagnostic.
    Invalid(SyntaxDefect),
}

/// Regular expression node: `{{name args}}`
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub call: Call,
    /// Span of the whole `{{...}}` tag.
    pub span: Span,
}

/// Block expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub call: Call,
    /// Content before `{{else}}` (or the whole content if there is no else).
    pub body: Vec<TemplateNode>,
    /// Content after `{{else}}`.
    pub inverse: Option<Vec<TemplateNode>>,
    /// Span of the body content only (between the open tag and `{{else}}`
    /// or the close tag).
    pub body_span: Span,
    /// Span from the open tag through the close tag.
    pub span: Span,
}

/// A helper invocation: head plus positional and named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub head: Argument,
    pub positional: Vec<Argument>,
    pub named: Vec<(String, Argument)>,
}

impl Call {
    /// The helper name, when the head is a bare token.
    pub fn name(&self) -> Option<&str> {
        match &self.head {
            Argument::Bare(name) => Some(name),
            _ => None,
        }
    }

    pub fn has_arguments(&self) -> bool {
        !self.positional.is_empty() || !self.named.is_empty()
    }
}

/// One argument (or the head) of a call, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// A quoted literal; always a string.
    Quoted(String),
    /// A bare token: keyword, number, path, or literal text.
    Bare(String),
    /// A parenthesized nested helper call.
    Subexpression(Box<Call>),
    /// An unmatched parenthesis.
    Unbalanced,
}

/// A piece of markup the parser could not make sense of.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxDefect {
    pub message: String,
    pub span: Span,
}
