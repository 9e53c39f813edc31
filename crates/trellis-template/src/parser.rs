/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! Builds the AST from the lexer's token stream. Block tags are matched with
//! an explicit stack of open blocks, so an `{{else}}` always belongs to the
//! innermost open block and same-named nested blocks pair up correctly.
//!
//! Parsing never fails. Malformed markup becomes [`TemplateNode::Invalid`]
//! nodes that the renderer prints as inline diagnostics:
//!
//! - a close tag that matches no open block
//! - an open block that is never closed (its content is kept in place)
//! - `{{else}}` outside a block, or a second `{{else}}` in one block
//! - an empty `{{}}` or an unterminated `{{`

use std::sync::Arc;

use crate::ast::{Block, Call, Expression, Span, SyntaxDefect, TemplateNode};
use crate::expr::parse_call;
use crate::lexer::{Token, TokenKind, strip_comments, tokenize};

/// A compiled template ready for evaluation.
#[derive(Debug, Clone)]
pub struct Template {
    /// The parsed template AST.
    pub(crate) nodes: Vec<TemplateNode>,

    /// Comment-free source the node spans point into.
    pub(crate) source: Arc<str>,
}

impl Template {
    /// Parse template source.
    pub fn parse(source: &str) -> Self {
        let source: Arc<str> = Arc::from(strip_comments(source).as_ref());
        let tokens = tokenize(&source);
        let nodes = BlockParser::default().parse(tokens);
        Self { nodes, source }
    }

    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// A template made of some of this template's nodes, sharing its source.
    pub(crate) fn fragment(&self, nodes: Vec<TemplateNode>) -> Self {
        Self {
            nodes,
            source: Arc::clone(&self.source),
        }
    }

    /// Every syntax defect in the template, in document order.
    pub fn defects(&self) -> Vec<&SyntaxDefect> {
        fn collect<'a>(nodes: &'a [TemplateNode], out: &mut Vec<&'a SyntaxDefect>) {
            for node in nodes {
                match node {
                    TemplateNode::Invalid(defect) => out.push(defect),
                    TemplateNode::Block(block) => {
                        collect(&block.body, out);
                        if let Some(inverse) = &block.inverse {
                            collect(inverse, out);
                        }
                    }
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }
}

struct OpenBlock {
    name: String,
    call: Call,
    open_span: Span,
    body: Vec<TemplateNode>,
    inverse: Option<Vec<TemplateNode>>,
    body_end: Option<usize>,
}

impl OpenBlock {
    fn current(&mut self) -> &mut Vec<TemplateNode> {
        match &mut self.inverse {
            Some(inverse) => inverse,
            None => &mut self.body,
        }
    }
}

#[derive(Default)]
struct BlockParser {
    root: Vec<TemplateNode>,
    stack: Vec<OpenBlock>,
}

impl BlockParser {
    fn parse(mut self, tokens: Vec<Token>) -> Vec<TemplateNode> {
        for token in tokens {
            match token.kind {
                TokenKind::Text(text) => self.push(TemplateNode::Text(text)),
                TokenKind::Expression(inner) => {
                    if inner.is_empty() {
                        self.defect("empty expression", token.span);
                    } else {
                        self.push(TemplateNode::Expression(Expression {
                            call: parse_call(&inner),
                            span: token.span,
                        }));
                    }
                }
                TokenKind::Unterminated => self.defect("unterminated tag: missing '}}'", token.span),
                TokenKind::Open(inner) => self.open(&inner, token.span),
                TokenKind::Else => self.split_else(token.span),
                TokenKind::Close(name) => self.close(&name, token.span),
            }
        }

        while let Some(open) = self.stack.pop() {
            self.abandon(open);
        }
        self.root
    }

    fn current(&mut self) -> &mut Vec<TemplateNode> {
        match self.stack.last_mut() {
            Some(open) => open.current(),
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: TemplateNode) {
        self.current().push(node);
    }

    fn defect(&mut self, message: impl Into<String>, span: Span) {
        self.push(TemplateNode::Invalid(SyntaxDefect {
            message: message.into(),
            span,
        }));
    }

    fn open(&mut self, inner: &str, span: Span) {
        let call = parse_call(inner);
        let Some(name) = call.name().filter(|n| !n.is_empty()).map(str::to_string) else {
            self.defect("block tag without a helper name", span);
            return;
        };
        self.stack.push(OpenBlock {
            name,
            call,
            open_span: span,
            body: Vec::new(),
            inverse: None,
            body_end: None,
        });
    }

    fn split_else(&mut self, span: Span) {
        match self.stack.last_mut() {
            None => self.defect("{{else}} outside of a block", span),
            Some(open) if open.inverse.is_some() => {
                let message = format!("duplicate {{{{else}}}} in block '{}'", open.name);
                self.defect(message, span);
            }
            Some(open) => {
                open.body_end = Some(span.start);
                open.inverse = Some(Vec::new());
            }
        }
    }

    fn close(&mut self, name: &str, span: Span) {
        if !self.stack.iter().any(|open| open.name == name) {
            self.defect(
                format!("unbalanced block: {{{{/{name}}}}} has no matching open tag"),
                span,
            );
            return;
        }

        // Blocks opened inside the one being closed were never closed themselves
        while let Some(open) = self.stack.pop() {
            if open.name == name {
                let body_span = Span::new(open.open_span.end, open.body_end.unwrap_or(span.start));
                let block = Block {
                    call: open.call,
                    body: open.body,
                    inverse: open.inverse,
                    body_span,
                    span: Span::new(open.open_span.start, span.end),
                };
                self.push(TemplateNode::Block(block));
                return;
            }
            self.abandon(open);
        }
    }

    /// Flatten an unclosed block into its parent: a diagnostic followed by
    /// the content it collected.
    fn abandon(&mut self, open: OpenBlock) {
        self.defect(
            format!("unbalanced block: {{{{#{}}}}} is never closed", open.name),
            open.open_span,
        );
        let parent = self.current();
        parent.extend(open.body);
        parent.extend(open.inverse.into_iter().flatten());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Argument;

    fn block(node: &TemplateNode) -> &Block {
        match node {
            TemplateNode::Block(b) => b,
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_text_and_expression() {
        let t = Template::parse("Hello {{user.name}}!");
        assert_eq!(t.nodes().len(), 3);
        assert!(matches!(&t.nodes()[1], TemplateNode::Expression(e) if e.call.name() == Some("user.name")));
    }

    #[test]
    fn test_nested_else_belongs_to_inner_block() {
        let t = Template::parse("{{#if false}}{{#if true}}X{{else}}Y{{/if}}{{else}}Z{{/if}}");
        assert_eq!(t.nodes().len(), 1);
        let outer = block(&t.nodes()[0]);
        assert_eq!(outer.inverse, Some(vec![TemplateNode::Text("Z".into())]));
        let inner = block(&outer.body[0]);
        assert_eq!(inner.body, vec![TemplateNode::Text("X".into())]);
        assert_eq!(inner.inverse, Some(vec![TemplateNode::Text("Y".into())]));
    }

    #[test]
    fn test_block_spans() {
        let source = "a{{#each xs}}<{{this}}>{{else}}none{{/each}}b";
        let t = Template::parse(source);
        let b = block(&t.nodes()[1]);
        assert_eq!(b.span.slice(t.source()), "{{#each xs}}<{{this}}>{{else}}none{{/each}}");
        assert_eq!(b.body_span.slice(t.source()), "<{{this}}>");
        assert_eq!(b.call.positional, vec![Argument::Bare("xs".into())]);
    }

    #[test]
    fn test_stray_close_is_defect() {
        let t = Template::parse("a{{/if}}b");
        let defects = t.defects();
        assert_eq!(defects.len(), 1);
        assert!(defects[0].message.contains("unbalanced block"));
    }

    #[test]
    fn test_unclosed_block_keeps_content() {
        let t = Template::parse("{{#if x}}kept");
        assert!(matches!(&t.nodes()[0], TemplateNode::Invalid(_)));
        assert_eq!(t.nodes()[1], TemplateNode::Text("kept".into()));
    }

    #[test]
    fn test_inner_unclosed_block_closed_by_outer() {
        let t = Template::parse("{{#each xs}}{{#if y}}in{{/each}}");
        let outer = block(&t.nodes()[0]);
        assert!(matches!(&outer.body[0], TemplateNode::Invalid(_)));
        assert_eq!(outer.body[1], TemplateNode::Text("in".into()));
    }

    #[test]
    fn test_else_outside_block() {
        let t = Template::parse("a{{else}}b");
        assert_eq!(t.defects().len(), 1);
    }

    #[test]
    fn test_comments_removed_before_parsing() {
        let t = Template::parse("a{{!-- {{#if}} --}}b");
        assert_eq!(t.source(), "ab");
        assert!(t.defects().is_empty());
    }
}
