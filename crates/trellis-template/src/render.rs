/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render driver.
//!
//! Walks the template AST left to right. Earlier siblings run first, so a
//! `let` or component definition is visible to everything after it.
//!
//! Expressions are dispatched in this order:
//!
//! 1. forms that need the renderer itself: `let`, `file.include`,
//!    `file.includeComponents`, `component` and `components.<name>`
//! 2. registered regular helpers
//! 3. the built-in helper library
//! 4. property access, for a bare name without arguments
//!
//! Every include, component expansion and block body goes one level deeper.
//! Past the configured maximum the offending markup is left unexpanded.
//! Any other failure becomes an inline diagnostic at the failing node, and
//! the rest of the template still renders.

use std::sync::Arc;

use crate::ast::{Argument, Call, Expression, SyntaxDefect, TemplateNode};
use crate::args::HelperArgs;
use crate::components::{collapse_whitespace, merge_parameters};
use crate::config::ConfigSnapshot;
use crate::context::TemplateContext;
use crate::engine::Engine;
use crate::error::{TemplateError, TemplateResult, UNBALANCED_SUBEXPRESSION, inline_diagnostic};
use crate::eval_context::{Diagnostic, EvalState};
use crate::expr::{coerce_bare, resolve_property};
use crate::helpers::{HelperEnv, call_builtin};
use crate::parser::Template;
use crate::resolver::ResolveError;
use crate::value::{TemplateValue, ValueMap};

/// Prefix of component invocations.
pub(crate) const COMPONENTS_NAMESPACE: &str = "components";

/// Where an expression's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// A registered helper; string output may contain markup.
    Helper,
    /// A built-in helper or a context property.
    Value,
    /// Already-rendered content (includes, components).
    Rendered,
}

pub(crate) struct Renderer<'e> {
    pub(crate) engine: &'e Engine,
    pub(crate) state: EvalState,
}

impl<'e> Renderer<'e> {
    pub fn new(engine: &'e Engine, snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            engine,
            state: EvalState::new(snapshot),
        }
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        self.state.diagnostics.into_diagnostics()
    }

    pub fn render_template(
        &mut self,
        template: &Template,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> String {
        self.render_nodes(template, &template.nodes, ctx, depth)
    }

    pub(crate) fn render_nodes(
        &mut self,
        template: &Template,
        nodes: &[TemplateNode],
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                TemplateNode::Text(text) => out.push_str(text),
                TemplateNode::Expression(expr) => {
                    let rendered = self.render_expression(template, expr, ctx, depth);
                    out.push_str(&rendered);
                }
                TemplateNode::Block(block) => {
                    let rendered = self.render_block(template, block, ctx, depth);
                    out.push_str(&rendered);
                }
                TemplateNode::Invalid(defect) => out.push_str(&self.syntax_defect(defect)),
            }
        }
        out
    }

    /// Evaluate a single expression to its native value.
    pub fn evaluate_expression(
        &mut self,
        template: &Template,
        expr: &Expression,
        ctx: &mut TemplateContext,
    ) -> TemplateValue {
        match self.dispatch(&expr.call, template, ctx, 0) {
            Ok((value, _)) => value,
            Err(err) => self.report(err, expr.span.slice(template.source())).into(),
        }
    }

    fn render_expression(
        &mut self,
        template: &Template,
        expr: &Expression,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> String {
        match self.expand_expression(template, expr, ctx, depth) {
            Ok(text) => text,
            Err(err) => self.report(err, expr.span.slice(template.source())),
        }
    }

    fn expand_expression(
        &mut self,
        template: &Template,
        expr: &Expression,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> TemplateResult<String> {
        let (value, origin) = self.dispatch(&expr.call, template, ctx, depth)?;
        match value {
            // Helper output is expanded once more, but not recursively
            TemplateValue::String(text) if origin == Origin::Helper && text.contains("{{") => {
                let next = self.descend(depth)?;
                let nested = Template::parse(&text);
                Ok(self.render_template(&nested, ctx, next))
            }
            other => Ok(other.render()),
        }
    }

    fn dispatch(
        &mut self,
        call: &Call,
        template: &Template,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> TemplateResult<(TemplateValue, Origin)> {
        if has_unbalanced(call) {
            self.state.diagnostics.warn("unbalanced subexpression");
            return Ok((UNBALANCED_SUBEXPRESSION.into(), Origin::Rendered));
        }
        let Some(name) = call.name() else {
            let value = self.eval_argument(&call.head, template, ctx, depth)?;
            return Ok((value, Origin::Value));
        };

        match name {
            "let" => {
                let args = self.eval_args(call, template, ctx, depth)?;
                apply_let(&args, ctx);
                return Ok((TemplateValue::Null, Origin::Rendered));
            }
            "file.include" => {
                let args = self.eval_args(call, template, ctx, depth)?;
                let text = self.include(&args, ctx, depth)?;
                return Ok((text.into(), Origin::Rendered));
            }
            "file.includeComponents" => {
                // Only the component definitions are kept
                let args = self.eval_args(call, template, ctx, depth)?;
                self.include(&args, ctx, depth)?;
                return Ok((TemplateValue::Null, Origin::Rendered));
            }
            "component" => {
                let args = self.eval_args(call, template, ctx, depth)?;
                args.require(1)
                    .map_err(|e| TemplateError::helper(name, e))?;
                let text = self.invoke_component(&args.str_at(0), &args.named, ctx, depth, None)?;
                return Ok((text.into(), Origin::Rendered));
            }
            _ => {}
        }
        if let Some(usage) = component_usage(name) {
            let args = self.eval_args(call, template, ctx, depth)?;
            let text = self.invoke_component(usage, &args.named, ctx, depth, None)?;
            return Ok((text.into(), Origin::Rendered));
        }

        let args = self.eval_args(call, template, ctx, depth)?;
        let engine = self.engine;
        if let Some(helper) = engine.registry().regular(name) {
            let value = helper(&args, ctx).map_err(|e| TemplateError::helper(name, e))?;
            return Ok((value, Origin::Helper));
        }

        let env = HelperEnv {
            ctx,
            config: self.state.snapshot.as_ref(),
            files: engine.files(),
            resolver: engine.resolver(),
            now: self.state.now,
        };
        if let Some(result) = call_builtin(name, &args, &env) {
            let value = result.map_err(|e| TemplateError::helper(name, e))?;
            return Ok((value, Origin::Value));
        }

        if !call.has_arguments() {
            let value = resolve_property(name, ctx).unwrap_or_else(|| {
                tracing::debug!(name, "unresolved property renders as empty");
                TemplateValue::Null
            });
            return Ok((value, Origin::Value));
        }
        Err(TemplateError::UnknownHelper {
            name: name.to_string(),
        })
    }

    pub(crate) fn eval_args(
        &mut self,
        call: &Call,
        template: &Template,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> TemplateResult<HelperArgs> {
        let mut args = HelperArgs::new(call.name().unwrap_or_default());
        for arg in &call.positional {
            let value = self.eval_argument(arg, template, ctx, depth)?;
            args.positional.push(value);
        }
        for (key, arg) in &call.named {
            let value = self.eval_argument(arg, template, ctx, depth)?;
            args.named.insert(key.clone(), value);
        }
        Ok(args)
    }

    fn eval_argument(
        &mut self,
        arg: &Argument,
        template: &Template,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> TemplateResult<TemplateValue> {
        match arg {
            Argument::Quoted(text) => Ok(text.as_str().into()),
            Argument::Bare(token) => Ok(coerce_bare(token, ctx)),
            Argument::Subexpression(call) => {
                let (value, _) = self.dispatch(call, template, ctx, depth)?;
                Ok(value)
            }
            Argument::Unbalanced => Ok(UNBALANCED_SUBEXPRESSION.into()),
        }
    }

    /// Render another template file in a child scope holding the named
    /// arguments.
    fn include(
        &mut self,
        args: &HelperArgs,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> TemplateResult<String> {
        args.require(1)
            .map_err(|e| TemplateError::helper(args.name.as_str(), e))?;
        let next = self.descend(depth)?;
        let requested = args.str_at(0);
        let engine = self.engine;

        let path = engine
            .resolver()
            .resolve_module(&requested)
            .map_err(|e| match e {
                ResolveError::NotFound(_) => TemplateError::IncludeNotFound {
                    path: requested.clone(),
                },
                other => TemplateError::Resolve(other),
            })?;
        let template = engine
            .load_include(&path)
            .ok_or_else(|| TemplateError::IncludeNotFound {
                path: requested.clone(),
            })?;

        tracing::debug!(path = %path.display(), depth = next, "including template");
        Ok(ctx.with_scope(args.named.clone(), |scope| {
            self.render_template(&template, scope, next)
        }))
    }

    /// Expand a registered component with its defaults overlaid by `params`.
    pub(crate) fn invoke_component(
        &mut self,
        name: &str,
        params: &ValueMap,
        ctx: &mut TemplateContext,
        depth: usize,
        content: Option<String>,
    ) -> TemplateResult<String> {
        let definition = self
            .state
            .components
            .get(name)
            .ok_or_else(|| TemplateError::ComponentNotFound {
                name: name.to_string(),
            })?;
        let _guard = self.state.call_stack.enter(&definition.usage_name)?;
        let next = self.descend(depth)?;

        let (mut locals, inline) = merge_parameters(&definition.defaults, params);
        if let Some(content) = content {
            locals.insert("content".into(), content.into());
        }
        let rendered = ctx.with_scope(locals, |scope| {
            self.render_template(&definition.template, scope, next)
        });
        Ok(if inline {
            collapse_whitespace(&rendered)
        } else {
            rendered
        })
    }

    /// The depth for a nested expansion, or an error past the maximum.
    pub(crate) fn descend(&self, depth: usize) -> TemplateResult<usize> {
        let max_depth = self.state.max_depth();
        if depth >= max_depth {
            return Err(TemplateError::DepthExceeded { max_depth });
        }
        Ok(depth + 1)
    }

    /// Log and record `err`, returning what to print in its place.
    pub(crate) fn report(&mut self, err: TemplateError, raw: &str) -> String {
        let message = err.to_string();
        match err {
            TemplateError::DepthExceeded { max_depth } => {
                tracing::error!(max_depth, markup = raw, "render depth exceeded, markup left unexpanded");
                self.state.diagnostics.error(message);
                return raw.to_string();
            }
            ref e if e.is_not_found() => {
                tracing::warn!(error = %message, "template resource not found");
                self.state.diagnostics.warn(message.clone());
            }
            _ => {
                tracing::error!(error = %message, "template evaluation failed");
                self.state.diagnostics.error(message.clone());
            }
        }
        inline_diagnostic(&message)
    }

    fn syntax_defect(&mut self, defect: &SyntaxDefect) -> String {
        tracing::warn!(offset = defect.span.start, "template syntax error: {}", defect.message);
        self.state.diagnostics.warn(defect.message.clone());
        inline_diagnostic(&defect.message)
    }
}

/// `components.card` → `card`
pub(crate) fn component_usage(name: &str) -> Option<&str> {
    name.strip_prefix(COMPONENTS_NAMESPACE)?
        .strip_prefix('.')
        .filter(|usage| !usage.is_empty())
}

/// `{{let name=value}}` or `{{let "name" value}}`: write into `vars`.
pub(crate) fn apply_let(args: &HelperArgs, ctx: &mut TemplateContext) {
    if args.len() >= 2 {
        ctx.set_var(args.str_at(0), args.get(1).clone());
    }
    for (name, value) in &args.named {
        ctx.set_var(name.clone(), value.clone());
    }
}

pub(crate) fn has_unbalanced(call: &Call) -> bool {
    std::iter::once(&call.head)
        .chain(&call.positional)
        .chain(call.named.iter().map(|(_, arg)| arg))
        .any(|arg| match arg {
            Argument::Unbalanced => true,
            Argument::Subexpression(inner) => has_unbalanced(inner),
            _ => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_call;

    #[test]
    fn test_component_usage() {
        assert_eq!(component_usage("components.card"), Some("card"));
        assert_eq!(component_usage("components.icons.configSvg"), Some("icons.configSvg"));
        assert_eq!(component_usage("components."), None);
        assert_eq!(component_usage("componentsx.card"), None);
        assert_eq!(component_usage("component"), None);
    }

    #[test]
    fn test_has_unbalanced() {
        assert!(!has_unbalanced(&parse_call("math.add 1 (math.add 2 3)")));
        assert!(has_unbalanced(&parse_call("math.add 1 (math.add 2 3")));
        assert!(has_unbalanced(&parse_call("math.add 1 2)")));
    }

    #[test]
    fn test_apply_let() {
        let mut ctx = TemplateContext::new();
        apply_let(
            &HelperArgs::new("let").arg("title").arg("Home").with("count", 2.0),
            &mut ctx,
        );
        assert_eq!(ctx.lookup("vars.title"), Some(&"Home".into()));
        assert_eq!(ctx.lookup("vars.count"), Some(&2.0.into()));
    }
}
