/*
 * blocks.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Block evaluation.
//!
//! Registered block helpers are tried first. Otherwise the block must be
//! one of the built-in constructs:
//!
//! - `if`, `unless` and the logical/comparison helpers, with optional `{{else}}`
//! - `each` over a list (`this`, `@index`, `@first`, `@last`) or a map
//!   (additionally `@key`)
//! - `with`, which makes the target the only visible scope
//! - `let`, whose variables live only inside the block
//! - `component`, which registers its body as a component
//! - `components.<name>`, which invokes a component with the rendered body
//!   as its `content` parameter

use crate::ast::Block;
use crate::components::ComponentDefinition;
use crate::context::TemplateContext;
use crate::error::{HelperResult, TemplateError, TemplateResult, UNBALANCED_SUBEXPRESSION};
use crate::helpers::logic;
use crate::parser::Template;
use crate::registry::BlockBody;
use crate::render::{COMPONENTS_NAMESPACE, Renderer, apply_let, component_usage, has_unbalanced};
use crate::value::{TemplateValue, ValueMap};

impl Renderer<'_> {
    pub(crate) fn render_block(
        &mut self,
        template: &Template,
        block: &Block,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> String {
        match self.expand_block(template, block, ctx, depth) {
            Ok(text) => text,
            Err(err) => self.report(err, block.span.slice(template.source())),
        }
    }

    fn expand_block(
        &mut self,
        template: &Template,
        block: &Block,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> TemplateResult<String> {
        let Some(name) = block.call.name() else {
            return Err(TemplateError::Syntax {
                message: "block tag without a helper name".to_string(),
            });
        };
        if has_unbalanced(&block.call) {
            self.state.diagnostics.warn("unbalanced subexpression");
            return Ok(UNBALANCED_SUBEXPRESSION.to_string());
        }
        let next = self.descend(depth)?;
        let args = self.eval_args(&block.call, template, ctx, depth)?;

        let engine = self.engine;
        if let Some(helper) = engine.registry().block(name) {
            let view = ctx.clone();
            let mut body = BodyRenderer {
                renderer: self,
                template,
                block,
                ctx: ctx.clone(),
                depth: next,
            };
            return helper(&args, &view, &mut body).map_err(|e| TemplateError::helper(name, e));
        }

        match name {
            "if" => Ok(self.branch(template, block, args.primary().is_truthy(), ctx, next)),
            "unless" => Ok(self.branch(template, block, !args.primary().is_truthy(), ctx, next)),
            "each" => Ok(self.each(template, block, args.primary(), ctx, next)),
            "with" => {
                let target = args.primary();
                if !target.is_truthy() {
                    return Ok(self.branch(template, block, false, ctx, next));
                }
                let mut locals = target.as_map().cloned().unwrap_or_default();
                locals.insert("this".into(), target.clone());
                Ok(ctx.with_isolated_scope(locals, |scope| {
                    self.render_nodes(template, &block.body, scope, next)
                }))
            }
            "let" => Ok(ctx.with_scope(ValueMap::new(), |scope| {
                apply_let(&args, scope);
                self.render_nodes(template, &block.body, scope, next)
            })),
            "component" => {
                args.require(1)
                    .map_err(|e| TemplateError::helper(name, e))?;
                let fragment = template.fragment(block.body.clone());
                let definition = ComponentDefinition::new(&args.str_at(0), fragment, args.named.clone())?;
                let definition = self.state.components.define(definition);
                ctx.set_namespaced(COMPONENTS_NAMESPACE, &definition.usage_name, definition.summary());
                tracing::debug!(component = %definition.usage_name, "component defined");
                Ok(String::new())
            }
            _ => {
                if let Some(result) = logic::evaluate(name, &args) {
                    let truth = result.map_err(|e| TemplateError::helper(name, e))?;
                    return Ok(self.branch(template, block, truth, ctx, next));
                }
                if let Some(usage) = component_usage(name) {
                    let content = self.render_nodes(template, &block.body, ctx, next);
                    return self.invoke_component(usage, &args.named, ctx, depth, Some(content));
                }
                Err(TemplateError::UnknownBlock {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Render the body when `condition` holds, otherwise the `{{else}}`
    /// branch (or nothing).
    fn branch(
        &mut self,
        template: &Template,
        block: &Block,
        condition: bool,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> String {
        let nodes = if condition {
            Some(&block.body)
        } else {
            block.inverse.as_ref()
        };
        nodes.map_or_else(String::new, |nodes| {
            self.render_nodes(template, nodes, ctx, depth)
        })
    }

    fn each(
        &mut self,
        template: &Template,
        block: &Block,
        target: &TemplateValue,
        ctx: &mut TemplateContext,
        depth: usize,
    ) -> String {
        let entries: Vec<(Option<&String>, &TemplateValue)> = match target {
            TemplateValue::List(items) => items.iter().map(|item| (None, item)).collect(),
            TemplateValue::Map(map) => map.iter().map(|(k, v)| (Some(k), v)).collect(),
            _ => Vec::new(),
        };
        if entries.is_empty() {
            return self.branch(template, block, false, ctx, depth);
        }

        let last = entries.len() - 1;
        let mut out = String::new();
        for (index, (key, item)) in entries.into_iter().enumerate() {
            let mut locals = item.as_map().cloned().unwrap_or_default();
            locals.insert("this".into(), item.clone());
            locals.insert("@index".into(), index.into());
            locals.insert("@first".into(), (index == 0).into());
            locals.insert("@last".into(), (index == last).into());
            if let Some(key) = key {
                locals.insert("@key".into(), key.as_str().into());
            }
            let rendered = ctx.with_scope(locals, |scope| {
                self.render_nodes(template, &block.body, scope, depth)
            });
            out.push_str(&rendered);
        }
        out
    }
}

/// The body of a registered block helper invocation.
struct BodyRenderer<'r, 'e> {
    renderer: &'r mut Renderer<'e>,
    template: &'r Template,
    block: &'r Block,
    ctx: TemplateContext,
    depth: usize,
}

impl BlockBody for BodyRenderer<'_, '_> {
    fn render(&mut self, locals: ValueMap) -> HelperResult<String> {
        let (renderer, template, depth) = (&mut *self.renderer, self.template, self.depth);
        let nodes = &self.block.body;
        Ok(self.ctx.with_scope(locals, |scope| {
            renderer.render_nodes(template, nodes, scope, depth)
        }))
    }

    fn inverse(&mut self, locals: ValueMap) -> HelperResult<String> {
        let Some(nodes) = self.block.inverse.as_ref() else {
            return Ok(String::new());
        };
        let (renderer, template, depth) = (&mut *self.renderer, self.template, self.depth);
        Ok(self.ctx.with_scope(locals, |scope| {
            renderer.render_nodes(template, nodes, scope, depth)
        }))
    }

    fn has_inverse(&self) -> bool {
        self.block.inverse.is_some()
    }
}
