/*
 * expr.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression tokenizer and argument parser.
//!
//! Turns the inside of a tag (`helper arg1 key=val (sub arg)`) into a
//! [`Call`]. Quoted literals keep their whitespace, quotes and parentheses
//! intact; nested parentheses become [`Argument::Subexpression`] nodes, and an
//! unmatched parenthesis becomes [`Argument::Unbalanced`] instead of an error.
//!
//! [`coerce_bare`] implements the typing rules for bare tokens.

use crate::ast::{Argument, Call};
use crate::context::TemplateContext;
use crate::value::{TemplateValue, looks_numeric, parse_number};

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Word(String),
    Quoted(String),
    LParen,
    RParen,
    Assign,
    Space,
}

fn tokenize(input: &str) -> Vec<ExprToken> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                tokens.push(ExprToken::Space);
            }
            '"' | '\'' => {
                chars.next();
                let mut literal = String::new();
                while let Some(ch) = chars.next() {
                    if ch == '\\' {
                        match chars.next() {
                            Some(escaped) if escaped == c || escaped == '\\' => {
                                literal.push(escaped)
                            }
                            Some(other) => {
                                literal.push('\\');
                                literal.push(other);
                            }
                            None => literal.push('\\'),
                        }
                    } else if ch == c {
                        break;
                    } else {
                        literal.push(ch);
                    }
                }
                tokens.push(ExprToken::Quoted(literal));
            }
            '(' => {
                chars.next();
                tokens.push(ExprToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprToken::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(ExprToken::Assign);
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '=') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(ExprToken::Word(word));
            }
        }
    }
    tokens
}

struct ArgParser {
    tokens: Vec<ExprToken>,
    pos: usize,
}

impl ArgParser {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<ExprToken> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn skip_space(&mut self) {
        while self.peek() == Some(&ExprToken::Space) {
            self.pos += 1;
        }
    }

    /// Parse one call. `nested` calls end at their closing parenthesis;
    /// `Err(())` means the input ran out before it.
    fn parse_call(&mut self, nested: bool) -> Result<Call, ()> {
        self.skip_space();
        let head = match self.peek() {
            None => {
                return if nested {
                    Err(())
                } else {
                    Ok(empty_call())
                };
            }
            Some(ExprToken::RParen) if nested => {
                // `()` has no helper to call
                self.pos += 1;
                return Ok(Call {
                    head: Argument::Unbalanced,
                    positional: Vec::new(),
                    named: Vec::new(),
                });
            }
            Some(_) => self.parse_value(),
        };

        let mut call = Call {
            head,
            positional: Vec::new(),
            named: Vec::new(),
        };

        loop {
            self.skip_space();
            match self.peek() {
                None => {
                    return if nested { Err(()) } else { Ok(call) };
                }
                Some(ExprToken::RParen) => {
                    self.pos += 1;
                    if nested {
                        return Ok(call);
                    }
                    call.positional.push(Argument::Unbalanced);
                }
                Some(ExprToken::Word(key))
                    if self.tokens.get(self.pos + 1) == Some(&ExprToken::Assign) =>
                {
                    let key = key.clone();
                    self.pos += 2;
                    let value = match self.peek() {
                        None | Some(ExprToken::Space) | Some(ExprToken::RParen) => {
                            Argument::Quoted(String::new())
                        }
                        Some(_) => self.parse_value(),
                    };
                    call.named.push((key, value));
                }
                Some(_) => {
                    let value = self.parse_value();
                    call.positional.push(value);
                }
            }
        }
    }

    fn parse_value(&mut self) -> Argument {
        match self.next() {
            Some(ExprToken::Word(word)) => Argument::Bare(word),
            Some(ExprToken::Quoted(literal)) => Argument::Quoted(literal),
            Some(ExprToken::LParen) => match self.parse_call(true) {
                Ok(call) => Argument::Subexpression(Box::new(call)),
                Err(()) => Argument::Unbalanced,
            },
            Some(ExprToken::Assign) => Argument::Bare("=".to_string()),
            Some(ExprToken::RParen) => Argument::Unbalanced,
            Some(ExprToken::Space) | None => Argument::Quoted(String::new()),
        }
    }
}

fn empty_call() -> Call {
    Call {
        head: Argument::Bare(String::new()),
        positional: Vec::new(),
        named: Vec::new(),
    }
}

/// Parse the inside of a tag into a call.
///
/// Never fails: malformed nesting degrades to [`Argument::Unbalanced`]
/// arguments, which render as a visible marker.
pub fn parse_call(input: &str) -> Call {
    let mut parser = ArgParser {
        tokens: tokenize(input),
        pos: 0,
    };
    parser.parse_call(false).unwrap_or_else(|()| empty_call())
}

/// Type a bare (unquoted) token against the current context.
///
/// - `true`/`false` are booleans, `null`/`undefined` are null
/// - numeric-looking tokens are numbers
/// - tokens containing `/` or `\` are literal strings (file paths)
/// - dotted tokens are property paths only when their root segment names a
///   visible context key; otherwise they stay literal (so component names
///   like `icons.config-svg` survive)
/// - any other token is looked up in context, falling back to its own text
pub fn coerce_bare(token: &str, ctx: &TemplateContext) -> TemplateValue {
    match token {
        "true" => return TemplateValue::Bool(true),
        "false" => return TemplateValue::Bool(false),
        "null" | "undefined" => return TemplateValue::Null,
        _ => {}
    }

    if looks_numeric(token) {
        return TemplateValue::Number(parse_number(token));
    }

    if token.contains('/') || token.contains('\\') {
        return TemplateValue::String(token.to_string());
    }

    if token.contains('.') {
        let root = token.split('.').next().unwrap_or_default();
        return if ctx.contains(root) {
            ctx.lookup(token).cloned().unwrap_or_default()
        } else {
            TemplateValue::String(token.to_string())
        };
    }

    ctx.get(token)
        .cloned()
        .unwrap_or_else(|| TemplateValue::String(token.to_string()))
}

/// Resolve a bare token used as an expression by itself (`{{user.name}}`).
///
/// Unlike [`coerce_bare`], a missing property is null rather than literal
/// text, so an unknown name renders as nothing.
pub fn resolve_property(token: &str, ctx: &TemplateContext) -> Option<TemplateValue> {
    match token {
        "true" => return Some(TemplateValue::Bool(true)),
        "false" => return Some(TemplateValue::Bool(false)),
        "null" | "undefined" => return Some(TemplateValue::Null),
        _ => {}
    }
    if looks_numeric(token) {
        return Some(TemplateValue::Number(parse_number(token)));
    }
    ctx.lookup(token).cloned()
}
