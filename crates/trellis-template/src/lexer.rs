/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template tokenizer.
//!
//! Splits template source into literal text and `{{...}}` tags. Comments are
//! removed up front by [`strip_comments`]; the lexer itself never fails, an
//! unterminated tag becomes an [`TokenKind::Unterminated`] token.

use std::borrow::Cow;

use crate::ast::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Literal text (escapes already applied).
    Text(String),
    /// `{{#inner}}`
    Open(String),
    /// `{{/name}}`
    Close(String),
    /// `{{else}}`
    Else,
    /// `{{inner}}`
    Expression(String),
    /// `{{` with no closing `}}`.
    Unterminated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Remove `{{!-- ... --}}` and `{{! ... }}` comments.
///
/// An unterminated comment is left in place as text.
pub fn strip_comments(source: &str) -> Cow<'_, str> {
    if !source.contains("{{!") {
        return Cow::Borrowed(source);
    }

    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{!") {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let end = if after.starts_with("{{!--") {
            after[5..].find("--}}").map(|i| 5 + i + 4)
        } else {
            after[3..].find("}}").map(|i| 3 + i + 2)
        };
        match end {
            Some(end) => rest = &after[end..],
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Tokenize comment-free template source.
pub fn tokenize(source: &str) -> Vec<Token> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut text_start = 0;
    let mut chunk_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && source[i..].starts_with("\\{{") {
            text.push_str(&source[chunk_start..i]);
            text.push_str("{{");
            i += 3;
            chunk_start = i;
            continue;
        }

        if bytes[i] == b'{' && source[i..].starts_with("{{") {
            text.push_str(&source[chunk_start..i]);
            if !text.is_empty() {
                tokens.push(Token {
                    kind: TokenKind::Text(std::mem::take(&mut text)),
                    span: Span::new(text_start, i),
                });
            }

            match find_tag_end(source, i + 2) {
                Ok(close) => {
                    let inner = source[i + 2..close].trim();
                    tokens.push(Token {
                        kind: classify(inner),
                        span: Span::new(i, close + 2),
                    });
                    i = close + 2;
                }
                Err(resume) => {
                    tokens.push(Token {
                        kind: TokenKind::Unterminated,
                        span: Span::new(i, resume),
                    });
                    tokens.push(Token {
                        kind: TokenKind::Text(source[i..resume].to_string()),
                        span: Span::new(i, resume),
                    });
                    i = resume;
                }
            }
            chunk_start = i;
            text_start = i;
            continue;
        }

        i += 1;
    }

    text.push_str(&source[chunk_start..]);
    if !text.is_empty() {
        tokens.push(Token {
            kind: TokenKind::Text(text),
            span: Span::new(text_start, source.len()),
        });
    }
    tokens
}

fn classify(inner: &str) -> TokenKind {
    if let Some(rest) = inner.strip_prefix('#') {
        TokenKind::Open(rest.trim().to_string())
    } else if let Some(rest) = inner.strip_prefix('/') {
        TokenKind::Close(rest.trim().to_string())
    } else if inner == "else" {
        TokenKind::Else
    } else {
        TokenKind::Expression(inner.to_string())
    }
}

/// Find the byte offset of the `}}` closing a tag whose content starts at
/// `from`. `}}` inside a quoted argument does not close the tag.
///
/// On failure returns the offset where lexing should resume: the next `{{`,
/// or the end of the source.
fn find_tag_end(source: &str, from: usize) -> Result<usize, usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'\'' {
                    quote = Some(b);
                } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
                    return Ok(i);
                } else if b == b'{' && bytes.get(i + 1) == Some(&b'{') {
                    // A new tag starts before this one closed
                    return Err(i);
                }
            }
        }
        i += 1;
    }

    // An unbalanced quote must not swallow the rest of the template; fall
    // back to the first plain `}}`.
    if quote.is_some() {
        if let Some(p) = source[from..].find("}}") {
            return Ok(from + p);
        }
    }
    Err(source[from..].find("{{").map_or(source.len(), |p| from + p))
}
