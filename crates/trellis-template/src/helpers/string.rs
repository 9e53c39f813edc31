/*
 * string.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `string.*` helpers.
//!
//! Single-subject helpers (`lowercase`, `slugify`, `htmlEscape`, ...)
//! concatenate all positional arguments first, so
//! `{{string.uppercase user.first " " user.last}}` works without a
//! nested `string.concat`.

use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;

use crate::args::HelperArgs;
use crate::error::HelperResult;
use crate::value::TemplateValue;

pub(crate) const NAMES: &[&str] = &[
    "string.concat",
    "string.default",
    "string.replace",
    "string.substring",
    "string.padLeft",
    "string.padRight",
    "string.startsWith",
    "string.endsWith",
    "string.contains",
    "string.length",
    "string.lowercase",
    "string.uppercase",
    "string.titlecase",
    "string.slugify",
    "string.urlEncode",
    "string.urlDecode",
    "string.htmlEscape",
    "string.htmlToText",
    "string.htmlToMd",
];

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Words kept lowercase by `titlecase` unless first or last.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "nor", "of", "on", "or",
    "per", "the", "to", "via", "vs",
];

pub(crate) fn call(method: &str, args: &HelperArgs) -> Option<HelperResult<TemplateValue>> {
    let text = || args.concat_positional();
    let value: TemplateValue = match method {
        "concat" => text().into(),
        "default" => default_value(args),
        "replace" => {
            if let Err(e) = args.require(2) {
                return Some(Err(e));
            }
            let subject = args.str_at(0);
            let search = args.str_at(1);
            if search.is_empty() {
                subject.into()
            } else {
                subject.replace(&search, &args.str_at(2)).into()
            }
        }
        "substring" => substring(args).into(),
        "padLeft" => pad(args, true).into(),
        "padRight" => pad(args, false).into(),
        "startsWith" => args.str_at(0).starts_with(&args.str_at(1)).into(),
        "endsWith" => args.str_at(0).ends_with(&args.str_at(1)).into(),
        "contains" => args.str_at(0).contains(&args.str_at(1)).into(),
        "length" => text().chars().count().into(),
        "lowercase" => text().to_lowercase().into(),
        "uppercase" => text().to_uppercase().into(),
        "titlecase" => titlecase(&text()).into(),
        "slugify" => slugify(&text()).into(),
        "urlEncode" => utf8_percent_encode(&text(), URI_COMPONENT).to_string().into(),
        "urlDecode" => {
            let input = text();
            match percent_decode_str(&input).decode_utf8() {
                Ok(decoded) => decoded.into_owned().into(),
                Err(e) => {
                    tracing::warn!(helper = "string.urlDecode", error = %e, "invalid percent-encoding");
                    input.into()
                }
            }
        }
        "htmlEscape" => html_escape::encode_safe(&text()).into_owned().into(),
        "htmlToText" => html_to_text(&text()).into(),
        "htmlToMd" => html_to_markdown(&text()).into(),
        _ => return None,
    };
    Some(Ok(value))
}

/// First argument that is neither null nor the empty string; otherwise the
/// last argument.
fn default_value(args: &HelperArgs) -> TemplateValue {
    args.positional
        .iter()
        .find(|v| !v.is_null() && v.as_str() != Some(""))
        .or(args.positional.last())
        .cloned()
        .unwrap_or_default()
}

/// `substring(start, end)` over characters. Negative or NaN bounds count as
/// `0`, and the bounds are swapped when `start > end`.
fn substring(args: &HelperArgs) -> String {
    let chars: Vec<char> = args.str_at(0).chars().collect();
    let clamp = |v: &TemplateValue| {
        let n = v.to_number();
        if n.is_nan() || n < 0.0 {
            0
        } else {
            (n as usize).min(chars.len())
        }
    };
    let start = clamp(args.get(1));
    let end = match args.get(2) {
        TemplateValue::Null => chars.len(),
        v => clamp(v),
    };
    let (from, to) = if start > end { (end, start) } else { (start, end) };
    chars[from..to].iter().collect()
}

/// Widest result `padLeft`/`padRight` will produce, in characters.
pub(crate) const MAX_PAD_WIDTH: usize = 4096;

fn pad(args: &HelperArgs, left: bool) -> String {
    let subject = args.str_at(0);
    let width = args.number_at(1);
    let mut width = if width.is_finite() && width > 0.0 { width as usize } else { 0 };
    if width > MAX_PAD_WIDTH {
        tracing::warn!(helper = %args.name, width, max = MAX_PAD_WIDTH, "pad width clamped");
        width = MAX_PAD_WIDTH;
    }
    let fill: Vec<char> = match args.get(2) {
        TemplateValue::Null => vec![' '],
        v => v.render().chars().collect(),
    };
    let length = subject.chars().count();
    if length >= width || fill.is_empty() {
        return subject;
    }
    let padding: String = fill.iter().cycle().take(width - length).collect();
    if left {
        padding + &subject
    } else {
        subject + &padding
    }
}

fn titlecase(input: &str) -> String {
    let words: Vec<&str> = input.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_lowercase();
            if i != 0 && i != last && SMALL_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(&lower)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").unwrap());

fn slugify(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&lower, "");
    let dashed = SLUG_SEPARATORS.replace_all(&stripped, "-");
    dashed.trim_matches('-').to_string()
}

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(p|div|h[1-6]|li|tr|blockquote|pre)>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n(\s*\n)+").unwrap());
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = BLOCK_END.replace_all(&text, "\n\n");
    finish_plain(&text)
}

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]>").unwrap());
static STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(strong|b)\b[^>]*>(.*?)</(strong|b)>").unwrap());
static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(em|i)\b[^>]*>(.*?)</(em|i)>").unwrap());
static CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<code\b[^>]*>(.*?)</code>").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*\bhref\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).unwrap()
});
static IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*\bsrc\s*=\s*["']([^"']*)["'][^>]*?(?:\balt\s*=\s*["']([^"']*)["'])?[^>]*>"#)
        .unwrap()
});
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").unwrap());

fn html_to_markdown(html: &str) -> String {
    let md = SCRIPT_STYLE.replace_all(html, "");
    let md = HEADING.replace_all(&md, |caps: &regex::Captures<'_>| {
        let level = caps[1].parse::<usize>().unwrap_or(1);
        format!("\n\n{} {}\n\n", "#".repeat(level), caps[2].trim())
    });
    let md = STRONG.replace_all(&md, "**$2**");
    let md = EMPHASIS.replace_all(&md, "*$2*");
    let md = CODE.replace_all(&md, "`$1`");
    let md = LINK.replace_all(&md, "[$2]($1)");
    let md = IMAGE.replace_all(&md, "![$2]($1)");
    let md = LIST_ITEM.replace_all(&md, "\n- ");
    let md = LINE_BREAK.replace_all(&md, "  \n");
    let md = BLOCK_END.replace_all(&md, "\n\n");
    finish_plain(&md)
}

/// Strip remaining tags, decode entities and normalize whitespace.
fn finish_plain(text: &str) -> String {
    let text = ANY_TAG.replace_all(text, "");
    let text = html_escape::decode_html_entities(&text);
    let text = SPACE_RUN.replace_all(&text, " ");
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let text = lines.join("\n");
    BLANK_RUN.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(method: &str, values: &[&str]) -> TemplateValue {
        let mut args = HelperArgs::new(format!("string.{method}"));
        args.positional = values.iter().map(|v| TemplateValue::from(*v)).collect();
        call(method, &args).unwrap().unwrap()
    }

    #[test]
    fn test_concat_and_case() {
        assert_eq!(run("concat", &["a", "b", "c"]), "abc".into());
        assert_eq!(run("uppercase", &["ab", "cd"]), "ABCD".into());
        assert_eq!(
            run("titlecase", &["the lord of the rings"]),
            "The Lord of the Rings".into()
        );
    }

    #[test]
    fn test_default() {
        let args = HelperArgs::new("string.default")
            .arg(TemplateValue::Null)
            .arg("")
            .arg("Guest");
        assert_eq!(call("default", &args).unwrap().unwrap(), "Guest".into());
        let args = HelperArgs::new("string.default").arg(0.0).arg("x");
        assert_eq!(call("default", &args).unwrap().unwrap(), 0.0.into());
    }

    #[test]
    fn test_substring_and_padding() {
        let args = HelperArgs::new("string.substring").arg("hello").arg(3.0).arg(1.0);
        assert_eq!(call("substring", &args).unwrap().unwrap(), "el".into());
        let args = HelperArgs::new("string.padLeft").arg("7").arg(3.0).arg("0");
        assert_eq!(call("padLeft", &args).unwrap().unwrap(), "007".into());
        let args = HelperArgs::new("string.padRight").arg("ab").arg(4.0);
        assert_eq!(call("padRight", &args).unwrap().unwrap(), "ab  ".into());
    }

    #[test]
    fn test_pad_width_is_clamped() {
        let args = HelperArgs::new("string.padLeft").arg("x").arg(5e7).arg("ab");
        let padded = call("padLeft", &args).unwrap().unwrap().render();
        assert_eq!(padded.chars().count(), MAX_PAD_WIDTH);
        assert!(padded.ends_with('x'));

        let args = HelperArgs::new("string.padRight").arg("x").arg(1e300);
        let padded = call("padRight", &args).unwrap().unwrap().render();
        assert_eq!(padded.len(), MAX_PAD_WIDTH);

        let long = "y".repeat(MAX_PAD_WIDTH + 10);
        let args = HelperArgs::new("string.padLeft").arg(long.as_str()).arg(1e9);
        assert_eq!(call("padLeft", &args).unwrap().unwrap().render(), long);
    }

    #[test]
    fn test_predicates_return_booleans() {
        assert_eq!(run("startsWith", &["hello", "he"]), true.into());
        assert_eq!(run("contains", &["hello", "xyz"]), false.into());
        assert_eq!(run("length", &["héllo"]), 5usize.into());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(run("slugify", &["  Hello, World!  Rust_lang "]), "hello-world-rust-lang".into());
    }

    #[test]
    fn test_url_round_trip() {
        assert_eq!(run("urlEncode", &["a b&c/d"]), "a%20b%26c%2Fd".into());
        assert_eq!(run("urlDecode", &["a%20b%26c"]), "a b&c".into());
    }

    #[test]
    fn test_html_helpers() {
        assert_eq!(
            run("htmlEscape", &["<a href=\"x\">"]),
            "&lt;a href=&quot;x&quot;&gt;".into()
        );
        assert_eq!(
            run("htmlToText", &["<p>Hello <b>World</b></p><p>Bye&amp;ciao</p><script>x()</script>"]),
            "Hello World\n\nBye&ciao".into()
        );
        assert_eq!(
            run("htmlToMd", &["<h2>Title</h2><p>Read <a href=\"/docs\">the <em>docs</em></a></p>"]),
            "## Title\n\nRead [the *docs*](/docs)".into()
        );
    }
}
