/*
 * filter.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Auth-gated context filtering.
//!
//! Before a render, the framework context is filtered for the caller's auth
//! state in three steps:
//!
//! 1. capture the value at every path of the `alwaysAllow` list
//! 2. remove every path listed for the auth state (`withAuth` or
//!    `withoutAuth`)
//! 3. put the captured values back
//!
//! so an administrator can deny a whole subtree and still expose a small,
//! explicitly safe part of it.
//!
//! Paths are dot-separated. A segment may be an exact key, `*` (exactly one
//! level), `**` (any number of levels, including none) or a key glob such
//! as `smtp*` or `*pass`. Lists are transparent: a pattern applies to every
//! element of a list it meets. Only map keys are ever removed.

use crate::config::FilterLists;
use crate::value::TemplateValue;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Exact(String),
    Any,
    AnyDepth,
    Glob(String),
}

impl Segment {
    fn matches(&self, key: &str) -> bool {
        match self {
            Segment::Exact(k) => k == key,
            Segment::Any | Segment::AnyDepth => true,
            Segment::Glob(pattern) => wildcard_match(pattern, key),
        }
    }
}

/// A compiled dot-path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern; `None` for an empty one.
    pub fn parse(pattern: &str) -> Option<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return None;
        }
        let segments = trimmed
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "**" => Segment::AnyDepth,
                "*" => Segment::Any,
                s if s.contains('*') => Segment::Glob(s.to_string()),
                s => Segment::Exact(s.to_string()),
            })
            .collect::<Vec<_>>();
        if segments.is_empty() {
            return None;
        }
        Some(Self {
            source: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn compile(patterns: &[String]) -> Vec<PathPattern> {
    patterns.iter().filter_map(|p| PathPattern::parse(p)).collect()
}

/// Match `text` against a pattern where `*` stands for any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Key(String),
    Index(usize),
}

/// Compiled filter lists from the configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextFilter {
    with_auth: Vec<PathPattern>,
    without_auth: Vec<PathPattern>,
    always_allow: Vec<PathPattern>,
}

impl ContextFilter {
    pub fn new(lists: &FilterLists) -> Self {
        Self {
            with_auth: compile(&lists.with_auth),
            without_auth: compile(&lists.without_auth),
            always_allow: compile(&lists.always_allow),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.with_auth.is_empty() && self.without_auth.is_empty()
    }

    /// Filter a context for the given auth state, returning a new value.
    pub fn apply(&self, context: &TemplateValue, authenticated: bool) -> TemplateValue {
        let rules = if authenticated {
            &self.with_auth
        } else {
            &self.without_auth
        };
        if rules.is_empty() {
            return context.clone();
        }

        let mut captured = Vec::new();
        for pattern in &self.always_allow {
            collect(context, &pattern.segments, &mut Vec::new(), &mut captured);
        }

        let mut filtered = context.clone();
        for pattern in rules {
            remove(&mut filtered, &pattern.segments);
        }

        for (path, value) in captured {
            restore(&mut filtered, &path, value);
        }
        filtered
    }
}

fn collect(
    value: &TemplateValue,
    segments: &[Segment],
    path: &mut Vec<Step>,
    out: &mut Vec<(Vec<Step>, TemplateValue)>,
) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push((path.clone(), value.clone()));
        return;
    };

    match value {
        TemplateValue::List(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(Step::Index(i));
                collect(item, segments, path, out);
                path.pop();
            }
        }
        TemplateValue::Map(map) => {
            if *segment == Segment::AnyDepth && !rest.is_empty() {
                collect(value, rest, path, out);
            }
            for (key, child) in map {
                if !segment.matches(key) {
                    continue;
                }
                path.push(Step::Key(key.clone()));
                if *segment == Segment::AnyDepth && !rest.is_empty() {
                    collect(child, segments, path, out);
                } else {
                    collect(child, rest, path, out);
                }
                path.pop();
            }
        }
        _ => {}
    }
}

fn remove(value: &mut TemplateValue, segments: &[Segment]) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };

    if let TemplateValue::List(items) = value {
        for item in items {
            remove(item, segments);
        }
        return;
    }

    if *segment == Segment::AnyDepth && !rest.is_empty() {
        remove(value, rest);
        if let TemplateValue::Map(map) = value {
            for child in map.values_mut() {
                remove(child, segments);
            }
        }
        return;
    }

    let TemplateValue::Map(map) = value else {
        return;
    };
    if rest.is_empty() {
        map.retain(|key, _| !segment.matches(key));
    } else {
        for (key, child) in map.iter_mut() {
            if segment.matches(key) {
                remove(child, rest);
            }
        }
    }
}

fn restore(target: &mut TemplateValue, path: &[Step], value: TemplateValue) {
    let Some((step, rest)) = path.split_first() else {
        *target = value;
        return;
    };

    match step {
        Step::Index(i) => {
            if let TemplateValue::List(items) = target {
                if let Some(item) = items.get_mut(*i) {
                    restore(item, rest, value);
                }
            }
        }
        Step::Key(key) => {
            if !matches!(target, TemplateValue::Map(_)) {
                *target = TemplateValue::empty_map();
            }
            let TemplateValue::Map(map) = target else {
                return;
            };
            if rest.is_empty() {
                map.insert(key.clone(), value);
                return;
            }
            // A removed list cannot be rebuilt from individual elements
            let through_list = rest.iter().any(|s| matches!(s, Step::Index(_)));
            if through_list && !map.contains_key(key) {
                return;
            }
            let child = map
                .entry(key.clone())
                .or_insert_with(TemplateValue::empty_map);
            restore(child, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn filter(with_auth: &[&str], without_auth: &[&str], allow: &[&str]) -> ContextFilter {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        ContextFilter::new(&FilterLists {
            with_auth: strings(with_auth),
            without_auth: strings(without_auth),
            always_allow: strings(allow),
        })
    }

    fn v(value: serde_json::Value) -> TemplateValue {
        TemplateValue::from(value)
    }

    #[test]
    fn test_allow_list_wins_over_wildcard_removal() {
        let f = filter(&["a.*"], &[], &["a.b"]);
        let out = f.apply(&v(json!({"a": {"b": 1, "c": 2}})), true);
        assert_eq!(out, v(json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_allow_list_restores_inside_removed_subtree() {
        let f = filter(&[], &["config"], &["config.site.title"]);
        let ctx = v(json!({"config": {"site": {"title": "T", "secret": "s"}, "smtp": {}}, "x": 1}));
        assert_eq!(
            f.apply(&ctx, false),
            v(json!({"x": 1, "config": {"site": {"title": "T"}}}))
        );
    }

    #[test]
    fn test_auth_state_selects_rules() {
        let f = filter(&["admin"], &["user"], &[]);
        let ctx = v(json!({"admin": 1, "user": 2}));
        assert_eq!(f.apply(&ctx, true), v(json!({"user": 2})));
        assert_eq!(f.apply(&ctx, false), v(json!({"admin": 1})));
    }

    #[test]
    fn test_any_depth_and_globs() {
        let f = filter(&[], &["**.*pass*", "config.smtp*"], &[]);
        let ctx = v(json!({
            "password": "p",
            "config": {"smtpHost": "h", "smtp": {}, "db": {"dbPassword": "x", "passphrase": "y", "name": "n"}},
            "users": [{"name": "a", "passwd": "z"}]
        }));
        assert_eq!(
            f.apply(&ctx, false),
            // `**` also matches zero levels, and globs are case-sensitive
            v(json!({
                "config": {"db": {"dbPassword": "x", "name": "n"}},
                "users": [{"name": "a"}]
            }))
        );
    }

    #[test]
    fn test_filter_is_idempotent() {
        let f = filter(&[], &["a.*", "**.secret", "b"], &["a.keep", "b.public"]);
        let ctx = v(json!({
            "a": {"keep": 1, "drop": 2},
            "b": {"public": {"x": 1}, "private": 2},
            "c": {"secret": 3, "d": [{"secret": 4, "ok": 5}]}
        }));
        let once = f.apply(&ctx, false);
        let twice = f.apply(&once, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("smtp*", "smtpHost"));
        assert!(wildcard_match("*pass", "dbpass"));
        assert!(wildcard_match("*pa*ss*", "xpayssy"));
        assert!(!wildcard_match("*pass", "passwd"));
        assert!(wildcard_match("*", ""));
    }
}
