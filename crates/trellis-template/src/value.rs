/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Native template values.
//!
//! Every expression evaluates to a [`TemplateValue`], and the value keeps its
//! type while it flows through nested expressions and block arguments. Only
//! the final output step turns a value into text (see [`TemplateValue::render`]).

use std::cmp::Ordering;

use indexmap::IndexMap;

/// Insertion-ordered map used for object values.
pub type ValueMap = IndexMap<String, TemplateValue>;

/// A value produced or consumed by template evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TemplateValue {
    /// A string value.
    String(String),

    /// A numeric value. Integers and floats share one representation.
    Number(f64),

    /// A boolean value.
    Bool(bool),

    /// A list of values.
    List(Vec<TemplateValue>),

    /// A map of string keys to values, in insertion order.
    Map(ValueMap),

    /// A null/missing value.
    #[default]
    Null,
}

impl TemplateValue {
    /// Create an empty map value.
    pub fn empty_map() -> Self {
        TemplateValue::Map(ValueMap::new())
    }

    /// Check if this value is "truthy" for conditional evaluation.
    ///
    /// - `false`, `0`, `NaN`, the empty string and null are falsy
    /// - empty lists and empty maps are falsy
    /// - everything else is truthy (including the string `"false"`)
    pub fn is_truthy(&self) -> bool {
        match self {
            TemplateValue::Bool(b) => *b,
            TemplateValue::String(s) => !s.is_empty(),
            TemplateValue::Number(n) => *n != 0.0 && !n.is_nan(),
            TemplateValue::List(items) => !items.is_empty(),
            TemplateValue::Map(m) => !m.is_empty(),
            TemplateValue::Null => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TemplateValue::Null)
    }

    /// Name of this value's type, for messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            TemplateValue::String(_) => "string",
            TemplateValue::Number(_) => "number",
            TemplateValue::Bool(_) => "boolean",
            TemplateValue::List(_) => "array",
            TemplateValue::Map(_) => "object",
            TemplateValue::Null => "null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            TemplateValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            TemplateValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TemplateValue]> {
        match self {
            TemplateValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get a nested field by path.
    ///
    /// Map segments are looked up by key; list segments must be numeric
    /// indices. For example `get_path(&["employees", "0", "name"])`.
    pub fn get_path(&self, path: &[&str]) -> Option<&TemplateValue> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };

        match self {
            TemplateValue::Map(m) => m.get(*first).and_then(|v| v.get_path(rest)),
            TemplateValue::List(items) => first
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .and_then(|v| v.get_path(rest)),
            _ => None,
        }
    }

    /// Numeric conversion with coercive semantics.
    ///
    /// Strings are trimmed and parsed (the empty string is `0`), booleans map
    /// to `0`/`1`, null is `0`, a one-element list converts its element, and
    /// anything else is `NaN`.
    pub fn to_number(&self) -> f64 {
        match self {
            TemplateValue::Number(n) => *n,
            TemplateValue::Bool(b) => f64::from(u8::from(*b)),
            TemplateValue::Null => 0.0,
            TemplateValue::String(s) => parse_number(s),
            TemplateValue::List(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            TemplateValue::Map(_) => f64::NAN,
        }
    }

    /// Primitive string conversion used by loose comparison.
    ///
    /// Lists join their elements with commas and maps become
    /// `[object Object]`, matching the coercions templates were written against.
    pub fn to_primitive_string(&self) -> String {
        match self {
            TemplateValue::List(items) => items
                .iter()
                .map(|v| match v {
                    TemplateValue::Null => String::new(),
                    other => other.to_primitive_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            TemplateValue::Map(_) => "[object Object]".to_string(),
            TemplateValue::Null => "null".to_string(),
            other => other.render(),
        }
    }

    /// Loose (coercive) equality.
    ///
    /// - null only equals null
    /// - a number compared with a string compares numerically
    /// - booleans are converted to `0`/`1` before comparing
    /// - lists and maps compare structurally with each other, and through
    ///   their primitive string form against scalars
    pub fn loose_eq(&self, other: &TemplateValue) -> bool {
        use TemplateValue::*;

        match (self, other) {
            (Null, Null) => true,
            (Null, _) | (_, Null) => false,
            (String(a), String(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (List(a), List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Bool(_), _) => Number(self.to_number()).loose_eq(other),
            (_, Bool(_)) => self.loose_eq(&Number(other.to_number())),
            (Number(a), String(_)) => *a == other.to_number(),
            (String(_), Number(b)) => self.to_number() == *b,
            (List(_) | Map(_), _) => String(self.to_primitive_string()).loose_eq(other),
            (_, List(_) | Map(_)) => self.loose_eq(&String(other.to_primitive_string())),
        }
    }

    /// Relational comparison with coercive semantics.
    ///
    /// Two strings compare lexicographically; any other pair compares
    /// numerically. Returns `None` when either side is `NaN`.
    pub fn loose_cmp(&self, other: &TemplateValue) -> Option<Ordering> {
        let a = self.to_primitive();
        let b = other.to_primitive();
        match (&a, &b) {
            (TemplateValue::String(x), TemplateValue::String(y)) => Some(x.cmp(y)),
            _ => a.to_number().partial_cmp(&b.to_number()),
        }
    }

    fn to_primitive(&self) -> TemplateValue {
        match self {
            TemplateValue::List(_) | TemplateValue::Map(_) => {
                TemplateValue::String(self.to_primitive_string())
            }
            other => other.clone(),
        }
    }

    /// Render this value as a string for output.
    ///
    /// - String: returned as-is
    /// - Number: shortest form, integral values without a fraction
    /// - Bool: `"true"` or `"false"`
    /// - List/Map: compact JSON
    /// - Null: `""`
    pub fn render(&self) -> String {
        match self {
            TemplateValue::String(s) => s.clone(),
            TemplateValue::Number(n) => format_number(*n),
            TemplateValue::Bool(b) => b.to_string(),
            TemplateValue::List(_) | TemplateValue::Map(_) => self.to_json().to_string(),
            TemplateValue::Null => String::new(),
        }
    }

    /// Convert to a JSON value. `NaN` and infinities become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TemplateValue::String(s) => serde_json::Value::String(s.clone()),
            TemplateValue::Number(n) => number_to_json(*n),
            TemplateValue::Bool(b) => serde_json::Value::Bool(*b),
            TemplateValue::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            TemplateValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            TemplateValue::Null => serde_json::Value::Null,
        }
    }
}

/// Format a number the way templates print it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Parse a string with coercive numeric semantics (`NaN` on failure).
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if looks_numeric(trimmed) {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    } else if trimmed == "Infinity" || trimmed == "+Infinity" {
        f64::INFINITY
    } else if trimmed == "-Infinity" {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

/// Whether a token is a plain decimal number (`12`, `-3.5`, `.5`, `1e3`).
///
/// Rust's float parser also accepts `inf` and `nan`; those are not numbers
/// in template syntax.
pub fn looks_numeric(token: &str) -> bool {
    let body = token.strip_prefix(['-', '+']).unwrap_or(token);
    let starts_ok = body
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.');
    starts_ok
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
        && body.parse::<f64>().is_ok()
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for TemplateValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TemplateValue::Null,
            serde_json::Value::Bool(b) => TemplateValue::Bool(b),
            serde_json::Value::Number(n) => TemplateValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => TemplateValue::String(s),
            serde_json::Value::Array(items) => {
                TemplateValue::List(items.into_iter().map(TemplateValue::from).collect())
            }
            serde_json::Value::Object(map) => TemplateValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, TemplateValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::String(s)
    }
}

impl From<f64> for TemplateValue {
    fn from(n: f64) -> Self {
        TemplateValue::Number(n)
    }
}

impl From<i64> for TemplateValue {
    fn from(n: i64) -> Self {
        TemplateValue::Number(n as f64)
    }
}

impl From<usize> for TemplateValue {
    fn from(n: usize) -> Self {
        TemplateValue::Number(n as f64)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Bool(b)
    }
}

impl From<Vec<TemplateValue>> for TemplateValue {
    fn from(items: Vec<TemplateValue>) -> Self {
        TemplateValue::List(items)
    }
}

impl From<ValueMap> for TemplateValue {
    fn from(map: ValueMap) -> Self {
        TemplateValue::Map(map)
    }
}

impl<T: Into<TemplateValue>> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TemplateValue::Null, Into::into)
    }
}
