/*
 * array.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `array.*` helpers.

use std::cmp::Ordering;

use chrono_tz::Tz;

use super::date;
use crate::args::HelperArgs;
use crate::error::HelperResult;
use crate::value::TemplateValue;

pub(crate) const NAMES: &[&str] = &[
    "array.at",
    "array.first",
    "array.last",
    "array.includes",
    "array.isEmpty",
    "array.join",
    "array.length",
    "array.concat",
    "array.reverse",
    "array.sort",
];

pub(crate) fn call(method: &str, args: &HelperArgs) -> Option<HelperResult<TemplateValue>> {
    let items = || as_items(args.primary());
    let value = match method {
        "at" => {
            let items = items();
            let index = args.number_at(1);
            if index.is_nan() {
                TemplateValue::Null
            } else {
                let index = index.trunc() as i64;
                let resolved = if index < 0 {
                    items.len() as i64 + index
                } else {
                    index
                };
                usize::try_from(resolved)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
        }
        "first" => take(items(), args.get(1), false),
        "last" => take(items(), args.get(1), true),
        "includes" => match args.primary() {
            TemplateValue::String(s) => s.contains(&args.str_at(1)).into(),
            _ => items().iter().any(|item| same_value(item, args.get(1))).into(),
        },
        "isEmpty" => match args.primary() {
            TemplateValue::Null => true,
            TemplateValue::String(s) => s.is_empty(),
            TemplateValue::List(items) => items.is_empty(),
            TemplateValue::Map(map) => map.is_empty(),
            _ => false,
        }
        .into(),
        "join" => {
            let separator = match args.get(1) {
                TemplateValue::Null => ",".to_string(),
                sep => sep.render(),
            };
            items()
                .iter()
                .map(TemplateValue::render)
                .collect::<Vec<_>>()
                .join(&separator)
                .into()
        }
        "length" => match args.primary() {
            TemplateValue::String(s) => s.chars().count().into(),
            TemplateValue::Map(map) => map.len().into(),
            other => as_items(other).len().into(),
        },
        "concat" => {
            let mut out = Vec::new();
            for value in &args.positional {
                match value {
                    TemplateValue::List(items) => out.extend(items.iter().cloned()),
                    TemplateValue::Null => {}
                    other => out.push(other.clone()),
                }
            }
            TemplateValue::List(out)
        }
        "reverse" => {
            let mut items = items();
            items.reverse();
            TemplateValue::List(items)
        }
        "sort" => TemplateValue::List(sort(items(), args)),
        _ => return None,
    };
    Some(Ok(value))
}

/// The elements of a list; null is empty and any other value is a
/// one-element list.
fn as_items(value: &TemplateValue) -> Vec<TemplateValue> {
    match value {
        TemplateValue::List(items) => items.clone(),
        TemplateValue::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Strict equality, except that all NaNs are equal.
fn same_value(a: &TemplateValue, b: &TemplateValue) -> bool {
    match (a, b) {
        (TemplateValue::Number(x), TemplateValue::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

/// First/last element, or the first/last `count` elements as a list.
fn take(items: Vec<TemplateValue>, count: &TemplateValue, from_end: bool) -> TemplateValue {
    if count.is_null() {
        let item = if from_end { items.last() } else { items.first() };
        return item.cloned().unwrap_or_default();
    }
    let n = count.to_number();
    let n = if n.is_finite() && n > 0.0 {
        (n as usize).min(items.len())
    } else {
        0
    };
    let slice = if from_end {
        &items[items.len() - n..]
    } else {
        &items[..n]
    };
    TemplateValue::List(slice.to_vec())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortAs {
    Auto,
    Number,
    String,
    Date,
}

/// Stable sort with optional `sortBy` (dotted key), `sortAs`
/// (`number`, `string`, `date`) and `reverse`. Null and missing keys always
/// sort last, also when reversed.
fn sort(mut items: Vec<TemplateValue>, args: &HelperArgs) -> Vec<TemplateValue> {
    let sort_by = args.named_str("sortBy");
    let path: Vec<&str> = sort_by
        .as_deref()
        .map(|p| p.split('.').collect())
        .unwrap_or_default();
    let sort_as = match args.named_str("sortAs").as_deref() {
        Some("number") => SortAs::Number,
        Some("string") => SortAs::String,
        Some("date") => SortAs::Date,
        Some(other) => {
            tracing::warn!(helper = "array.sort", sort_as = other, "unknown sortAs, comparing values as-is");
            SortAs::Auto
        }
        None => SortAs::Auto,
    };
    let reverse = args.named_flag("reverse");

    let key = |item: &TemplateValue| -> Option<SortKey> {
        let value = item.get_path(&path)?;
        SortKey::new(value, sort_as)
    };

    items.sort_by(|a, b| match (key(a), key(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ordering = x.cmp(&y);
            if reverse { ordering.reverse() } else { ordering }
        }
    });
    items
}

#[derive(Debug, PartialEq)]
enum SortKey {
    Number(f64),
    Text(String),
    Value(TemplateValue),
}

impl SortKey {
    fn new(value: &TemplateValue, sort_as: SortAs) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        let key = match sort_as {
            SortAs::Number => {
                let n = value.to_number();
                if n.is_nan() {
                    return None;
                }
                SortKey::Number(n)
            }
            SortAs::String => SortKey::Text(value.render()),
            SortAs::Date => SortKey::Number(date::instant(value, Tz::UTC)?.timestamp_millis() as f64),
            SortAs::Auto => SortKey::Value(value.clone()),
        };
        Some(key)
    }

    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Value(a), SortKey::Value(b)) => match (a, b) {
                (TemplateValue::Number(x), TemplateValue::Number(y)) => x.total_cmp(y),
                (TemplateValue::String(x), TemplateValue::String(y)) => x.cmp(y),
                // numbers before strings before everything else
                _ => rank(a).cmp(&rank(b)).then_with(|| {
                    a.loose_cmp(b).unwrap_or(Ordering::Equal)
                }),
            },
            _ => Ordering::Equal,
        }
    }
}

fn rank(value: &TemplateValue) -> u8 {
    match value {
        TemplateValue::Number(_) => 0,
        TemplateValue::Bool(_) => 1,
        TemplateValue::String(_) => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(value: serde_json::Value) -> TemplateValue {
        TemplateValue::from(value)
    }

    fn run(method: &str, args: HelperArgs) -> TemplateValue {
        call(method, &args).unwrap().unwrap()
    }

    #[test]
    fn test_access() {
        let xs = list(json!([1, 2, 3]));
        assert_eq!(run("at", HelperArgs::new("array.at").arg(xs.clone()).arg(-1.0)), 3.0.into());
        assert_eq!(run("at", HelperArgs::new("array.at").arg(xs.clone()).arg(5.0)), TemplateValue::Null);
        assert_eq!(run("first", HelperArgs::new("array.first").arg(xs.clone())), 1.0.into());
        assert_eq!(
            run("last", HelperArgs::new("array.last").arg(xs.clone()).arg(2.0)),
            list(json!([2, 3]))
        );
        assert_eq!(run("length", HelperArgs::new("array.length").arg(xs.clone())), 3usize.into());
        assert_eq!(run("join", HelperArgs::new("array.join").arg(xs).arg(" | ")), "1 | 2 | 3".into());
    }

    #[test]
    fn test_includes_is_strict() {
        let xs = list(json!([1, "2"]));
        assert_eq!(run("includes", HelperArgs::new("array.includes").arg(xs.clone()).arg(1.0)), true.into());
        assert_eq!(run("includes", HelperArgs::new("array.includes").arg(xs).arg(2.0)), false.into());
    }

    #[test]
    fn test_is_empty_and_concat() {
        assert_eq!(run("isEmpty", HelperArgs::new("array.isEmpty").arg(list(json!({})))), true.into());
        assert_eq!(run("isEmpty", HelperArgs::new("array.isEmpty").arg(list(json!([0])))), false.into());
        assert_eq!(
            run(
                "concat",
                HelperArgs::new("array.concat").arg(list(json!([1]))).arg(2.0).arg(list(json!([3, 4])))
            ),
            list(json!([1, 2, 3, 4]))
        );
    }

    #[test]
    fn test_sort_numbers_keeps_type() {
        let args = HelperArgs::new("array.sort")
            .arg(list(json!(["10", "9", null, "1"])))
            .with("sortAs", "number");
        assert_eq!(run("sort", args), list(json!(["1", "9", "10", null])));

        let args = HelperArgs::new("array.sort").arg(list(json!([3, 1, 2])));
        assert_eq!(run("sort", args), list(json!([1, 2, 3])));
    }

    #[test]
    fn test_sort_by_key_reverse_nulls_last_and_stable() {
        let people = list(json!([
            {"name": "b", "age": 30},
            {"name": "a"},
            {"name": "c", "age": 40},
            {"name": "d", "age": 30}
        ]));
        let args = HelperArgs::new("array.sort")
            .arg(people)
            .with("sortBy", "age")
            .with("reverse", true);
        let names: Vec<String> = run("sort", args)
            .as_list()
            .unwrap()
            .iter()
            .map(|p| p.get_path(&["name"]).unwrap().render())
            .collect();
        assert_eq!(names, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_sort_dates() {
        let args = HelperArgs::new("array.sort")
            .arg(list(json!(["2025-02-01", "2024-12-31T23:00:00Z", "2025-01-15"])))
            .with("sortAs", "date");
        assert_eq!(
            run("sort", args),
            list(json!(["2024-12-31T23:00:00Z", "2025-01-15", "2025-02-01"]))
        );
    }
}
