/*
 * json.rs
 * Copyright (c) 2025 Posit, PBC
 */

use crate::args::HelperArgs;
use crate::error::HelperResult;
use crate::value::TemplateValue;

pub(crate) const NAMES: &[&str] = &["json.parse", "json.stringify"];

pub(crate) fn call(method: &str, args: &HelperArgs) -> Option<HelperResult<TemplateValue>> {
    let value = match method {
        "parse" => parse(args.primary()),
        "stringify" => {
            let json = args.primary().to_json();
            let text = if args.named_flag("pretty") {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            text.unwrap_or_default().into()
        }
        _ => return None,
    };
    Some(Ok(value))
}

/// Parse a JSON string. Non-string input passes through unchanged, and
/// invalid JSON is null.
fn parse(input: &TemplateValue) -> TemplateValue {
    let TemplateValue::String(text) = input else {
        return input.clone();
    };
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => json.into(),
        Err(e) => {
            tracing::warn!(helper = "json.parse", error = %e, "invalid JSON, returning null");
            TemplateValue::Null
        }
    }
}
