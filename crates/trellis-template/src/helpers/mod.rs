/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The built-in helper library.
//!
//! Helper names follow a `namespace.method` convention (`math.add`,
//! `string.replace`); the logical and comparison helpers are unqualified.
//! Every helper returns a native [`TemplateValue`], so results compose
//! inside nested subexpressions without losing their type.

mod array;
mod date;
mod file;
mod json;
pub(crate) mod logic;
mod math;
mod string;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::args::HelperArgs;
use crate::config::ConfigSnapshot;
use crate::context::TemplateContext;
use crate::error::HelperResult;
use crate::files::FileCache;
use crate::resolver::ModuleResolver;
use crate::value::TemplateValue;

/// Forms the renderer handles itself rather than through [`call_builtin`].
const SPECIAL_FORMS: &[&str] = &["if", "unless", "each", "with", "let", "component"];

/// Every built-in helper name, in catalog order.
pub static BUILTIN_NAMES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    [
        logic::NAMES,
        math::NAMES,
        string::NAMES,
        array::NAMES,
        date::NAMES,
        json::NAMES,
        file::NAMES,
        SPECIAL_FORMS,
    ]
    .concat()
});

/// What a built-in helper may read besides its arguments.
pub(crate) struct HelperEnv<'a> {
    pub ctx: &'a TemplateContext,
    pub config: &'a ConfigSnapshot,
    pub files: &'a dyn FileCache,
    pub resolver: &'a dyn ModuleResolver,
    /// Clock reading for the whole render, so `date.now` is stable within it.
    pub now: DateTime<Utc>,
}

/// Call a built-in value helper. `None` means no built-in has this name.
pub(crate) fn call_builtin(
    name: &str,
    args: &HelperArgs,
    env: &HelperEnv<'_>,
) -> Option<HelperResult<TemplateValue>> {
    let Some((namespace, method)) = name.split_once('.') else {
        return logic::evaluate(name, args).map(|r| r.map(TemplateValue::Bool));
    };
    match namespace {
        "math" => math::call(method, args),
        "string" => string::call(method, args),
        "array" => array::call(method, args),
        "date" => date::call(method, args, env),
        "json" => json::call(method, args),
        "file" => file::call(method, args, env),
        _ => None,
    }
}
