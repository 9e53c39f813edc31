/*
 * logic.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Logical and comparison helpers.
//!
//! The regular forms (`{{eq a b}}`) and the block forms
//! (`{{#eq a b}}...{{/eq}}`) both go through [`evaluate`], so they can never
//! disagree on the truth of the same arguments.

use std::cmp::Ordering;

use crate::args::HelperArgs;
use crate::error::HelperResult;

pub(crate) const NAMES: &[&str] = &["and", "or", "not", "eq", "ne", "gt", "gte", "lt", "lte"];

/// Truth value of a logical/comparison helper, or `None` if `name` is not one.
pub(crate) fn evaluate(name: &str, args: &HelperArgs) -> Option<HelperResult<bool>> {
    let result = match name {
        "and" => Ok(!args.is_empty() && args.positional.iter().all(|v| v.is_truthy())),
        "or" => Ok(args.positional.iter().any(|v| v.is_truthy())),
        "not" => Ok(!args.primary().is_truthy()),
        "eq" => binary(args).map(|()| args.get(0).loose_eq(args.get(1))),
        "ne" => binary(args).map(|()| !args.get(0).loose_eq(args.get(1))),
        "gt" => compare(args, |o| o == Ordering::Greater),
        "gte" => compare(args, |o| o != Ordering::Less),
        "lt" => compare(args, |o| o == Ordering::Less),
        "lte" => compare(args, |o| o != Ordering::Greater),
        _ => return None,
    };
    Some(result)
}

fn binary(args: &HelperArgs) -> HelperResult<()> {
    args.require(2)
}

fn compare(args: &HelperArgs, test: impl Fn(Ordering) -> bool) -> HelperResult<bool> {
    binary(args)?;
    // NaN on either side compares false
    Ok(args.get(0).loose_cmp(args.get(1)).is_some_and(test))
}
