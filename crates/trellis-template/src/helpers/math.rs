/*
 * math.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `math.*` helpers.
//!
//! Non-numeric input and division by zero are data errors: they are logged
//! and yield `0` instead of failing the expression.

use crate::args::HelperArgs;
use crate::error::HelperResult;
use crate::value::TemplateValue;

pub(crate) const NAMES: &[&str] = &[
    "math.add",
    "math.subtract",
    "math.multiply",
    "math.divide",
    "math.min",
    "math.max",
    "math.mod",
    "math.round",
    "math.floor",
    "math.ceil",
];

pub(crate) fn call(method: &str, args: &HelperArgs) -> Option<HelperResult<TemplateValue>> {
    let numbers = || operands(args);
    let result = match method {
        "add" => numbers().iter().sum::<f64>(),
        "subtract" => fold_first(&numbers(), |a, b| a - b),
        "multiply" => fold_first(&numbers(), |a, b| a * b),
        "divide" => {
            let values = numbers();
            let (first, rest) = match values.split_first() {
                Some(split) => split,
                None => return Some(Ok(0.0.into())),
            };
            let mut quotient = *first;
            for divisor in rest {
                if *divisor == 0.0 {
                    tracing::warn!(helper = "math.divide", "division by zero, returning 0");
                    return Some(Ok(0.0.into()));
                }
                quotient /= divisor;
            }
            quotient
        }
        "min" => numbers().into_iter().reduce(f64::min).unwrap_or(0.0),
        "max" => numbers().into_iter().reduce(f64::max).unwrap_or(0.0),
        "mod" => {
            if let Err(e) = args.require(2) {
                return Some(Err(e));
            }
            let values = numbers();
            if values[1] == 0.0 {
                tracing::warn!(helper = "math.mod", "modulo by zero, returning 0");
                0.0
            } else {
                values[0] % values[1]
            }
        }
        "round" => {
            let value = numbers().first().copied().unwrap_or(0.0);
            let precision = args
                .named("precision")
                .map(|p| p.to_number())
                .filter(|p| p.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 15.0);
            round_half_up(value, precision as i32)
        }
        "floor" => numbers().first().copied().unwrap_or(0.0).floor(),
        "ceil" => numbers().first().copied().unwrap_or(0.0).ceil(),
        _ => return None,
    };
    Some(Ok(TemplateValue::Number(result)))
}

/// Positional arguments as numbers; anything non-numeric counts as `0`.
fn operands(args: &HelperArgs) -> Vec<f64> {
    args.positional
        .iter()
        .map(|v| {
            let n = v.to_number();
            if n.is_nan() {
                tracing::warn!(
                    helper = %args.name,
                    value = %v.render(),
                    "non-numeric argument, using 0"
                );
                0.0
            } else {
                n
            }
        })
        .collect()
}

fn fold_first(values: &[f64], op: impl Fn(f64, f64) -> f64) -> f64 {
    values.iter().copied().reduce(op).unwrap_or(0.0)
}

/// Round half toward positive infinity (`2.5 -> 3`, `-2.5 -> -2`).
fn round_half_up(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor + 0.5).floor() / factor
}
