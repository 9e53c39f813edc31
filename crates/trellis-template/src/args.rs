/*
 * args.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Evaluated helper arguments.

use indexmap::IndexMap;

use crate::error::{HelperError, HelperResult};
use crate::value::TemplateValue;

/// A parsed and fully evaluated argument set for one helper call.
///
/// The first positional argument is the call's primary target: the subject
/// of single-argument helpers such as `file.exists` or `component`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelperArgs {
    pub name: String,
    pub positional: Vec<TemplateValue>,
    pub named: IndexMap<String, TemplateValue>,
}

impl HelperArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style positional argument, mostly for tests and embedders.
    pub fn arg(mut self, value: impl Into<TemplateValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Builder-style named argument.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TemplateValue>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    /// The primary target (first positional argument), or null.
    pub fn primary(&self) -> &TemplateValue {
        self.get(0)
    }

    /// Positional argument `index`, or null when absent.
    pub fn get(&self, index: usize) -> &TemplateValue {
        const NULL: &TemplateValue = &TemplateValue::Null;
        self.positional.get(index).unwrap_or(NULL)
    }

    pub fn named(&self, key: &str) -> Option<&TemplateValue> {
        self.named.get(key)
    }

    /// Named argument as a string, if present and not null.
    pub fn named_str(&self, key: &str) -> Option<String> {
        self.named
            .get(key)
            .filter(|v| !v.is_null())
            .map(TemplateValue::render)
    }

    /// Named argument as a boolean (`"true"` counts, like the bare keyword).
    pub fn named_flag(&self, key: &str) -> bool {
        match self.named.get(key) {
            Some(TemplateValue::String(s)) => s == "true",
            Some(other) => other.is_truthy(),
            None => false,
        }
    }

    /// Positional argument `index` rendered as a string (null is `""`).
    pub fn str_at(&self, index: usize) -> String {
        self.get(index).render()
    }

    pub fn number_at(&self, index: usize) -> f64 {
        self.get(index).to_number()
    }

    /// All positional arguments rendered and concatenated.
    pub fn concat_positional(&self) -> String {
        self.positional.iter().map(TemplateValue::render).collect()
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Fail unless at least `min` positional arguments were given.
    pub fn require(&self, min: usize) -> HelperResult<()> {
        if self.positional.len() < min {
            return Err(HelperError::InvalidArguments(format!(
                "{} expects at least {} argument{}, got {}",
                self.name,
                min,
                if min == 1 { "" } else { "s" },
                self.positional.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_arguments_are_null() {
        let args = HelperArgs::new("x").arg("a");
        assert_eq!(args.primary(), &TemplateValue::from("a"));
        assert!(args.get(3).is_null());
        assert_eq!(args.str_at(3), "");
    }

    #[test]
    fn test_named_flag() {
        let args = HelperArgs::new("x")
            .with("pretty", "true")
            .with("reverse", false)
            .with("style", "short");
        assert!(args.named_flag("pretty"));
        assert!(!args.named_flag("reverse"));
        assert!(!args.named_flag("style"));
        assert!(!args.named_flag("missing"));
    }

    #[test]
    fn test_require() {
        let args = HelperArgs::new("math.mod").arg(1.0);
        let err = args.require(2).unwrap_err();
        assert_eq!(err.to_string(), "math.mod expects at least 2 arguments, got 1");
    }
}
