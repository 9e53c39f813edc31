/*
 * eval_context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-render evaluation state.
//!
//! An [`EvalState`] is created at the start of a top-level render and shared
//! by reference with every nested expansion (block bodies, includes,
//! component bodies) until the render returns. It is never reused across
//! renders.
//!
//! It holds:
//!
//! 1. **Diagnostics**: every error rendered inline, also collected here
//! 2. **Components**: the registry and cycle-guard call stack
//! 3. **Configuration**: the snapshot the render started with

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::components::{CallStack, ComponentRegistry};
use crate::config::ConfigSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A problem reported during a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Collector for diagnostic messages during template evaluation.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.add(Diagnostic {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.add(Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    /// Check if any errors were collected (warnings don't count).
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consume the collector, returning diagnostics in the order reported.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// State owned by one top-level render call.
pub(crate) struct EvalState {
    pub snapshot: Arc<ConfigSnapshot>,
    pub components: ComponentRegistry,
    pub call_stack: CallStack,
    pub diagnostics: DiagnosticCollector,
    /// Clock reading taken when the render started.
    pub now: DateTime<Utc>,
}

impl EvalState {
    pub fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            snapshot,
            components: ComponentRegistry::new(),
            call_stack: CallStack::new(),
            diagnostics: DiagnosticCollector::new(),
            now: Utc::now(),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.snapshot.max_include_depth()
    }
}
