//! Diagnostics
//!
//! Collects non-fatal findings during analysis passes. Fatal structural
//! problems are `AnalysisError`s instead; everything here degrades gracefully
//! and the derived attributes are still produced.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::DiagnosticLevel;
use crate::paths::PropertyPath;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Merge Directives ===
    /// Two equally specific directives assign different coverings
    DirectiveConflict,
    /// Directive source matches no path on the entity
    DirectiveUnmatched,
    /// Substituted directive target does not exist
    DirectiveTargetMissing,
    /// Coverings loop back to the covered path
    DirectiveCycle,
    /// Directive source equals its target
    SelfDirective,

    // === Naming ===
    /// Subclass property renders to the same name as a superclass collection
    NamingCollision,

    // === Equality ===
    /// Two access paths reach one column without a directive
    ColumnConflict,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectiveConflict => "E001",
            Self::DirectiveUnmatched => "E002",
            Self::DirectiveTargetMissing => "E003",
            Self::DirectiveCycle => "E004",
            Self::NamingCollision => "W001",
            Self::ColumnConflict => "W002",
            Self::SelfDirective => "W003",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DirectiveConflict
            | Self::DirectiveUnmatched
            | Self::DirectiveTargetMissing
            | Self::DirectiveCycle => Severity::Error,

            Self::NamingCollision | Self::ColumnConflict | Self::SelfDirective => {
                Severity::Warning
            }
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Entity the finding is attached to
    pub entity: String,
    pub code: DiagnosticCode,
    /// Reported severity (the code's default unless overridden by config)
    pub severity: Severity,
    pub message: String,
    /// Additional context (property paths, related entities)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(entity: impl Into<String>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            code,
            severity: code.severity(),
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code, self.severity, self.message, self.entity
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from analysis passes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
    #[serde(skip)]
    silent: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects without logging; for passes whose findings are reported elsewhere
    pub fn silent() -> Self {
        Self { items: Vec::new(), silent: true }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Add a diagnostic item
    pub fn push(&mut self, item: DiagnosticItem) {
        if !self.silent {
            tracing::warn!(entity = %item.entity, code = %item.code, "{}", item.message);
        }
        self.items.push(item);
    }

    /// Add an item at a configured level; `Allow` drops it
    pub fn push_at(&mut self, item: DiagnosticItem, level: DiagnosticLevel) {
        match level {
            DiagnosticLevel::Error => self.push(item.with_severity(Severity::Error)),
            DiagnosticLevel::Warn => self.push(item.with_severity(Severity::Warning)),
            DiagnosticLevel::Allow => {}
        }
    }

    /// Two equally specific directives disagree on a covering
    pub fn directive_conflict(
        &mut self,
        entity: &str,
        covered: &PropertyPath,
        targets: &[&PropertyPath],
    ) {
        let mut item = DiagnosticItem::new(
            entity,
            DiagnosticCode::DirectiveConflict,
            format!("Conflicting merge directives for '{}'; left uncovered", covered),
        );
        for target in targets {
            item = item.with_context(format!("candidate covering: {}", target));
        }
        self.push(item);
    }

    pub fn directive_unmatched(
        &mut self,
        entity: &str,
        source: &PropertyPath,
        target: &PropertyPath,
        level: DiagnosticLevel,
    ) {
        self.push_at(
            DiagnosticItem::new(
                entity,
                DiagnosticCode::DirectiveUnmatched,
                format!("Merge directive source '{}' matches no path", source),
            )
            .with_context(format!("directive: {} -> {}", source, target)),
            level,
        );
    }

    pub fn directive_target_missing(
        &mut self,
        entity: &str,
        covered: &PropertyPath,
        target: &PropertyPath,
    ) {
        self.push(
            DiagnosticItem::new(
                entity,
                DiagnosticCode::DirectiveTargetMissing,
                format!("Merge target '{}' for '{}' does not exist", target, covered),
            ),
        );
    }

    pub fn directive_cycle(&mut self, entity: &str, chain: &[&PropertyPath]) {
        let rendered: Vec<String> = chain.iter().map(|p| p.to_string()).collect();
        self.push(
            DiagnosticItem::new(
                entity,
                DiagnosticCode::DirectiveCycle,
                format!(
                    "Merge coverings loop back to '{}'; left uncovered",
                    rendered.first().map(String::as_str).unwrap_or("?")
                ),
            )
            .with_context(format!("Chain: {}", rendered.join(" -> "))),
        );
    }

    pub fn self_directive(&mut self, entity: &str, path: &PropertyPath) {
        self.push(DiagnosticItem::new(
            entity,
            DiagnosticCode::SelfDirective,
            format!("Merge directive maps '{}' onto itself", path),
        ));
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Items attached to one entity
    pub fn for_entity<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a DiagnosticItem> + 'a {
        self.items.iter().filter(move |i| i.entity == entity)
    }

    /// Get all items
    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&item.to_string());
            output.push('\n');
        }

        if !self.items.is_empty() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
