//! Error types for the analysis core

use thiserror::Error;

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Fatal analysis errors.
///
/// Anything in here aborts the run. Recoverable problems (directive conflicts,
/// naming collisions, column conflicts) are reported through `Diagnostics` instead.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Entity declared twice: {0}")]
    DuplicateEntity(String),

    #[error("Unresolved reference: {entity}.{property} -> {target}{}", suggestion_suffix(.suggestion))]
    UnresolvedReference {
        entity: String,
        property: String,
        target: String,
        suggestion: Option<String>,
    },

    #[error("Reference {entity}.{property} expects a {expected} but {target} is a {actual}")]
    ReferenceKindMismatch {
        entity: String,
        property: String,
        target: String,
        expected: String,
        actual: String,
    },

    #[error("Reference {entity}.{property} targets {target}, which has no identity properties")]
    IdentitylessReference {
        entity: String,
        property: String,
        target: String,
    },

    #[error("Identity reference cycle: {}", .path.join(" -> "))]
    IdentityCycle { path: Vec<String> },

    #[error("Embedded entity contains itself: {}", .path.join(" -> "))]
    ContainmentCycle { path: Vec<String> },

    #[error("Invalid merge directive on {entity}: {directive}")]
    InvalidDirective { entity: String, directive: String },

    #[error("Invalid subclass {entity}: {reason}")]
    InvalidSubclass { entity: String, reason: String },

    #[error("Pass '{requested}' cannot run at stage '{current}'")]
    StageOrder { requested: String, current: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}
