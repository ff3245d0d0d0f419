//! Configuration management for the analysis core
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (api-schema.toml)
//! - Environment variables (API_SCHEMA__*)
//!
//! ## Example config file (api-schema.toml):
//! ```toml
//! [naming]
//! extension_prefix = "_ext"
//! strip_owner_prefix = true
//!
//! [naming.irregular_plurals]
//! Person = "People"
//!
//! [diagnostics]
//! column_conflict = "warn"
//! naming_collision = "warn"
//! unmatched_directive = "error"
//! deny_warnings = false
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration for the analysis core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// JSON path naming
    #[serde(default)]
    pub naming: NamingConfig,

    /// Diagnostic levels
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// CLI output
    #[serde(default)]
    pub output: OutputConfig,
}

/// Naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    /// Document member holding extension properties
    #[serde(default = "default_extension_prefix")]
    pub extension_prefix: String,

    /// Singular -> plural overrides, matched as trailing PascalCase words
    #[serde(default = "default_irregular_plurals")]
    pub irregular_plurals: BTreeMap<String, String>,

    /// Drop the owning entity's name from collection property names
    #[serde(default = "default_true")]
    pub strip_owner_prefix: bool,
}

/// How a diagnostic category is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warn,
    Allow,
}

/// Diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Implicit equality emitted without a directive
    #[serde(default = "default_warn")]
    pub column_conflict: DiagnosticLevel,

    /// Subclass property shadowing a superclass collection
    #[serde(default = "default_warn")]
    pub naming_collision: DiagnosticLevel,

    /// Directive whose source matches no path
    #[serde(default = "default_error")]
    pub unmatched_directive: DiagnosticLevel,

    /// Treat warnings as failures in the CLI
    #[serde(default)]
    pub deny_warnings: bool,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

// Default value functions
fn default_extension_prefix() -> String {
    "_ext".to_string()
}

fn default_irregular_plurals() -> BTreeMap<String, String> {
    [("Child", "Children"), ("Criterion", "Criteria"), ("Person", "People")]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p.to_string()))
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_warn() -> DiagnosticLevel {
    DiagnosticLevel::Warn
}

fn default_error() -> DiagnosticLevel {
    DiagnosticLevel::Error
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            extension_prefix: default_extension_prefix(),
            irregular_plurals: default_irregular_plurals(),
            strip_owner_prefix: true,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            column_conflict: DiagnosticLevel::Warn,
            naming_collision: DiagnosticLevel::Warn,
            unmatched_directive: DiagnosticLevel::Error,
            deny_warnings: false,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "api-schema.toml",
            ".api-schema.toml",
            "config/api-schema.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "api-schema") {
            let xdg_config = config_dir.config_dir().join("api-schema.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (API_SCHEMA__*)
        builder = builder.add_source(
            Environment::with_prefix("API_SCHEMA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
