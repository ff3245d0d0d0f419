//! API Schema Analyzer CLI
//!
//! Runs the analysis pipeline over entity declarations and prints the derived
//! artifacts as JSON.
//!
//! Usage:
//!   api-schema-analyze analyze model.json --entity Section
//!   api-schema-analyze fips model/ Section
//!   api-schema-analyze components model/ Section
//!   api-schema-analyze refs model/ School
//!   api-schema-analyze check model/
//!   api-schema-analyze dot model.json > graph.dot
//!   api-schema-analyze config init

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use api_schema_core::config::OutputFormat;
use api_schema_core::graph::EdgeKind;
use api_schema_core::{AnalysisConfig, AnalysisContext, EntityGraph, EntityId};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "api-schema-analyze")]
#[command(about = "Derive JSON paths, identities and constraints from entity declarations")]
struct Cli {
    /// Config file (defaults to api-schema.toml lookup)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pass and print per-resource results
    Analyze {
        /// Declaration file or directory
        input: PathBuf,
        /// Only print this entity
        #[arg(short, long)]
        entity: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the flattened identity properties of one entity
    Fips {
        input: PathBuf,
        entity: String,
    },

    /// Print the reference component tree of each reference property
    Components {
        input: PathBuf,
        entity: String,
    },

    /// List the entities one entity depends on and the ones depending on it
    Refs {
        input: PathBuf,
        entity: String,
    },

    /// Report diagnostics; non-zero exit on errors
    Check {
        input: PathBuf,
    },

    /// Export the reference graph in DOT format
    Dot {
        input: PathBuf,
    },

    /// Show or create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        #[arg(default_value = "api-schema.toml")]
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref().map(path_str).transpose()?;
    let config = AnalysisConfig::load_from(config_path).context("failed to load configuration")?;

    match cli.command {
        Commands::Analyze { input, entity, output } => {
            let context = build(&input, &config)?;
            let rendered = match entity {
                Some(name) => {
                    let Some(analysis) = context.analysis(&name) else {
                        bail!("'{}' is not a resource in {}", name, input.display());
                    };
                    render(analysis, config.output.format)?
                }
                None => render(context.analyses(), config.output.format)?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Wrote {} ({} resources)", path.display(), context.analyses().len());
                }
                None => println!("{}", rendered),
            }
            Ok(0)
        }

        Commands::Fips { input, entity } => {
            let context = build(&input, &config)?;
            let Some(analysis) = context.analysis(&entity) else {
                bail!("'{}' is not a resource in {}", entity, input.display());
            };
            println!("{}", render(&analysis.flattened_identity_properties, config.output.format)?);
            Ok(0)
        }

        Commands::Components { input, entity } => {
            let context = build(&input, &config)?;
            let graph = context.graph();
            let Some(id) = graph.resolve(&entity) else {
                bail!("'{}' is not declared in {}", entity, input.display());
            };
            let components: Vec<Value> = graph
                .effective_properties(id)
                .into_iter()
                .filter_map(|property| {
                    context.components().get(&property).map(|component| {
                        json!({
                            "property": graph.property(property).full_name(),
                            "component": component.to_json(graph),
                        })
                    })
                })
                .collect();
            println!("{}", render(&components, config.output.format)?);
            Ok(0)
        }

        Commands::Refs { input, entity } => {
            let graph = load(&input)?;
            let Some(id) = graph.resolve(&entity) else {
                bail!("'{}' is not declared in {}", entity, input.display());
            };
            let edges = |list: Vec<(EntityId, EdgeKind)>| -> Vec<Value> {
                list.into_iter()
                    .map(|(other, kind)| json!({ "entity": graph.entity(other).name, "kind": kind }))
                    .collect()
            };
            let rendered = json!({
                "dependencies": edges(graph.refs_out(id)),
                "dependents": edges(graph.refs_in(id)),
            });
            println!("{}", render(&rendered, config.output.format)?);
            Ok(0)
        }

        Commands::Check { input } => {
            let context = build(&input, &config)?;
            let diagnostics = context.diagnostics();
            print!("{}", diagnostics.format_all());
            for collision in context.collisions().collisions() {
                tracing::debug!(subclass = %collision.subclass, json_name = %collision.json_name, "naming collision");
            }

            let failed = diagnostics.has_errors()
                || (config.diagnostics.deny_warnings && diagnostics.warning_count() > 0);
            if failed {
                return Ok(1);
            }
            println!(
                "OK: {} resources, bundle {}",
                context.analyses().len(),
                context.bundle_hash()
            );
            Ok(0)
        }

        Commands::Dot { input } => {
            let graph = load(&input)?;
            print!("{}", graph.to_dot());
            Ok(0)
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
                print!("{}", rendered);
                Ok(0)
            }
            ConfigAction::Init { path } => {
                if path.exists() {
                    bail!("{} already exists", path.display());
                }
                AnalysisConfig::default()
                    .save(path_str(&path)?)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("Created {}", path.display());
                Ok(0)
            }
        },
    }
}

fn load(input: &Path) -> Result<EntityGraph> {
    EntityGraph::from_path(input).with_context(|| format!("failed to load {}", input.display()))
}

fn build(input: &Path, config: &AnalysisConfig) -> Result<AnalysisContext> {
    let graph = load(input)?;
    AnalysisContext::build(graph, config).with_context(|| format!("analysis of {} failed", input.display()))
}

fn render<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String> {
    let rendered = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Compact => serde_json::to_string(value)?,
    };
    Ok(rendered)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("path is not valid UTF-8: {}", path.display()))
}
