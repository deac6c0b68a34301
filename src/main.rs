//! Binary entry point for dishmatch.
//!
//! This binary provides the CLI front-end for enrolling and recognizing dishes.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand, ValueEnum};
use dishmatch::config::{DishmatchConfig, ThresholdSetting};
use dishmatch::observability::{self, LoggingConfig};
use dishmatch::storage::{FilesystemArtifactStore, TemplateStore};
use dishmatch::{ArtifactRef, ColorHistogramExtractor, Recognition, RecognitionService};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Dishmatch - dish recognition by template embeddings.
#[derive(Parser)]
#[command(name = "dishmatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "DISHMATCH_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for listing commands.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    /// Aligned text.
    #[default]
    Table,
    /// JSON document.
    Json,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Templates(TemplateCommand),

    /// Show or change the saved similarity threshold.
    Threshold {
        #[command(subcommand)]
        action: ThresholdAction,
    },
}

/// Commands that open the template store.
#[derive(Subcommand)]
enum TemplateCommand {
    /// Enroll an image as a template of a dish.
    Enroll {
        /// Dish category name.
        category: String,

        /// Image file (JPEG or PNG).
        image: PathBuf,
    },

    /// Rank the enrolled templates most similar to an image.
    Classify {
        /// Image file (JPEG or PNG).
        image: PathBuf,

        /// Minimum similarity (defaults to the saved threshold).
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f32>,

        /// Maximum number of matches (defaults to the configured `top_k`).
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Report the single best dish for an image, or that none matched.
    Recognize {
        /// Image file (JPEG or PNG).
        image: PathBuf,

        /// Minimum similarity (defaults to the saved threshold).
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f32>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// List enrolled categories.
    List {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Delete a category and all of its templates.
    DeleteCategory {
        /// Dish category name.
        name: String,
    },

    /// Delete one template of a category.
    DeleteEntry {
        /// Dish category name.
        name: String,

        /// Artifact reference as shown by `list`.
        artifact: String,
    },
}

/// Threshold actions.
#[derive(Subcommand)]
enum ThresholdAction {
    /// Print the saved threshold.
    Get,

    /// Save a new threshold in `[-1, 1]`.
    Set {
        /// New threshold.
        #[arg(allow_negative_numbers = true)]
        value: f32,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(LoggingConfig::from_settings(
        Some(&config.logging),
        cli.verbose,
    )) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &DishmatchConfig) -> CmdResult {
    let threshold_setting = ThresholdSetting::new(config.threshold_path());

    match cli.command {
        // Threshold commands must work even when the template store is unreadable.
        Commands::Threshold { action } => cmd_threshold(config, &threshold_setting, action),
        Commands::Templates(command) => {
            let service = build_service(config, &threshold_setting)?;
            run_template_command(&service, config, command)
        },
    }
}

/// Runs a command against the template store.
fn run_template_command(
    service: &RecognitionService,
    config: &DishmatchConfig,
    command: TemplateCommand,
) -> CmdResult {
    match command {
        TemplateCommand::Enroll { category, image } => cmd_enroll(service, &category, &image),

        TemplateCommand::Classify {
            image,
            threshold,
            top_k,
            format,
        } => cmd_classify(
            service,
            &image,
            threshold.unwrap_or_else(|| service.threshold()),
            top_k.unwrap_or(config.top_k),
            format,
        ),

        TemplateCommand::Recognize {
            image,
            threshold,
            format,
        } => cmd_recognize(
            service,
            &image,
            threshold.unwrap_or_else(|| service.threshold()),
            format,
        ),

        TemplateCommand::List { format } => cmd_list(service, format),

        TemplateCommand::DeleteCategory { name } => {
            let removed = service.delete_category(&name)?;
            println!("Deleted category '{name}' ({removed} templates)");
            Ok(())
        },

        TemplateCommand::DeleteEntry { name, artifact } => {
            let remaining = service.delete_entry(&name, &ArtifactRef::new(artifact))?;
            println!("Deleted template; '{name}' has {remaining} remaining");
            Ok(())
        },
    }
}

/// Loads configuration from `--config` / `DISHMATCH_CONFIG_PATH`, or the default location.
fn load_config(path: Option<&str>) -> Result<DishmatchConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(config_path) if !config_path.trim().is_empty() => {
            DishmatchConfig::load_from_file(Path::new(config_path))?
        },
        _ => DishmatchConfig::load_default()?,
    };

    Ok(config.with_env_overrides())
}

/// Opens the store and wires the recognition service.
fn build_service(
    config: &DishmatchConfig,
    threshold_setting: &ThresholdSetting,
) -> Result<RecognitionService, Box<dyn std::error::Error>> {
    let artifacts = Arc::new(FilesystemArtifactStore::new(config.artifact_path()));
    let store = TemplateStore::open(config.store_path(), artifacts, config.dimensions)?;
    let extractor = ColorHistogramExtractor::new(config.histogram_bins)?;
    let threshold = threshold_setting.load(config.default_threshold)?;

    Ok(RecognitionService::new(
        Arc::new(store),
        Arc::new(extractor),
        threshold,
    )?)
}

fn read_image(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()).into())
}

fn cmd_enroll(service: &RecognitionService, category: &str, image: &Path) -> CmdResult {
    let bytes = read_image(image)?;
    let extension = image
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("jpg");

    let count = service.enroll(category, &bytes, extension)?;
    println!("Enrolled '{category}' ({count} templates)");
    Ok(())
}

fn cmd_classify(
    service: &RecognitionService,
    image: &Path,
    threshold: f32,
    top_k: usize,
    format: OutputFormat,
) -> CmdResult {
    let bytes = read_image(image)?;
    let matches = service.classify(&bytes, threshold, top_k)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&matches)?),
        OutputFormat::Table => {
            if matches.is_empty() {
                println!("No matches at threshold {threshold:.2}");
            }
            for (rank, hit) in matches.iter().enumerate() {
                println!("{:>2}. [{:.4}] {}", rank + 1, hit.score, hit.category);
            }
        },
    }
    Ok(())
}

fn cmd_recognize(
    service: &RecognitionService,
    image: &Path,
    threshold: f32,
    format: OutputFormat,
) -> CmdResult {
    let bytes = read_image(image)?;
    let recognition = service.recognize(&bytes, threshold)?;

    match (format, &recognition) {
        (OutputFormat::Json, _) => println!("{}", serde_json::to_string_pretty(&recognition)?),
        (OutputFormat::Table, Recognition::Matched(hit)) => {
            println!("{} ({:.4})", hit.category, hit.score);
        },
        (OutputFormat::Table, Recognition::Unrecognized { best_score }) => match best_score {
            Some(score) => println!("unrecognized (best {score:.4} < {threshold:.2})"),
            None => println!("unrecognized (no templates enrolled)"),
        },
    }
    Ok(())
}

fn cmd_list(service: &RecognitionService, format: OutputFormat) -> CmdResult {
    let categories = service.list_categories();

    match format {
        OutputFormat::Json => {
            let listing: serde_json::Map<String, serde_json::Value> = categories
                .iter()
                .map(|(name, entries)| {
                    let artifacts: Vec<&str> = entries.iter().map(|e| e.artifact.as_str()).collect();
                    (
                        name.clone(),
                        serde_json::json!({ "count": entries.len(), "artifacts": artifacts }),
                    )
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        },
        OutputFormat::Table => {
            if categories.is_empty() {
                println!("No categories enrolled");
            }
            for (name, entries) in &categories {
                println!("{name} ({})", entries.len());
                for entry in entries {
                    println!("    {}", entry.artifact);
                }
            }
        },
    }
    Ok(())
}

fn cmd_threshold(
    config: &DishmatchConfig,
    setting: &ThresholdSetting,
    action: ThresholdAction,
) -> CmdResult {
    match action {
        ThresholdAction::Get => {
            println!("{}", setting.load(config.default_threshold)?);
        },
        ThresholdAction::Set { value } => {
            setting.save(value)?;
            println!("Threshold set to {value}");
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_threshold_commands_parse_apart_from_store_commands() {
        let cli = Cli::try_parse_from(["dishmatch", "threshold", "set", "-0.25"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Threshold {
                action: ThresholdAction::Set { value }
            } if (value + 0.25).abs() < f32::EPSILON
        ));

        let cli = Cli::try_parse_from(["dishmatch", "list", "--format", "json"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Templates(TemplateCommand::List {
                format: OutputFormat::Json
            })
        ));
    }

    #[test]
    fn test_classify_accepts_negative_threshold() {
        let cli = Cli::try_parse_from([
            "dishmatch", "classify", "query.jpg", "--threshold", "-0.5", "-k", "5",
        ])
        .expect("parse");
        let Commands::Templates(TemplateCommand::Classify {
            threshold, top_k, ..
        }) = cli.command
        else {
            panic!("expected classify");
        };
        assert_eq!(threshold, Some(-0.5));
        assert_eq!(top_k, Some(5));
    }
}
