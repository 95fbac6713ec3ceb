use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contexture::config::{self, ProjectConfig};
use contexture::error::FormatError;
use contexture::formats::{Format, FormatRegistry};
use contexture::loader::LocalRuleLoader;
use contexture::models::{FormatConfig, FormatType, ProcessedRule, Rule};

#[derive(Parser)]
#[command(name = "contexture")]
#[command(about = "Generate AI assistant rule files from templated rules")]
#[command(version)]
struct Cli {
    /// Project directory
    #[arg(short = 'C', long, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate rule files for every enabled format
    Build {
        /// Only build these formats
        #[arg(short, long)]
        format: Vec<String>,
    },
    /// Inspect or remove installed rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// List supported formats
    Formats,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List installed rules
    Ls {
        #[arg(short, long)]
        format: Vec<String>,
    },
    /// Remove an installed rule
    Rm {
        /// Rule ID or rule path
        id: String,

        #[arg(short, long)]
        format: Vec<String>,
    },
}

/// Initialize tracing with output to stderr so stdout carries command output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "contexture=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let registry = FormatRegistry::new();

    match cli.command {
        Commands::Build { format } => build(&registry, &cli.dir, &format),
        Commands::Rules {
            command: RulesCommand::Ls { format },
        } => list(&registry, &cli.dir, &format),
        Commands::Rules {
            command: RulesCommand::Rm { id, format },
        } => remove(&registry, &cli.dir, &id, &format),
        Commands::Formats => {
            for meta in registry.describe() {
                let layout = if meta.is_directory { "directory" } else { "single file" };
                println!(
                    "{:<10} {:<10} {:<12} {}",
                    meta.format_type, meta.display_name, layout, meta.description
                );
            }
            Ok(())
        }
    }
}

/// Enabled format configs, narrowed to `only` when given. Formats named in
/// `only` but absent from the config file use project defaults.
fn selected_configs(config: &ProjectConfig, dir: &Path, only: &[String]) -> Result<Vec<FormatConfig>> {
    let home = config::home_dir();
    let configured = config.format_configs(dir, home.as_deref())?;
    if only.is_empty() {
        return Ok(configured);
    }

    only.iter()
        .map(|name| {
            let format_type = FormatType::from_str(name)
                .ok_or_else(|| FormatError::UnknownFormat(name.clone()))?;
            Ok::<_, anyhow::Error>(
                configured
                    .iter()
                    .find(|c| c.format_type == format_type)
                    .cloned()
                    .unwrap_or_else(|| FormatConfig::new(format_type, dir)),
            )
        })
        .collect()
}

fn build(registry: &FormatRegistry, dir: &Path, only: &[String]) -> Result<()> {
    let config = ProjectConfig::load(dir)?;
    let loader = LocalRuleLoader::new(config.rules_path(dir));

    let rules = config
        .rules
        .iter()
        .map(|rule_ref| {
            loader
                .load(rule_ref.id(), &rule_ref.variables())
                .map(Arc::new)
                .with_context(|| format!("Failed to load rule {}", rule_ref.id()))
        })
        .collect::<Result<Vec<_>>>()?;

    if rules.is_empty() {
        println!("No rules configured.");
        return Ok(());
    }

    let mut failed = 0;
    for format_config in selected_configs(&config, dir, only)? {
        let name = format_config.format_type;
        match build_format(registry, &format_config, &rules) {
            Ok(count) => println!("✓ {}: {} rules", name, count),
            Err(e) => {
                eprintln!("✗ {}: {:#}", name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} format(s) failed", failed);
    }
    Ok(())
}

fn build_format(registry: &FormatRegistry, config: &FormatConfig, rules: &[Arc<Rule>]) -> Result<usize> {
    let format: Format = registry.create_from_config(config)?;

    let mut errors = Vec::new();
    for rule in rules {
        let result = format.validate(rule);
        for warning in &result.warnings {
            eprintln!("warning: {} ({}): {}", rule.id, warning.code, warning.message);
        }
        errors.extend(
            result
                .errors
                .iter()
                .map(|e| format!("{} ({}): {}", rule.id, e.code, e.message)),
        );
    }
    if !errors.is_empty() {
        bail!("validation failed:\n  {}", errors.join("\n  "));
    }

    let transformed = rules
        .iter()
        .map(|rule| format.transform(&ProcessedRule::new(Arc::clone(rule))))
        .collect::<Result<Vec<_>, _>>()?;

    format.write(&transformed, config)?;
    Ok(transformed.len())
}

fn list(registry: &FormatRegistry, dir: &Path, only: &[String]) -> Result<()> {
    let config = ProjectConfig::load(dir)?;
    for format_config in selected_configs(&config, dir, only)? {
        let format = registry.create_from_config(&format_config)?;
        let installed = format.list(&format_config)?;

        println!("{} ({})", format.metadata().display_name, format.output_path(&format_config).display());
        if installed.is_empty() {
            println!("  (no rules)");
        }
        for rule in &installed {
            println!("  {}  {}", rule.id(), rule.title());
        }
    }
    Ok(())
}

fn remove(registry: &FormatRegistry, dir: &Path, id: &str, only: &[String]) -> Result<()> {
    let config = ProjectConfig::load(dir)?;
    let mut removed = 0;
    for format_config in selected_configs(&config, dir, only)? {
        let format = registry.create_from_config(&format_config)?;
        match format.remove(id, &format_config) {
            Ok(()) => {
                println!("✓ removed {} from {}", id, format_config.format_type);
                removed += 1;
            }
            Err(FormatError::RuleNotFound(_)) => {
                tracing::debug!(format = %format_config.format_type, rule_id = id, "Rule not installed");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if removed == 0 {
        bail!("rule {} is not installed", id);
    }
    Ok(())
}
