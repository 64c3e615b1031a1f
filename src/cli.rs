use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;

use crate::engine::{PolicyValidationEngine, ProgressUpdate};
use crate::models::{
    IssueSeverity, PolicyValidationReport, RuleCategory, ValidationOptions, MAX_FRAMEWORK_JITTER,
};
use crate::reporting::{ExportFormat, ReportExporter};
use crate::rules::RuleRegistry;

/// Exit code used when a run is interrupted
const EXIT_CANCELLED: u8 = 130;

/// Policy Control - validate access-control policy documents
#[derive(Parser, Debug)]
#[command(name = "policyctl")]
#[command(about = "Validate access-control policy documents")]
#[command(long_about = "Policy Control - Validate a directory of policy JSON documents against a rule set\nand report security and compliance posture")]
pub struct Cli {
    /// Log progress details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate every policy file in a directory
    Validate(ValidateArgs),
    /// List the available validation rules
    ListRules,
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Directory containing policy JSON files
    pub directory: PathBuf,

    /// Report format: json, yaml, text or markdown
    #[arg(short, long, default_value = "text")]
    pub format: ExportFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum number of files validated at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Only run this rule (repeatable)
    #[arg(long = "rule")]
    pub rules: Vec<String>,

    /// Skip this rule (repeatable)
    #[arg(long = "disable-rule")]
    pub disabled_rules: Vec<String>,

    /// Only run rules in this category (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<RuleCategory>,

    /// Skip rules whose maximum severity is below this level
    #[arg(long)]
    pub min_severity: Option<IssueSeverity>,

    /// Seed for the simulated framework scores
    #[arg(long)]
    pub seed: Option<u64>,

    /// Maximum deviation of simulated framework scores, 0 to 5; 0 disables it
    #[arg(long, value_parser = parse_jitter)]
    pub jitter: Option<f64>,

    /// Exit with status 1 when any policy is invalid
    #[arg(long)]
    pub fail_on_errors: bool,
}

impl ValidateArgs {
    /// Run options with command-line overrides applied
    pub fn options(&self) -> ValidationOptions {
        let mut options = ValidationOptions {
            enabled_rules: self.rules.clone(),
            disabled_rules: self.disabled_rules.clone(),
            categories: self.categories.clone(),
            assessment_seed: self.seed,
            ..Default::default()
        };
        if let Some(concurrency) = self.concurrency {
            options.max_concurrency = concurrency.max(1);
        }
        if let Some(severity) = self.min_severity {
            options.minimum_severity = severity;
        }
        if let Some(jitter) = self.jitter {
            options.framework_jitter = jitter;
        }
        options
    }
}

fn parse_jitter(value: &str) -> std::result::Result<f64, String> {
    let jitter: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !jitter.is_finite() || !(0.0..=MAX_FRAMEWORK_JITTER).contains(&jitter) {
        return Err(format!("jitter must be between 0 and {}", MAX_FRAMEWORK_JITTER));
    }
    Ok(jitter)
}

pub async fn run_cli() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Validate(args) => validate(args, cli.quiet).await,
        Commands::ListRules => list_rules().await,
        Commands::Version => show_version().await,
    }
}

/// Install the stderr `tracing` subscriber
pub fn init_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn validate(args: ValidateArgs, quiet: bool) -> Result<ExitCode> {
    if !quiet {
        eprintln!("🔍 Validating policies in {}...", args.directory.display());
    }

    let mut engine = PolicyValidationEngine::new(RuleRegistry::with_builtin_rules());
    if !quiet {
        engine = engine.with_progress(Arc::new(|update: &ProgressUpdate| {
            eprintln!(
                "  ⏳ {}/{} ({:.0}%) {}",
                update.completed,
                update.total,
                update.percent(),
                update.current_file.display()
            );
        }));
    }

    let cancellation = engine.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("⚠️  Interrupted, finishing files in progress...");
            cancellation.cancel();
        }
    });

    let result = engine.validate_directory(&args.directory, args.options()).await;
    interrupt.abort();
    let report = result.with_context(|| format!("Failed to validate {}", args.directory.display()))?;

    let exporter = ReportExporter::new();
    match &args.output {
        Some(path) => {
            exporter.write_to_file(&report, args.format, path).await?;
            if !quiet {
                eprintln!("💾 Report written to {}", path.display());
            }
        }
        None => println!("{}", exporter.export(&report, args.format)?),
    }

    if !quiet {
        print_summary(&report);
    }

    Ok(ExitCode::from(exit_status(&report, args.fail_on_errors)))
}

fn print_summary(report: &PolicyValidationReport) {
    eprintln!();
    if report.cancelled {
        eprintln!(
            "⚠️  Cancelled: {} of {} policies validated",
            report.policy_results.len(),
            report.total_policies
        );
    }
    if report.has_invalid_policies() {
        eprintln!(
            "❌ {} invalid, {} valid ({} errors, {} warnings)",
            report.invalid_policies,
            report.valid_policies,
            report.total_errors(),
            report.total_warnings()
        );
    } else {
        eprintln!(
            "✅ {} valid policies ({} warnings)",
            report.valid_policies,
            report.total_warnings()
        );
    }
    eprintln!(
        "🛡️  Security {:.1} | Compliance {:.1}",
        report.overall_security_score, report.overall_compliance_score
    );
}

fn exit_status(report: &PolicyValidationReport, fail_on_errors: bool) -> u8 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if fail_on_errors && report.has_invalid_policies() {
        1
    } else {
        0
    }
}

async fn list_rules() -> Result<ExitCode> {
    let registry = RuleRegistry::with_builtin_rules();

    println!("📋 Available rules ({}):", registry.len());
    for rule in registry.descriptors() {
        println!("  🔹 {} [{}] max {}", rule.id, rule.category, rule.severity);
        println!("     {}", rule.description);
    }

    Ok(ExitCode::SUCCESS)
}

async fn show_version() -> Result<ExitCode> {
    println!("🚀 Policy Control (policyctl) v{}", env!("CARGO_PKG_VERSION"));
    println!("📝 Validate access-control policy documents");
    println!();
    println!("📊 Features:");
    println!("   ✅ Parallel validation with pluggable rules");
    println!("   ✅ Security and compliance scoring");
    println!("   ✅ JSON, YAML, text and Markdown reports");

    Ok(ExitCode::SUCCESS)
}
