use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Local;
use clap::{Args, CommandFactory, Parser, Subcommand};
use contentkit_core::docindex::{DocIndexReport, DocumentFailure, IndexOptions, index_documents};
use contentkit_core::error::Warning;
use contentkit_core::ingest::{IngestOptions, IngestReport, ingest_sheets};
use contentkit_core::newsroom::{NewsroomOptions, NewsroomReport, index_newsroom};
use contentkit_core::runtime::{PathOverrides, ResolutionContext, ResolvedPaths, resolve_paths};
use contentkit_core::validate::{ValidationReport, validate_outputs};
use contentkit_core::writer::WriteStatus;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "contentkit",
    version,
    about = "Build the site content index from sheets, Markdown and press releases"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Ingest tabular sheets into the content index")]
    Ingest,
    #[command(about = "Index authored Markdown documents into the content index")]
    Index(IndexArgs),
    #[command(about = "Rebuild the newsroom index from press releases")]
    Newsroom,
    #[command(about = "Check the generated indexes for structural problems")]
    Validate,
    #[command(about = "Run ingest, index, newsroom and validate in order")]
    Build(IndexArgs),
    #[command(about = "Print resolved paths and where they came from")]
    Paths,
}

#[derive(Debug, Args)]
struct IndexArgs {
    #[arg(long, help = "Fail when any document cannot be indexed")]
    strict: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Ingest) => run_ingest(&runtime),
        Some(Commands::Index(IndexArgs { strict })) => run_index(&runtime, strict),
        Some(Commands::Newsroom) => run_newsroom(&runtime),
        Some(Commands::Validate) => run_validate(&runtime),
        Some(Commands::Build(IndexArgs { strict })) => run_build(&runtime, strict),
        Some(Commands::Paths) => run_paths(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_ingest(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("ingest");
    println!("project_root: {}", normalize_path(&paths.project_root));
    ingest_stage(&paths)?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_index(runtime: &RuntimeOptions, strict: bool) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("index");
    println!("project_root: {}", normalize_path(&paths.project_root));
    index_stage(&paths, strict)?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_newsroom(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("newsroom");
    println!("project_root: {}", normalize_path(&paths.project_root));
    newsroom_stage(&paths)?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_validate(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("validate");
    println!("project_root: {}", normalize_path(&paths.project_root));
    validate_stage(&paths)?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_build(runtime: &RuntimeOptions, strict: bool) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("build");
    println!("project_root: {}", normalize_path(&paths.project_root));
    ingest_stage(&paths)?;
    index_stage(&paths, strict)?;
    newsroom_stage(&paths)?;
    validate_stage(&paths)?;
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_paths(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    println!("paths");
    println!("{}", paths.diagnostics());
    println!(
        "skip_sheets: {}",
        format_flag(IngestOptions::from_config(&paths.config).skip)
    );
    Ok(())
}

fn ingest_stage(paths: &ResolvedPaths) -> Result<()> {
    let report = ingest_sheets(paths, &IngestOptions::from_config(&paths.config))?;
    print_ingest_report("ingest", &report);
    Ok(())
}

fn index_stage(paths: &ResolvedPaths, strict: bool) -> Result<()> {
    let options = IndexOptions {
        today: Some(Local::now().date_naive()),
    };
    let report = index_documents(paths, &options)?;
    print_index_report("index", &report);
    if strict && report.failed > 0 {
        bail!(
            "{} document(s) could not be indexed (strict mode)",
            report.failed
        );
    }
    Ok(())
}

fn newsroom_stage(paths: &ResolvedPaths) -> Result<()> {
    let options = NewsroomOptions {
        today: Local::now().date_naive(),
    };
    let report = index_newsroom(paths, &options)?;
    print_newsroom_report("newsroom", &report);
    Ok(())
}

fn validate_stage(paths: &ResolvedPaths) -> Result<()> {
    let report = validate_outputs(paths)?;
    print_validation_report("validate", &report);
    if !report.is_success() {
        bail!(
            "validation failed with {} error(s)",
            report.fatal_count()
        );
    }
    Ok(())
}

fn print_ingest_report(prefix: &str, report: &IngestReport) {
    println!("{prefix}.skipped: {}", format_flag(report.skipped));
    if report.skipped {
        return;
    }
    println!("{prefix}.files: {}", report.files);
    println!("{prefix}.rows: {}", report.rows);
    println!("{prefix}.added: {}", report.added);
    println!("{prefix}.updated: {}", report.updated);
    println!("{prefix}.unchanged: {}", report.unchanged);
    println!("{prefix}.preserved: {}", report.preserved);
    println!("{prefix}.documents_written: {}", report.documents_written);
    println!("{prefix}.documents_unchanged: {}", report.documents_unchanged);
    println!("{prefix}.index: {}", format_status(report.index_status));
    print_warnings(prefix, &report.warnings);
}

fn print_index_report(prefix: &str, report: &DocIndexReport) {
    println!("{prefix}.files: {}", report.files);
    println!("{prefix}.added: {}", report.added);
    println!("{prefix}.updated: {}", report.updated);
    println!("{prefix}.unchanged: {}", report.unchanged);
    println!("{prefix}.skipped: {}", report.skipped);
    println!("{prefix}.failed: {}", report.failed);
    println!("{prefix}.index: {}", format_status(report.index_status));
    print_failures(prefix, &report.failures);
    print_warnings(prefix, &report.warnings);
}

fn print_newsroom_report(prefix: &str, report: &NewsroomReport) {
    println!("{prefix}.files: {}", report.files);
    println!("{prefix}.added: {}", report.added);
    println!("{prefix}.updated: {}", report.updated);
    println!("{prefix}.unchanged: {}", report.unchanged);
    println!("{prefix}.dropped: {}", report.dropped);
    println!("{prefix}.failed: {}", report.failed);
    println!("{prefix}.index: {}", format_status(report.index_status));
    print_failures(prefix, &report.failures);
}

fn print_validation_report(prefix: &str, report: &ValidationReport) {
    println!("{prefix}.records: {}", report.records);
    println!("{prefix}.releases: {}", report.releases);
    println!("{prefix}.errors: {}", report.fatal_count());
    println!("{prefix}.warnings: {}", report.warning_count());
    for finding in &report.findings {
        println!("{prefix}.finding: {finding}");
    }
}

fn print_warnings(prefix: &str, warnings: &[Warning]) {
    println!("{prefix}.warnings: {}", warnings.len());
    for warning in warnings {
        println!("{prefix}.warning: {warning}");
    }
}

fn print_failures(prefix: &str, failures: &[DocumentFailure]) {
    for failure in failures {
        println!("{prefix}.failure: {}: {}", failure.path, failure.message);
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    let paths = resolve_paths(&context, &overrides)?;
    tracing::debug!(
        project_root = %normalize_path(&paths.project_root),
        root_source = paths.root_source.as_str(),
        config_source = paths.config_source.as_str(),
        "resolved runtime paths"
    );
    Ok(paths)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_status(status: Option<WriteStatus>) -> &'static str {
    status.map_or("<not written>", WriteStatus::as_str)
}
