//! docsift CLI - rank document sections for a persona and a job to be done
//!
//! Usage: docsift-cli [OPTIONS] <COMMAND>
//!
//! Supports JSON output for scripting.

use clap::{Args, Parser, Subcommand};
use docsift_lib::cases::{self, BatchSummary, CaseReport};
use docsift_lib::similarity::{Embedder, EmbeddingIndex, SimilarSection};
use docsift_lib::{utils, Pipeline, Settings};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "docsift-cli")]
#[command(version, about = "Persona-driven section ranking for PDF collections", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Detailed logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunOptions {
    /// Output directory for <case>_output.json files
    #[arg(long, short)]
    output: PathBuf,

    /// Settings file (JSON); defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Score with local embeddings (all-MiniLM-L6-v2)
    #[arg(long)]
    embeddings: bool,

    /// Directory holding config.json, tokenizer.json and model.safetensors
    #[arg(long)]
    model_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every case folder under an input directory
    Run {
        /// Directory containing one subfolder per case
        #[arg(long, short)]
        input: PathBuf,

        #[command(flatten)]
        opts: RunOptions,
    },
    /// Process a single case folder
    Case {
        /// Case folder (persona, job_to_be_done.txt, documents/)
        dir: PathBuf,

        #[command(flatten)]
        opts: RunOptions,
    },
    /// Print the sections of one document as JSON
    Sections {
        /// PDF (with a layout sidecar or the `pdf` feature) or a .layout.json file
        path: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Find sections similar to a stored section or to free text
    Similar {
        /// Index file written next to a case output (<case>_index.bin)
        #[arg(long)]
        index: PathBuf,

        /// Position of a stored section in the index
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        section: Option<usize>,

        /// Free text query (requires embeddings)
        #[arg(long)]
        text: Option<String>,

        /// Number of neighbours (default: settings.similar_top_k)
        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for --json
fn init_tracing(verbose: bool) {
    let default = if verbose { "docsift=debug" } else { "docsift=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_cli(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Run { input, opts } => {
            let settings = load_settings(opts.config.as_deref())?;
            let embedder = load_embedder(opts.embeddings, opts.model_dir.as_deref());
            let summary = cases::run_batch(&input, &opts.output, &settings, embedder.as_deref())
                .map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
            print_summary(&summary, cli.json)
        }
        Commands::Case { dir, opts } => {
            let settings = load_settings(opts.config.as_deref())?;
            let embedder = load_embedder(opts.embeddings, opts.model_dir.as_deref());
            let report = cases::process_case(&dir, &opts.output, &settings, embedder.as_deref())
                .map_err(|e| e.to_string())?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            if report.output_written {
                Ok(())
            } else {
                Err(format!("Output could not be written to {}", report.output_path.display()))
            }
        }
        Commands::Sections { path, config } => {
            let settings = load_settings(config.as_deref())?;
            let source = cases::open_document(&path).map_err(|e| e.to_string())?;
            let sections = Pipeline::new(&settings, None)
                .extract_sections(source.as_ref())
                .map_err(|e| e.to_string())?;
            print_json(&sections)
        }
        Commands::Similar { index, section, text, top_k, config, model_dir } => {
            let settings = load_settings(config.as_deref())?;
            let top_k = top_k.unwrap_or(settings.similar_top_k);
            let index = EmbeddingIndex::load(&index)
                .map_err(|e| format!("Failed to load index {}: {}", index.display(), e))?;

            let results = match (section, text) {
                (Some(position), _) => {
                    if !cli.json {
                        if let Some(s) = index.sections.get(position) {
                            println!("Similar to: {} (p.{}) {}", s.document, s.page_number, s.section_title);
                        }
                    }
                    index.find_similar_to_section(position, top_k).map_err(|e| e.to_string())?
                }
                (None, Some(text)) => {
                    let embedder = load_embedder(true, model_dir.as_deref())
                        .ok_or("Text queries need embeddings (build with --features local-embeddings)")?;
                    index.query(embedder.as_ref(), &text, top_k).map_err(|e| e.to_string())?
                }
                (None, None) => return Err("Pass --section or --text".to_string()),
            };

            if cli.json {
                print_json(&results)
            } else {
                print_similar(&results);
                Ok(())
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn load_settings(path: Option<&Path>) -> Result<Settings, String> {
    match path {
        Some(path) => Settings::load(path).map_err(|e| e.to_string()),
        None => Ok(Settings::default()),
    }
}

/// Embedding load failure degrades to keyword-only scoring
#[cfg(feature = "local-embeddings")]
fn load_embedder(enabled: bool, model_dir: Option<&Path>) -> Option<Box<dyn Embedder>> {
    if !enabled {
        return None;
    }
    match docsift_lib::local_embeddings::LocalEmbedder::new(model_dir) {
        Ok(embedder) => Some(Box::new(embedder)),
        Err(e) => {
            tracing::warn!("[Embeddings] Could not load model, scoring with keywords only: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "local-embeddings"))]
fn load_embedder(enabled: bool, _model_dir: Option<&Path>) -> Option<Box<dyn Embedder>> {
    if enabled {
        tracing::warn!("[Embeddings] Built without the local-embeddings feature, scoring with keywords only");
    }
    None
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn print_report(report: &CaseReport) {
    let status = if report.output_written { "ok" } else { "NOT WRITTEN" };
    println!(
        "{}: {} documents, {} sections [{}] -> {}",
        report.case,
        report.documents,
        report.sections,
        status,
        report.output_path.display()
    );
    if let Some(index) = &report.index_path {
        println!("  index: {}", index.display());
    }
    if report.degraded_sections > 0 {
        println!("  {} sections scored without embeddings", report.degraded_sections);
    }
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.document, failure.error);
    }
    for section in report.result.extracted_sections.iter().take(5) {
        println!(
            "  #{:<3} {} p.{}  {}",
            section.importance_rank,
            section.document,
            section.page_number,
            utils::preview(&section.section_title, 60)
        );
    }
}

fn print_summary(summary: &BatchSummary, json: bool) -> Result<(), String> {
    if json {
        return print_json(summary);
    }
    for report in &summary.completed {
        print_report(report);
    }
    for skipped in &summary.skipped {
        println!("{}: skipped ({})", skipped.case, skipped.reason);
    }
    println!("{} completed, {} skipped", summary.completed.len(), summary.skipped.len());
    Ok(())
}

fn print_similar(results: &[SimilarSection]) {
    if results.is_empty() {
        println!("No similar sections found");
        return;
    }
    for (i, s) in results.iter().enumerate() {
        println!(
            "{:>2}. {:.3}  {} p.{}  {}",
            i + 1,
            s.score,
            s.document,
            s.page_number,
            utils::preview(&s.section_title, 60)
        );
    }
}
