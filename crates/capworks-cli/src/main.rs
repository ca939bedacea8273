//! Capworks - annual capital-works program planning CLI
//!
//! The `capworks` command works on program files: JSON documents holding one
//! annual program with its books and allocations.
//!
//! ## Commands
//!
//! - `validate-program`: build a program from a seed record
//! - `add-book` / `remove-book`: manage program books
//! - `add-project` / `remove-project`: manage allocations
//! - `rank`: show the ranked allocations
//! - `rebalance`: apply the budget cap and report overflow
//! - `transition`: move a program through its lifecycle
//! - `reconcile`: reconcile a registry batch against a project corpus

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use capworks_core::{
    lifecycle, Allocator, AnnualProgram, AnnualProgramRecord, BookId, ExternalRecord, Money,
    PlanningConfig, PriorityLevel, ProgramStatus, Project, ProjectId, ProjectRecord, Reconciler,
};

#[derive(Parser)]
#[command(name = "capworks")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Annual capital-works program planning", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Planning configuration file (falls back to $CAPWORKS_CONFIG, then defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an annual program from a seed record and print it
    ValidateProgram {
        /// Seed record (JSON)
        seed: PathBuf,

        /// Reference year for the accepted window (default: this year)
        #[arg(long)]
        current_year: Option<i32>,

        /// Write the program file here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add an empty program book
    AddBook {
        /// Program file
        program: PathBuf,

        /// Book name
        #[arg(short, long)]
        name: String,

        /// Priority levels (JSON array); the configured chain applies when omitted
        #[arg(long)]
        levels: Option<PathBuf>,
    },

    /// Remove a program book with its allocations
    RemoveBook {
        /// Program file
        program: PathBuf,

        /// Book id
        #[arg(long)]
        book: String,
    },

    /// Show ranked allocations, program-wide or for one book
    Rank {
        /// Program file
        program: PathBuf,

        /// Rank only this book, with its own priority levels
        #[arg(long)]
        book: Option<String>,
    },

    /// Apply the budget cap and report overflow
    Rebalance {
        /// Program file
        program: PathBuf,

        /// Save the deferred marks back to the program file
        #[arg(long)]
        write: bool,
    },

    /// Allocate a project to a program book
    AddProject {
        /// Program file
        program: PathBuf,

        /// Target book id
        #[arg(long)]
        book: String,

        /// Project record (JSON)
        #[arg(long)]
        project: PathBuf,

        /// Committed budget
        #[arg(long)]
        budget: u64,
    },

    /// Remove a project allocation from a program book
    RemoveProject {
        /// Program file
        program: PathBuf,

        /// Book id
        #[arg(long)]
        book: String,

        /// Project id
        #[arg(long)]
        project_id: String,
    },

    /// Move a program to another lifecycle status
    Transition {
        /// Program file
        program: PathBuf,

        /// Target status
        #[arg(long, value_enum)]
        to: TargetStatus,
    },

    /// Reconcile a registry batch against a project corpus
    Reconcile {
        /// Project corpus (JSON array of projects)
        #[arg(long)]
        corpus: PathBuf,

        /// Registry batch (JSON array of records)
        #[arg(long)]
        batch: PathBuf,

        /// Write the reconciliation report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save new and updated projects back to the corpus file
        #[arg(long)]
        write_corpus: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetStatus {
    Programming,
    SubmittedFinal,
}

impl From<TargetStatus> for ProgramStatus {
    fn from(target: TargetStatus) -> Self {
        match target {
            TargetStatus::Programming => ProgramStatus::Programming,
            TargetStatus::SubmittedFinal => ProgramStatus::SubmittedFinal,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    capworks_core::init_tracing(cli.json, level);

    let config = PlanningConfig::load(cli.config.as_deref())
        .context("Failed to load planning configuration")?;

    match cli.command {
        Commands::ValidateProgram {
            seed,
            current_year,
            output,
        } => cmd_validate_program(&config, &seed, current_year, output.as_deref()),
        Commands::AddBook {
            program,
            name,
            levels,
        } => cmd_add_book(&program, &name, levels.as_deref()),
        Commands::RemoveBook { program, book } => cmd_remove_book(&config, &program, &book),
        Commands::Rank { program, book } => cmd_rank(&config, &program, book.as_deref()),
        Commands::Rebalance { program, write } => cmd_rebalance(&config, &program, write),
        Commands::AddProject {
            program,
            book,
            project,
            budget,
        } => cmd_add_project(&config, &program, &book, &project, budget),
        Commands::RemoveProject {
            program,
            book,
            project_id,
        } => cmd_remove_project(&config, &program, &book, &project_id),
        Commands::Transition { program, to } => cmd_transition(&program, to.into()),
        Commands::Reconcile {
            corpus,
            batch,
            output,
            write_corpus,
        } => cmd_reconcile(&config, &corpus, &batch, output.as_deref(), write_corpus),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {what}: {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Invalid {what}: {:?}", path))
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {what}: {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_book(book: &str) -> Result<BookId> {
    book.parse::<BookId>()
        .with_context(|| format!("Invalid book id: {book}"))
}

fn load_program(path: &Path) -> Result<AnnualProgram> {
    read_json(path, "program file")
}

/// Build a program from a seed record.
fn cmd_validate_program(
    config: &PlanningConfig,
    seed: &Path,
    current_year: Option<i32>,
    output: Option<&Path>,
) -> Result<()> {
    let record: AnnualProgramRecord = read_json(seed, "seed record")?;
    let current_year = current_year.unwrap_or_else(|| chrono::Utc::now().year());
    let program = record
        .into_program(&config.year_window, current_year)
        .with_context(|| format!("Seed record rejected: {:?}", seed))?;

    info!(program = %program.key(), "seed record accepted");
    match output {
        Some(path) => {
            write_json(path, &program, "program file")?;
            println!("Created program {} at {:?}", program.key(), path);
            Ok(())
        }
        None => print_json(&program),
    }
}

fn cmd_add_book(program_path: &Path, name: &str, levels: Option<&Path>) -> Result<()> {
    let mut program = load_program(program_path)?;
    let levels: Vec<PriorityLevel> = match levels {
        Some(path) => read_json(path, "priority levels")?,
        None => Vec::new(),
    };
    let book = program.add_program_book(name, levels)?;
    write_json(program_path, &program, "program file")?;
    println!("Added book '{}' to {}: {}", name, program.key(), book);
    Ok(())
}

fn cmd_remove_book(config: &PlanningConfig, program_path: &Path, book: &str) -> Result<()> {
    let mut program = load_program(program_path)?;
    let book_id = parse_book(book)?;
    let removed = Allocator::from_config(config).remove_program_book(&mut program, book_id)?;
    write_json(program_path, &program, "program file")?;
    println!(
        "Removed book '{}' from {} with {} allocation(s)",
        removed.name,
        program.key(),
        removed.allocations().len()
    );
    Ok(())
}

fn cmd_rank(config: &PlanningConfig, program_path: &Path, book: Option<&str>) -> Result<()> {
    let program = load_program(program_path)?;
    let allocator = Allocator::from_config(config);
    let ranked = match book {
        Some(book) => allocator.rank_book(&program, parse_book(book)?)?,
        None => allocator.ranked_view(&program),
    };
    print_json(&ranked)
}

fn cmd_rebalance(config: &PlanningConfig, program_path: &Path, write: bool) -> Result<()> {
    let mut program = load_program(program_path)?;
    let outcome = Allocator::from_config(config).rebalance(&mut program)?;

    if let Some(report) = outcome.overflow() {
        println!(
            "Program {} over cap by {}: {} project(s) deferred, {} unranked",
            report.key,
            report.shortfall,
            report.deferred_projects.len(),
            report.unranked_projects.len()
        );
    } else {
        println!(
            "Program {} within cap: {} of {} committed",
            program.key(),
            outcome.ranked().accepted_total,
            program.budget_cap
        );
    }
    if write {
        write_json(program_path, &program, "program file")?;
    }
    print_json(&outcome)
}

fn cmd_add_project(
    config: &PlanningConfig,
    program_path: &Path,
    book: &str,
    project_path: &Path,
    budget: u64,
) -> Result<()> {
    let mut program = load_program(program_path)?;
    let record: ProjectRecord = read_json(project_path, "project record")?;
    let project = record
        .into_project(config.schema_min_year)
        .with_context(|| format!("Project record rejected: {:?}", project_path))?;

    let allocation = Allocator::from_config(config).add_project(
        &mut program,
        parse_book(book)?,
        project,
        Money::new(budget),
    )?;
    write_json(program_path, &program, "program file")?;

    println!(
        "Allocated {} to book {} ({}){}",
        allocation.project_id(),
        allocation.book_id,
        allocation.budget,
        if allocation.deferred { ", deferred" } else { "" }
    );
    Ok(())
}

fn cmd_remove_project(
    config: &PlanningConfig,
    program_path: &Path,
    book: &str,
    project_id: &str,
) -> Result<()> {
    let mut program = load_program(program_path)?;
    let removed = Allocator::from_config(config).remove_project(
        &mut program,
        parse_book(book)?,
        &ProjectId::new(project_id),
    )?;
    write_json(program_path, &program, "program file")?;
    println!("Removed {} from book {}", removed.project_id(), removed.book_id);
    Ok(())
}

fn cmd_transition(program_path: &Path, target: ProgramStatus) -> Result<()> {
    let mut program = load_program(program_path)?;
    let from = program.status();
    lifecycle::transition(&mut program, target)?;
    write_json(program_path, &program, "program file")?;
    println!("Program {}: {} -> {}", program.key(), from, program.status());
    Ok(())
}

fn cmd_reconcile(
    config: &PlanningConfig,
    corpus_path: &Path,
    batch_path: &Path,
    output: Option<&Path>,
    write_corpus: bool,
) -> Result<()> {
    let mut corpus: Vec<Project> = read_json(corpus_path, "project corpus")?;
    let batch: Vec<ExternalRecord> = read_json(batch_path, "registry batch")?;

    let result = Reconciler::from_config(config).reconcile(&batch, &mut corpus);
    let summary = result.summary();
    println!(
        "Reconciled {} record(s): {} succeeded, {} failed ({}%)",
        summary.total, summary.successes, summary.failures, summary.success_percentage
    );
    for failure in &result.failures {
        println!("  {} [{}] {}", failure.external_id, failure.kind, failure.detail);
    }

    if write_corpus {
        write_json(corpus_path, &corpus, "project corpus")?;
    }
    match output {
        Some(path) => write_json(path, &result, "reconciliation report"),
        None => print_json(&result),
    }
}
