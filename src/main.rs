//! CLI entry point for the embeddings engine.
//!
//! Builds word-vector containers, indexes newline-delimited documents and runs
//! free-text or SQL searches against a saved index.

use anyhow::{Context, Result};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use embedsql::{Content, Document, Embeddings, EmbeddingsError, ScoringMethod, Settings, WordVectors};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic search over an embeddings index
#[derive(Parser)]
#[command(
    name = "embedsql",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic search over an embeddings index",
    long_about = "Index documents as vectors and query them with free text or SQL.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Index directory (overrides `index_path` from settings)
    #[arg(short, long, global = true)]
    index: Option<PathBuf>,

    /// Show debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a word-vector container from a tokens file
    #[command(
        after_help = "Examples:\n  embedsql build-vectors corpus.txt vectors/words --dimensions 300 --min-count 2"
    )]
    BuildVectors {
        /// Newline-delimited training text
        tokens: PathBuf,

        /// Output path; `.wvec` is appended when missing
        output: PathBuf,

        /// Vector dimensions
        #[arg(short, long, default_value_t = 300)]
        dimensions: usize,

        /// Discard words seen fewer times than this
        #[arg(short, long, default_value_t = 1)]
        min_count: usize,
    },

    /// Build an index from a file with one document per line
    #[command(
        after_help = "Lines that parse as JSON objects are indexed as objects.\n\nExamples:\n  embedsql index news.txt --content\n  embedsql index docs.jsonl --model vectors/words.wvec"
    )]
    Index {
        /// Input file
        input: PathBuf,

        /// Store text and data for SQL queries
        #[arg(long)]
        content: bool,

        /// Model name or word-vector container (overrides settings)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Search a saved index with free text or SQL
    #[command(
        after_help = "Examples:\n  embedsql search \"feel good story\"\n  embedsql search \"select id, text, score from txtai where similar('lottery') and score >= 0.2\""
    )]
    Search {
        /// Free-text query or SQL statement
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 3)]
        limit: usize,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let mut settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(index) = &cli.index {
        settings.index_path = index.clone();
    }

    let level = if cli.debug || settings.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();

    match run(cli.command, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, mut settings: Settings) -> Result<()> {
    match command {
        Commands::BuildVectors {
            tokens,
            output,
            dimensions,
            min_count,
        } => {
            let start = Instant::now();
            let path = WordVectors::build(&tokens, dimensions, min_count, &output)
                .with_context(|| format!("Failed to build word vectors from {}", tokens.display()))?;
            println!(
                "Built word vectors at {} in {:.2}s",
                path.display(),
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Index {
            input,
            content,
            model,
        } => {
            if content {
                settings.embeddings.content = true;
            }
            if let Some(model) = model {
                settings.embeddings.path = model;
            }

            let documents = read_documents(&input)?;
            let start = Instant::now();
            let mut embeddings = Embeddings::new(settings.embeddings.clone())?;
            if embeddings.config().scoring != ScoringMethod::None {
                embeddings.score(documents.iter().cloned())?;
            }
            let indexed = embeddings.index(documents)?;
            embeddings.save(&settings.index_path)?;
            println!(
                "Indexed {indexed} documents into {} in {:.2}s",
                settings.index_path.display(),
                start.elapsed().as_secs_f64()
            );
        }

        Commands::Search { query, limit, json } => {
            let mut embeddings = Embeddings::new(settings.embeddings.clone())?;
            embeddings
                .load(&settings.index_path)
                .with_context(|| format!("No index at {}", settings.index_path.display()))?;

            let rows = embeddings.search(&query, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No results");
            } else {
                for row in rows {
                    println!("{}", serde_json::Value::Object(row));
                }
            }
        }

        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

/// Reads one document per non-empty line, numbering ids by line.
fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut documents = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let content = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value @ serde_json::Value::Object(_)) => Content::from(value),
            _ => Content::from(line),
        };
        documents.push(Document::new(number, content));
    }
    Ok(documents)
}

fn report(error: &anyhow::Error) {
    eprintln!("Error: {error:#}");
    if let Some(error) = error.downcast_ref::<EmbeddingsError>() {
        eprintln!("Status: {}", error.status_code());
        for suggestion in error.recovery_suggestions() {
            eprintln!("  - {suggestion}");
        }
    }
}
