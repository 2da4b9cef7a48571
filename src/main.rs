//! # Paperdex CLI (`pdx`)
//!
//! The `pdx` binary drives the indexing pipeline and answers questions over
//! the indexed corpus.
//!
//! ## Usage
//!
//! ```bash
//! pdx --config ./config/pdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdx scan` | Register documents and fingerprints from the roots |
//! | `pdx index` | Extract, chunk, and embed changed documents |
//! | `pdx index --full` | Rebuild every store from scratch |
//! | `pdx ask "<question>"` | Answer a question with citations |
//! | `pdx stream "<question>"` | Answer a question as a live stream |
//! | `pdx search "<query>"` | Offline keyword search |
//! | `pdx autoscan` | Quick change check, then index in the background |
//! | `pdx open <file> --page N` | Open a document at a page |
//! | `pdx stats` | Show index statistics |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use paperdex::{autoscan, config, engine::Engine, stats};

/// Paperdex CLI — local PDF indexing and question answering with
/// page-accurate citations.
#[derive(Parser)]
#[command(
    name = "pdx",
    about = "Paperdex — local PDF indexing and question answering with page-accurate citations",
    version,
    long_about = "Paperdex walks configured document roots, extracts and chunks PDF text \
    (with OCR fallback for scanned pages), and answers natural-language questions over the \
    indexed corpus. Missing capabilities degrade answers instead of causing errors."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pdx.toml`. Storage, scan roots, chunking,
    /// retrieval, embedding, and LLM settings are read from this file.
    #[arg(long, global = true, default_value = "./config/pdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Register documents and fingerprints from the scan roots.
    ///
    /// Walks the configured roots, refreshes the basename→location mapping
    /// and the fingerprint registry, and reports what changed. Does not
    /// extract any text.
    Scan,

    /// Bring the index up to date with the filesystem.
    ///
    /// Re-extracts changed documents, purging their previous chunks first.
    /// Embeds new chunks when an embedding provider is configured.
    Index {
        /// Rebuild everything from scratch instead of updating incrementally.
        #[arg(long)]
        full: bool,
    },

    /// Answer a question over the indexed corpus.
    ///
    /// Prints the answer followed by its sources (document title, page,
    /// and a snippet). Without a configured LLM the matching extracts are
    /// printed directly.
    Ask {
        /// The question to answer.
        question: String,

        /// Override the configured number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question as a live stream of text.
    ///
    /// Streams model deltas when the provider supports it, word bursts
    /// otherwise.
    Stream {
        /// The question to answer.
        question: String,
    },

    /// Offline keyword search over the lexical index.
    ///
    /// Works without any embedding or LLM provider. Useful for checking
    /// what the index contains.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop results scoring below this threshold.
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Quick change check, then index in the background when needed.
    ///
    /// Lists candidate files under a bounded file and time budget, diffs
    /// them against the fingerprint registry, and spawns an incremental
    /// indexing pass when something is new or changed.
    Autoscan,

    /// Open a document at a page with the platform handler.
    Open {
        /// Document basename (e.g. `thesis.pdf`).
        basename: String,

        /// 1-based page number to open at.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show index statistics.
    ///
    /// Prints document, chunk, and embedding counts plus the size of each
    /// store file.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Scan => {
            let engine = Engine::detect(cfg);
            let outcome = engine.scan()?;
            println!(
                "Scan complete: {} changed, {} unchanged.",
                outcome.changed.len(),
                outcome.unchanged.len()
            );
        }
        Commands::Index { full } => {
            let engine = Engine::detect(cfg);
            let outcome = if full {
                engine.index_full().await?
            } else {
                engine.index_incremental().await?
            };
            println!(
                "Indexed {} files: {} chunks added, {} removed.",
                outcome.files, outcome.chunks_added, outcome.chunks_removed
            );
        }
        Commands::Ask { question, top_k } => {
            let engine = Engine::detect(cfg);
            let answer = engine.ask_with_sources(&question, top_k).await;
            println!("{}\n", answer.answer);
            if !answer.sources.is_empty() {
                println!("Sources:");
                for source in &answer.sources {
                    println!("  {} p.{} — {}", source.title, source.page, source.snippet);
                }
            }
        }
        Commands::Stream { question } => {
            let engine = Arc::new(Engine::detect(cfg));
            let mut rx = engine.stream(&question);
            use std::io::Write;
            let mut stdout = std::io::stdout();
            while let Some(delta) = rx.recv().await {
                print!("{}", delta);
                stdout.flush()?;
            }
            println!();
        }
        Commands::Search {
            query,
            top_k,
            min_score,
        } => {
            let engine = Engine::detect(cfg);
            let hits = engine.search(&query, top_k, min_score).await;
            if hits.is_empty() {
                println!("No results.");
            }
            for hit in hits {
                let snippet: String = hit.text.chars().take(120).collect();
                println!("{:.3}  {} p.{}  {}", hit.score, hit.title, hit.page, snippet);
            }
        }
        Commands::Autoscan => {
            let engine = Arc::new(Engine::detect(cfg));
            match autoscan::check_and_maybe_scan(&engine).await {
                Some(handle) => {
                    println!("Changes detected, indexing...");
                    handle.await?;
                    println!("Done.");
                }
                None => println!("Index is up to date."),
            }
        }
        Commands::Open { basename, page } => {
            let engine = Engine::detect(cfg);
            let uri = engine.open(&basename, page)?;
            println!("Opened {}", uri);
        }
        Commands::Stats => {
            let gathered = stats::gather(&cfg.storage.data_dir);
            print!("{}", stats::render(&gathered));
        }
    }

    Ok(())
}
