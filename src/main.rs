//! Binary entry point for the `crt` CLI: issue a turn against a thread's
//! memory, drive the contradiction ledger's goal queue, and run
//! one-shot Semantic String Engine analysis over a document. Grounded on
//! the teacher's `cli`/`commands` split in style (subcommand-per-concern,
//! `clap` derive) — the teacher's own `main.rs` is a stale placeholder
//! referencing a removed example API, so the command surface itself is
//! built fresh against this crate's own `Session`/`SseNavigator`.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result as AnyResult};
use clap::{Parser, Subcommand};
use crt_core::config::{ContradictionConfig, CrtConfig, SseConfig, StorageConfig};
use crt_core::contradiction::{Candidate, Detector};
use crt_core::embedding::{CachingEmbedder, Embedder, HashEmbedder};
use crt_core::extraction::TwoTierExtractor;
use crt_core::ledger::ContradictionLedger;
use crt_core::llm::FactTupleProvider;
use crt_core::memory::SqliteMemoryStore;
use crt_core::models::{FactTuple, LedgerId};
use crt_core::observability;
use crt_core::session::{QueryRequest, ResponseType, Session};
use crt_core::sse::facade::SearchMethod;
use crt_core::sse::{chunk_text, extract_claims, CoherenceTracker, SseNavigator};
use crt_core::storage::{GlobalStore, ProfileMultiStore};
use std::collections::HashMap;
use std::path::PathBuf;

/// No LLM provider is configured for the CLI by default; Tier B
/// extraction silently degrades to the hard-slot-derived hybrid fallback
/// (spec.md §4.4) rather than failing a turn.
struct NullFactProvider;

impl FactTupleProvider for NullFactProvider {
    fn extract_tuples(&self, _utterance: &str) -> crt_core::Result<Vec<FactTuple>> {
        Ok(Vec::new())
    }
}

/// Memory-first conversational substrate: query threads, work the
/// contradiction ledger, and analyze documents with the Semantic String
/// Engine.
#[derive(Parser)]
#[command(name = "crt", version, about)]
struct Cli {
    /// Path to a TOML config file. Defaults are used if omitted.
    #[arg(long, global = true, env = "CRT_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding per-thread and global SQLite databases.
    #[arg(long, global = true, env = "CRT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Conversation thread to operate on.
    #[arg(long, global = true, default_value = "default")]
    thread: String,

    /// Log format: `pretty` or `json`.
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sends one utterance through the gate protocol and prints the
    /// response: a belief with its supporting metrics, or an admission
    /// of uncertainty with a clarification question.
    Query {
        /// The utterance text.
        text: String,
        /// Mark this utterance as user-emphasized (doubles reinforcement).
        #[arg(long)]
        important: bool,
    },
    /// Works the contradiction ledger's goal queue.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Runs the Semantic String Engine over a document.
    Sse {
        #[command(subcommand)]
        action: SseAction,
    },
    /// Prints the effective configuration as TOML.
    Config,
    /// Clears what's been asked this session without touching persisted
    /// state (a no-op for a one-shot CLI invocation; exposed for
    /// long-lived embedders of `Session`).
    Reset,
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Prints the next unresolved ledger entry that hasn't been asked
    /// this session, if any.
    Next,
    /// Marks an entry as asked.
    Ask {
        /// The ledger entry id.
        id: String,
    },
    /// Resolves an entry, optionally naming the winning value.
    Resolve {
        /// The ledger entry id.
        id: String,
        /// The value the user confirmed correct.
        #[arg(long)]
        winner: Option<String>,
    },
    /// Dismisses an entry without a trust-affecting outcome.
    Dismiss {
        /// The ledger entry id.
        id: String,
    },
}

#[derive(Subcommand)]
enum SseAction {
    /// Chunks, extracts claims from, and reports coherence for a
    /// document, printing the coherence report.
    Analyze {
        /// Path to the document.
        file: PathBuf,
    },
    /// Analyzes a document, then runs one keyword search over its claims.
    Query {
        /// Path to the document.
        file: PathBuf,
        /// Keyword query text.
        query: String,
        /// Maximum number of results.
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
}

fn load_config(cli: &Cli) -> AnyResult<CrtConfig> {
    let config = match &cli.config {
        Some(path) => CrtConfig::load(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => CrtConfig::default(),
    };
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        directories::ProjectDirs::from("dev", "crt-core", "crt")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

fn storage_config_for(base: &StorageConfig, path: PathBuf) -> AnyResult<StorageConfig> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let mut config = base.clone();
    config.database_path = path.to_string_lossy().into_owned();
    Ok(config)
}

/// Builds a fully-wired [`Session`] for `thread_id`, opening (or
/// creating) its per-thread memory/ledger database and the shared global
/// database under `data_dir`.
fn build_session(cli: &Cli, config: &CrtConfig) -> AnyResult<Session> {
    let dir = data_dir(cli);
    let thread_path = dir.join("threads").join(format!("{}.sqlite3", cli.thread));
    let global_path = dir.join("global.sqlite3");

    let memory_storage = storage_config_for(&config.storage, thread_path.clone())?;
    let global_storage = storage_config_for(&config.storage, global_path)?;

    let memory = Box::new(SqliteMemoryStore::open(memory_storage.clone())?);
    let ledger = ContradictionLedger::open(memory_storage)?;
    let profile = ProfileMultiStore::open(global_storage.clone())?;
    let global = GlobalStore::open(global_storage)?;

    let embedder: Box<dyn Embedder> = Box::new(CachingEmbedder::with_capacity(HashEmbedder::new(), 1024));
    let extractor = TwoTierExtractor::with_provider(Box::new(NullFactProvider) as Box<dyn FactTupleProvider>, config.extraction.clone());
    let detector = Detector::heuristic_only(config.contradiction.clone());

    Ok(Session::new(cli.thread.clone(), config.clone(), memory, ledger, profile, Some(global), embedder, extractor, detector))
}

fn run_query(cli: &Cli, config: &CrtConfig, text: String, important: bool) -> AnyResult<()> {
    let mut session = build_session(cli, config)?;
    let request = QueryRequest {
        text,
        user_marked_important: important,
    };
    let response = session.respond(&request).context("processing turn")?;

    match response.response_type {
        ResponseType::Belief => {
            println!("BELIEF");
            if let Some(answer) = &response.answer {
                println!("  answer:           {answer}");
            }
            println!("  memory_alignment: {:.3}", response.metrics.memory_alignment);
            println!("  confidence:       {:.3}", response.metrics.confidence);
            println!("  intent_alignment: {:.3}", response.metrics.intent_alignment);
        }
        ResponseType::Uncertainty => {
            println!("UNCERTAINTY");
            if let Some(reason) = &response.uncertainty_reason {
                println!("  reason: {reason}");
            }
            if let Some(question) = &response.clarification_question {
                println!("  clarification: {question}");
            }
        }
    }
    if response.embedding_unavailable {
        println!("  (embedding capability unavailable; retrieval skipped)");
    }
    for entry in &response.ledger_entries {
        println!("  ledger entry recorded: {} (slot={:?})", entry.ledger_id, entry.slot);
    }
    Ok(())
}

fn run_ledger(cli: &Cli, config: &CrtConfig, action: LedgerAction) -> AnyResult<()> {
    let mut session = build_session(cli, config)?;
    match action {
        LedgerAction::Next => match session.ledger_next()? {
            Some(entry) => {
                println!("{}", entry.ledger_id);
                if let Some(question) = &entry.suggested_question {
                    println!("{question}");
                }
            }
            None => println!("no unresolved ledger entries"),
        },
        LedgerAction::Ask { id } => {
            let entry = session.ledger_mark_asked(&LedgerId::new(id))?;
            println!("marked asked: {}", entry.ledger_id);
        }
        LedgerAction::Resolve { id, winner } => {
            let entry = session.ledger_resolve(&LedgerId::new(id), winner)?;
            println!("resolved: {}", entry.ledger_id);
        }
        LedgerAction::Dismiss { id } => {
            let entry = session.ledger_dismiss(&LedgerId::new(id))?;
            println!("dismissed: {}", entry.ledger_id);
        }
    }
    Ok(())
}

fn run_sse(config: &CrtConfig, action: SseAction) -> AnyResult<()> {
    match action {
        SseAction::Analyze { file } => {
            let (navigator, report) = analyze_document(config, &file)?;
            println!("claims: {}", navigator.all_claims().len());
            println!("contradictions: {}", navigator.contradictions().len());
            println!("disagreement_density: {:.3}", report.disagreement_density);
            println!("isolated_claims: {}", report.num_isolated_claims);
            for pair in navigator.contradictions() {
                println!("{}", navigator.format_contradiction(pair));
            }
        }
        SseAction::Query { file, query, k } => {
            let (navigator, _report) = analyze_document(config, &file)?;
            let results = navigator.query(&query, k, SearchMethod::Keyword, None, None);
            println!("{}", navigator.format_search_results(&results, Some(k)));
        }
    }
    Ok(())
}

fn analyze_document(config: &CrtConfig, file: &PathBuf) -> AnyResult<(SseNavigator, crt_core::sse::CoherenceReport)> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let doc_id = file.file_stem().and_then(|s| s.to_str()).unwrap_or("doc").to_string();
    let sse_config: SseConfig = config.sse.clone();
    let embedder = HashEmbedder::new();

    let chunks = chunk_text(&text, &doc_id, &sse_config);
    let chunk_embeddings: Vec<Vec<f32>> = chunks.iter().map(|chunk| embedder.embed(&chunk.text)).collect::<crt_core::Result<_>>()?;
    let claims = extract_claims(&chunks, &chunk_embeddings, &doc_id, &sse_config);

    let claim_embeddings: HashMap<String, Vec<f32>> = claims
        .iter()
        .map(|claim| embedder.embed(&claim.claim_text).map(|embedding| (claim.claim_id.clone(), embedding)))
        .collect::<crt_core::Result<_>>()?;

    let candidates: Vec<Candidate<'_>> = claims
        .iter()
        .map(|claim| Candidate {
            id: &claim.claim_id,
            text: &claim.claim_text,
            embedding: &claim_embeddings[&claim.claim_id],
        })
        .collect();
    let contradiction_config: ContradictionConfig = config.contradiction.clone();
    let detector = Detector::heuristic_only(contradiction_config);
    let pairs = detector.detect(&candidates);

    let tracker = CoherenceTracker::build(&claims, &pairs);
    let report = tracker.report();
    let navigator = SseNavigator::new(text, claims, pairs, Vec::new());
    Ok((navigator, report))
}

fn run_config(config: &CrtConfig) -> AnyResult<()> {
    let rendered = toml::to_string_pretty(config).context("serializing configuration")?;
    println!("{rendered}");
    Ok(())
}

fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    let log_format = if cli.log_format.eq_ignore_ascii_case("json") {
        observability::LogFormat::Json
    } else {
        observability::LogFormat::Pretty
    };
    let logging = observability::LoggingConfig {
        format: log_format,
        ..observability::LoggingConfig::from_env()
    };
    if let Err(err) = observability::init(&logging) {
        eprintln!("warning: {err}");
    }

    let config = load_config(&cli)?;

    match cli.command {
        Command::Query { text, important } => run_query(&cli, &config, text, important),
        Command::Ledger { action } => run_ledger(&cli, &config, action),
        Command::Sse { action } => run_sse(&config, action),
        Command::Config => run_config(&config),
        Command::Reset => {
            let mut session = build_session(&cli, &config)?;
            session.reset();
            println!("session state reset for thread {}", cli.thread);
            Ok(())
        }
    }
}
