//! CLI definition and command dispatch for memvec.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to a [`VectorStore`].
//!
//! ## Configuration Precedence
//!
//! Configuration is resolved with the following precedence (highest to lowest):
//! 1. CLI flags (`--data-dir`, `--provider`)
//! 2. Config file from `--config` or `MEMVEC_CONFIG`
//! 3. `~/.memvec/config.yaml`
//! 4. Built-in defaults

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::ui::format::{format_millis, format_thousands, truncate_str};
use crate::ui::table::{self, HitRow, RecordRow};
use crate::ui::{ColorMode, MessageType, Style};

use memvec_core::{
    EmbeddingProviderKind, MemoryNode, MemoryType, MemvecConfig, MemvecError, Priority, Snapshot,
    SyncQueue, VectorRecord, VectorSearchFilter, VectorStore,
};
use memvec_db::{HnswIndex, HnswParams};

// ============================================================================
// CLI Definition
// ============================================================================

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// memvec – embedded semantic memory for conversational agents
#[derive(Parser, Debug)]
#[command(name = "memvec")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file (default: ~/.memvec/config.yaml)
    #[arg(long, global = true, env = "MEMVEC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store directory, overriding store.path
    #[arg(long, global = true, env = "MEMVEC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Embedding provider: candle, http, or hash
    #[arg(long, global = true, env = "MEMVEC_PROVIDER")]
    pub provider: Option<EmbeddingProviderKind>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "MEMVEC_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed and store a memory
    #[command(after_help = r#"EXAMPLES:
    # Store a preference
    memvec store "The user likes pizza" --type preference --tag food

    # Replace a memory by id
    memvec store "Prefers dark mode" --id ui-theme

    # Route the write through the sync queue
    memvec store "Meeting moved to Friday" --queue --priority high
"#)]
    Store {
        /// Memory text
        content: String,

        /// Record id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Memory type: conversation, fact, preference, task, note, or any label
        #[arg(long = "type", value_name = "TYPE")]
        memory_type: Option<MemoryType>,

        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Write through the sync queue and flush before exiting
        #[arg(long)]
        queue: bool,

        /// Queue priority: high, normal, or low
        #[arg(long, default_value = "normal", requires = "queue")]
        priority: Priority,
    },

    /// Semantic search over stored memories
    #[command(after_help = r#"EXAMPLES:
    # Search with configured defaults
    memvec search "what food does the user like"

    # Only facts tagged 'work', at least 0.5 similar
    memvec search "deadline" --type fact --tag work --min-score 0.5

    # Pipe to jq
    memvec search "pizza" --json | jq '.[0].id'
"#)]
    Search {
        /// Query text
        query: String,

        /// Maximum number of results (default: search.maxResults)
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Minimum cosine similarity (default: search.minScore)
        #[arg(long)]
        min_score: Option<f32>,

        /// Only memories of this type
        #[arg(long = "type", value_name = "TYPE")]
        memory_type: Option<MemoryType>,

        /// Only memories with this tag (repeatable, all must match)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },

    /// Show one memory
    Get {
        /// Record id
        id: String,
    },

    /// Delete one memory
    Delete {
        /// Record id
        id: String,
    },

    /// List every memory, oldest first
    List,

    /// Show store, index and embedder statistics
    Stats,

    /// Export every memory as a JSON snapshot
    #[command(after_help = r#"EXAMPLES:
    # Write to a file
    memvec export --output backup.json

    # Write to stdout
    memvec export > backup.json
"#)]
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a JSON snapshot
    Import {
        /// Snapshot file produced by `memvec export`
        file: PathBuf,
    },

    /// Delete every memory
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Evict the least recently used memories
    #[command(after_help = r#"EXAMPLES:
    # Free space after a "Storage full" error
    memvec evict 10
"#)]
    Evict {
        /// Number of memories to evict
        count: usize,
    },

    /// Check the search index and rebuild it when unhealthy
    Verify,

    /// Show the effective configuration and its warnings
    Config,

    /// Cosine similarity of two texts
    Similarity {
        /// First text
        a: String,
        /// Second text
        b: String,
    },

    /// Measure index recall against brute-force search
    #[command(after_help = r#"EXAMPLES:
    # Default run: 1000 vectors, 50 queries, recall@10
    memvec bench

    # Larger vectors, fixed seed
    memvec bench --count 5000 --dim 128 --seed 7
"#)]
    Bench {
        /// Number of indexed vectors
        #[arg(long, default_value_t = 1000)]
        count: usize,

        /// Number of queries
        #[arg(long, default_value_t = 50)]
        queries: usize,

        /// Vector dimension
        #[arg(long, default_value_t = 32)]
        dim: usize,

        /// Neighbors compared per query
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// Random seed for vectors and level assignment
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

// ============================================================================
// Entry point
// ============================================================================

/// Parse arguments, run one command and map the outcome to an exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let color_mode = ColorMode::from_str(&cli.color).unwrap_or(ColorMode::Auto);
    let style = Style::new(color_mode);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your config at ~/.memvec/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to load configuration",
                    Some(&format!("{:#}", e)),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let json = cli.json;
    let result = match cli.command {
        Command::Config => handle_config(&style, &config, json),
        Command::Bench {
            count,
            queries,
            dim,
            k,
            seed,
        } => handle_bench(&style, count, queries, dim, k, seed, json),
        command => open_store(&config).and_then(|store| dispatch(&style, &config, store, command, json)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let storage_full = e
                .downcast_ref::<MemvecError>()
                .is_some_and(MemvecError::is_storage_full);
            if storage_full {
                eprintln!(
                    "{}",
                    style.error_with_context(
                        &format!("{:#}", e),
                        None,
                        Some("Free space with `memvec evict <n>` and retry"),
                    )
                );
            } else {
                eprintln!("{}", style.message(MessageType::Err, &format!("{:#}", e)));
            }
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "memvec_core={0},memvec_db={0},memvec_model={0},memvec={0}",
            level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<MemvecConfig> {
    let mut config = MemvecConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config = config.with_store_path(dir);
    }
    if let Some(provider) = cli.provider {
        config = config.with_provider(provider);
    }
    Ok(config)
}

fn open_store(config: &MemvecConfig) -> Result<Arc<VectorStore>> {
    let store = VectorStore::from_config(config).context("Failed to open memory store")?;
    Ok(Arc::new(store))
}

fn dispatch(
    style: &Style,
    config: &MemvecConfig,
    store: Arc<VectorStore>,
    command: Command,
    json: bool,
) -> Result<()> {
    match command {
        Command::Store {
            content,
            id,
            memory_type,
            tags,
            queue,
            priority,
        } => {
            let mut node = MemoryNode::new(content).with_tags(tags);
            if let Some(id) = id {
                node = node.with_id(id);
            }
            if let Some(memory_type) = memory_type {
                node = node.with_type(memory_type);
            }
            if queue {
                handle_store_queued(style, config, store, node, priority, json)
            } else {
                handle_store(style, config, &store, node, json)
            }
        }
        Command::Search {
            query,
            max_results,
            min_score,
            memory_type,
            tags,
        } => handle_search(style, &store, &query, max_results, min_score, memory_type, tags, json),
        Command::Get { id } => handle_get(style, &store, &id, json),
        Command::Delete { id } => handle_delete(style, &store, &id, json),
        Command::List => handle_list(style, &store, json),
        Command::Stats => handle_stats(style, config, &store, json),
        Command::Export { output } => handle_export(style, &store, output),
        Command::Import { file } => handle_import(style, &store, file, json),
        Command::Clear { yes } => handle_clear(style, &store, yes, json),
        Command::Evict { count } => handle_evict(style, &store, count, json),
        Command::Verify => handle_verify(style, &store, json),
        Command::Similarity { a, b } => handle_similarity(style, &store, &a, &b, json),
        Command::Config | Command::Bench { .. } => {
            Err(anyhow!("command does not use the memory store"))
        }
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn record_json(record: &VectorRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "content": record.content,
        "type": record.memory_type.to_string(),
        "tags": record.tags,
        "created": record.created,
        "lastAccessed": record.last_accessed,
        "accessCount": record.access_count,
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// The configured provider failed to load and the hash embedding stands in.
fn using_fallback(config: &MemvecConfig, store: &VectorStore) -> bool {
    config.embedding.provider != EmbeddingProviderKind::Hash && store.embedder().is_degraded()
}

fn handle_store(
    style: &Style,
    config: &MemvecConfig,
    store: &VectorStore,
    node: MemoryNode,
    json: bool,
) -> Result<()> {
    let record = store.store(node)?;

    if json {
        return print_json(&record_json(&record));
    }
    println!(
        "{}",
        style.message(MessageType::Ok, &format!("Stored memory {}", style.record_id(&record.id)))
    );
    if using_fallback(config, store) {
        println!(
            "{}",
            style.message(
                MessageType::Hint,
                "Embedded with the hash fallback; install a model for semantic search",
            )
        );
    }
    Ok(())
}

fn handle_store_queued(
    style: &Style,
    config: &MemvecConfig,
    store: Arc<VectorStore>,
    node: MemoryNode,
    priority: Priority,
    json: bool,
) -> Result<()> {
    let queue = SyncQueue::new(store, config.sync.clone())?;
    let id = queue.queue_store(node, priority);
    let stats = queue.sync_now();
    queue.shutdown();

    if queue.is_dirty(&id) {
        let cause = stats.last_error.unwrap_or_else(|| "unknown error".to_string());
        bail!("Queued write for {} did not sync: {}", id, cause);
    }

    if json {
        return print_json(&json!({ "id": id, "priority": priority.to_string(), "sync": stats }));
    }
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Synced memory {} ({} priority)", style.record_id(&id), priority),
        )
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_search(
    style: &Style,
    store: &VectorStore,
    query: &str,
    max_results: Option<usize>,
    min_score: Option<f32>,
    memory_type: Option<MemoryType>,
    tags: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut options = store.search_options();
    if let Some(max_results) = max_results {
        options = options.with_max_results(max_results);
    }
    if let Some(min_score) = min_score {
        options = options.with_min_score(min_score);
    }
    let mut filter = VectorSearchFilter::new().with_tags(tags);
    if let Some(memory_type) = memory_type {
        filter = filter.with_type(memory_type);
    }
    options = options.with_filter(filter);

    let hits = store.try_search(query, &options, |_| true)?;

    if json {
        let results: Vec<serde_json::Value> = hits
            .iter()
            .map(|hit| {
                let mut value = record_json(&hit.record);
                value["score"] = json!(hit.score);
                value
            })
            .collect();
        return print_json(&serde_json::Value::Array(results));
    }

    if hits.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!("No memories scored {:.2} or higher", options.min_score),
            )
        );
        return Ok(());
    }

    let rows: Vec<HitRow> = hits
        .iter()
        .map(|hit| HitRow {
            score: style.score(hit.score),
            id: hit.record.id.clone(),
            memory_type: hit.record.memory_type.to_string(),
            content: hit.record.content.clone(),
        })
        .collect();
    println!("{}", table::render_hits_table(&rows));
    Ok(())
}

fn handle_get(style: &Style, store: &VectorStore, id: &str, json: bool) -> Result<()> {
    store.initialize()?;
    let record = store
        .get_by_id(id)
        .ok_or_else(|| anyhow!("No memory with id '{}'", id))?;

    if json {
        return print_json(&record_json(&record));
    }
    let tags = if record.tags.is_empty() {
        "-".to_string()
    } else {
        record.tags.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    println!("{}", style.section(&format!("MEMORY {}", style.record_id(&record.id))));
    println!();
    println!("  {}", style.key_value("Type", &record.memory_type.to_string()));
    println!("  {}", style.key_value("Tags", &tags));
    println!(
        "  {}",
        style.key_value("Created", &record.created.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    );
    println!(
        "  {}",
        style.key_value(
            "Last accessed",
            &record.last_accessed.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        )
    );
    println!("  {}", style.key_value("Accesses", &record.access_count.to_string()));
    println!();
    println!("{}", record.content);
    Ok(())
}

fn handle_delete(style: &Style, store: &VectorStore, id: &str, json: bool) -> Result<()> {
    if !store.delete(id)? {
        bail!("No memory with id '{}'", id);
    }

    if json {
        return print_json(&json!({ "deleted": id }));
    }
    println!(
        "{}",
        style.message(MessageType::Ok, &format!("Deleted memory {}", style.record_id(id)))
    );
    Ok(())
}

fn handle_list(style: &Style, store: &VectorStore, json: bool) -> Result<()> {
    let records = store.get_all()?;

    if json {
        let values: Vec<serde_json::Value> = records.iter().map(record_json).collect();
        return print_json(&serde_json::Value::Array(values));
    }
    if records.is_empty() {
        println!("{}", style.message(MessageType::Info, "No memories stored"));
        return Ok(());
    }

    let rows: Vec<RecordRow> = records
        .into_iter()
        .map(|record| RecordRow {
            id: record.id,
            memory_type: record.memory_type.to_string(),
            tags: record.tags.into_iter().collect(),
            access_count: record.access_count,
            last_accessed: record.last_accessed,
            content: record.content,
        })
        .collect();
    println!("{}", table::render_records_table(&rows));
    Ok(())
}

fn handle_stats(style: &Style, config: &MemvecConfig, store: &VectorStore, json: bool) -> Result<()> {
    store.initialize()?;
    let stats = store.get_stats();

    if json {
        return print_json(&serde_json::to_value(&stats)?);
    }

    println!("{}", style.section("STATS"));
    println!();
    let metrics = [
        ("Backend", stats.backend.clone()),
        ("Records", format_thousands(stats.records as u64)),
        ("Dimension", stats.dimension.to_string()),
        ("Index live", format_thousands(stats.index_live as u64)),
        ("Index tombstones", format_thousands(stats.index_tombstones as u64)),
        ("Index rebuilds", stats.rebuilds.to_string()),
        ("Embedding provider", stats.embedding.provider.clone()),
        (
            "Fallback embeddings",
            format_thousands(stats.embedding.fallback_embeddings),
        ),
        (
            "Cache",
            format!(
                "{}/{}",
                format_thousands(stats.embedding.cache_len as u64),
                format_thousands(stats.embedding.cache_capacity as u64)
            ),
        ),
    ];
    println!("{}", table::render_metrics_table(&metrics));
    if using_fallback(config, store) {
        println!();
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                "Primary embedding provider unavailable; using the hash fallback",
            )
        );
    }
    Ok(())
}

fn handle_export(style: &Style, store: &VectorStore, output: Option<PathBuf>) -> Result<()> {
    let snapshot = store.export()?;

    match output {
        Some(path) => {
            snapshot
                .write_to(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                style.message(
                    MessageType::Ok,
                    &format!("Exported {} memories to {}", snapshot.len(), path.display()),
                )
            );
        }
        None => println!("{}", snapshot.to_json()?),
    }
    Ok(())
}

fn handle_import(style: &Style, store: &VectorStore, file: PathBuf, json: bool) -> Result<()> {
    let snapshot = Snapshot::read_from(&file)
        .with_context(|| format!("Failed to read snapshot {}", file.display()))?;
    let report = store.import(snapshot)?;

    if json {
        return print_json(&serde_json::to_value(&report)?);
    }
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!("Imported {} memories from {}", report.imported, file.display()),
        )
    );
    if report.failed > 0 {
        println!(
            "{}",
            style.message(MessageType::Warn, &format!("{} entries rejected", report.failed))
        );
        for error in &report.errors {
            println!("{}", style.message_detail("Rejected", error));
        }
    }
    Ok(())
}

fn handle_clear(style: &Style, store: &VectorStore, yes: bool, json: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete every memory without --yes");
    }
    let count = store.get_all()?.len();
    store.clear()?;

    if json {
        return print_json(&json!({ "cleared": count }));
    }
    println!(
        "{}",
        style.message(MessageType::Ok, &format!("Cleared {} memories", count))
    );
    Ok(())
}

fn handle_evict(style: &Style, store: &VectorStore, count: usize, json: bool) -> Result<()> {
    let evicted = store.evict_least_recently_used(count)?;

    if json {
        return print_json(&json!({ "evicted": evicted }));
    }
    println!(
        "{}",
        style.message(MessageType::Ok, &format!("Evicted {} memories", evicted.len()))
    );
    for id in &evicted {
        println!("{}", style.message_detail("Evicted", &style.record_id(id)));
    }
    Ok(())
}

fn handle_verify(style: &Style, store: &VectorStore, json: bool) -> Result<()> {
    let report = store.verify_index()?;

    if json {
        return print_json(&json!({ "healthy": report.is_healthy(), "report": report }));
    }
    if report.is_healthy() {
        println!(
            "{}",
            style.message(
                MessageType::Ok,
                &format!("Index healthy ({} live, {} tombstones)", report.live, report.tombstones),
            )
        );
    } else {
        println!(
            "{}",
            style.message(MessageType::Warn, "Index was inconsistent and has been rebuilt")
        );
        println!(
            "{}",
            style.message_detail("Unreachable", &report.unreachable.to_string())
        );
        println!(
            "{}",
            style.message_detail("Dangling refs", &report.dangling_refs.to_string())
        );
        println!(
            "{}",
            style.message_detail("Duplicate ids", &report.duplicate_ids.to_string())
        );
    }
    Ok(())
}

fn handle_similarity(style: &Style, store: &VectorStore, a: &str, b: &str, json: bool) -> Result<()> {
    let score = store.similarity(a, b);

    if json {
        return print_json(&json!({ "a": a, "b": b, "similarity": score }));
    }
    println!(
        "{}  {} / {}",
        style.score(score),
        truncate_str(a, 40),
        truncate_str(b, 40)
    );
    Ok(())
}

fn handle_config(style: &Style, config: &MemvecConfig, json: bool) -> Result<()> {
    let warnings = config.validate()?;

    if json {
        return print_json(&json!({ "config": config, "warnings": warnings }));
    }
    print!("{}", serde_yaml::to_string(config)?);
    for warning in &warnings {
        println!("{}", style.message(MessageType::Warn, warning));
    }
    Ok(())
}

// ============================================================================
// Bench
// ============================================================================

fn random_unit_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Exact top-k ids by cosine similarity of unit vectors.
fn brute_force_top_k(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<usize> {
    let mut scored: Vec<(f32, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (dot(v, query), i))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, i)| i).collect()
}

fn handle_bench(
    style: &Style,
    count: usize,
    queries: usize,
    dim: usize,
    k: usize,
    seed: u64,
    json: bool,
) -> Result<()> {
    if count == 0 || queries == 0 || dim == 0 || k == 0 {
        bail!("--count, --queries, --dim and --k must all be positive");
    }

    let params = HnswParams::default().with_seed(seed);
    let ef = params.ef_search.max(k);
    let mut rng = StdRng::seed_from_u64(seed);
    let vectors: Vec<Vec<f32>> = (0..count).map(|_| random_unit_vector(&mut rng, dim)).collect();
    let query_vectors: Vec<Vec<f32>> =
        (0..queries).map(|_| random_unit_vector(&mut rng, dim)).collect();

    let started = Instant::now();
    let mut index = HnswIndex::new(dim, params);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(i.to_string(), v.clone())?;
    }
    let build_ms = started.elapsed().as_secs_f64() * 1000.0;

    let mut found = 0usize;
    let mut expected = 0usize;
    let mut ann_ms = 0.0f64;
    let mut exact_ms = 0.0f64;
    for query in &query_vectors {
        let started = Instant::now();
        let hits = index.search(query, k, ef)?;
        ann_ms += started.elapsed().as_secs_f64() * 1000.0;

        let started = Instant::now();
        let truth = brute_force_top_k(&vectors, query, k);
        exact_ms += started.elapsed().as_secs_f64() * 1000.0;

        expected += truth.len();
        found += truth
            .iter()
            .filter(|i| hits.iter().any(|hit| hit.id == i.to_string()))
            .count();
    }
    let recall = found as f64 / expected.max(1) as f64;
    let ann_avg = ann_ms / queries as f64;
    let exact_avg = exact_ms / queries as f64;

    if json {
        return print_json(&json!({
            "count": count,
            "queries": queries,
            "dimension": dim,
            "k": k,
            "ef": ef,
            "seed": seed,
            "recall": recall,
            "buildMs": build_ms,
            "annQueryMs": ann_avg,
            "exactQueryMs": exact_avg,
        }));
    }

    println!("{}", style.section("BENCH"));
    println!();
    let recall_label = format!("Recall@{}", k);
    let metrics = [
        ("Vectors", format_thousands(count as u64)),
        ("Queries", format_thousands(queries as u64)),
        ("Dimension", dim.to_string()),
        ("ef", ef.to_string()),
        (recall_label.as_str(), format!("{:.3}", recall)),
        ("Build", format_millis(build_ms)),
        ("ANN query (avg)", format_millis(ann_avg)),
        ("Exact query (avg)", format_millis(exact_avg)),
    ];
    println!("{}", table::render_metrics_table(&metrics));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_command() {
        let cli = Cli::try_parse_from([
            "memvec", "search", "pizza", "--min-score", "0.5", "--json", "-vv", "--provider",
            "hash",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.provider, Some(EmbeddingProviderKind::Hash));
        match cli.command {
            Command::Search { query, min_score, .. } => {
                assert_eq!(query, "pizza");
                assert_eq!(min_score, Some(0.5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_store_parses_type_and_tags() {
        let cli = Cli::try_parse_from([
            "memvec", "store", "likes pizza", "--type", "preference", "--tag", "food", "--tag",
            "likes",
        ])
        .unwrap();
        match cli.command {
            Command::Store {
                memory_type, tags, queue, priority, ..
            } => {
                assert_eq!(memory_type, Some(MemoryType::Preference));
                assert_eq!(tags, vec!["food", "likes"]);
                assert!(!queue);
                assert_eq!(priority, Priority::Normal);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_priority_requires_queue() {
        assert!(Cli::try_parse_from(["memvec", "store", "x", "--priority", "high"]).is_err());
        assert!(
            Cli::try_parse_from(["memvec", "store", "x", "--queue", "--priority", "high"]).is_ok()
        );
    }

    #[test]
    fn test_brute_force_top_k_orders_by_similarity() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
        assert_eq!(brute_force_top_k(&vectors, &[1.0, 0.0], 2), vec![0, 2]);
    }

    #[test]
    fn test_random_unit_vector_is_normalized() {
        let mut rng = StdRng::seed_from_u64(1);
        let v = random_unit_vector(&mut rng, 16);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-4);
    }
}
