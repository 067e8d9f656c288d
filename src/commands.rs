use anyhow::{Context, Result};
use console::style;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingProvider, get_config_dir};
use crate::database::lancedb::VectorStore;
use crate::database::sqlite::Database;
use crate::embeddings::ollama::OllamaClient;
use crate::indexer::LearnRequest;
use crate::llm::create_backend;
use crate::report::{Evidence, Report};
use crate::review::{Candidate, ReviewEngine, ReviewRequest};

/// How `review` prints its report
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(&config_dir).context("Failed to load configuration")
}

/// Index name derived from a repository path or URL: its last segment
/// without a `.git` suffix
#[inline]
pub fn default_index_name(source: &str) -> String {
    let trimmed = source.trim().trim_end_matches(['/', '\\']);
    let last = trimmed
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches(".git");

    if last.is_empty() {
        "repository".to_string()
    } else {
        last.to_string()
    }
}

/// Learn a repository into a named pattern index
#[inline]
pub async fn learn(source: String, name: Option<String>, extensions: Vec<String>) -> Result<()> {
    let config = load_config()?;
    let index_name = name.unwrap_or_else(|| default_index_name(&source));
    info!("Learning '{}' from {}", index_name, source);

    let engine = ReviewEngine::open(config).await?.with_progress(true);
    let request = LearnRequest {
        source,
        extensions,
        index_name,
    };

    println!("📚 Learning {} as '{}'...", request.source, request.index_name);
    let summary = engine.learn(&request).await?;

    println!("✅ Learned '{}'", summary.index_name);
    println!("   Files discovered: {}", summary.files_discovered);
    println!("   Files indexed: {}", summary.files_indexed);
    println!("   Units indexed: {}", summary.units_indexed);
    println!("   Duration: {:.1}s", summary.duration.as_secs_f64());

    if !summary.warnings.is_empty() {
        println!();
        println!("⚠️  {} file(s) were skipped:", summary.warnings.len());
        for warning in &summary.warnings {
            println!("   • {}: {}", warning.path, warning.reason);
        }
    }

    Ok(())
}

/// Plain-text rendering of a report
#[inline]
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    let _ = writeln!(out, "Review against '{}'", report.index_name);
    let _ = writeln!(
        out,
        "{} finding(s): {} high, {} medium, {} low",
        summary.total, summary.high, summary.medium, summary.low
    );

    for finding in &report.findings {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "[{}] {} {}:{}-{}",
            finding.severity.as_str().to_uppercase(),
            finding.category.as_str(),
            finding.file,
            finding.line_start,
            finding.line_end
        );
        let _ = writeln!(out, "  {}", finding.message);
        if let Some(fix) = &finding.suggested_fix {
            let _ = writeln!(out, "  fix: {}", fix);
        }
        for evidence in &finding.evidence {
            match evidence {
                Evidence::Deviation {
                    attribute,
                    observed,
                    expected,
                } => {
                    let _ = writeln!(
                        out,
                        "  evidence: {} is {}, similar code has {}",
                        attribute, observed, expected
                    );
                }
                Evidence::Model { statement } => {
                    let _ = writeln!(out, "  model: {}", statement);
                }
            }
        }
    }

    if !report.praised.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Consistent with the repository:");
        for praise in &report.praised {
            let _ = writeln!(out, "  {} {}", praise.file, praise.unit);
        }
    }

    if !summary.notes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Notes:");
        for note in &summary.notes {
            let _ = writeln!(out, "  {}", note);
        }
    }

    out
}

/// Review files and directories against a learned index
#[inline]
pub async fn review(
    files: Vec<String>,
    index: String,
    extensions: Vec<String>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config()?;
    let engine = ReviewEngine::open(config).await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, abandoning model calls");
            interrupt.cancel();
        }
    });

    let request = ReviewRequest {
        index_name: index,
        candidates: files.into_iter().map(Candidate::file).collect(),
        extensions,
    };
    let report = engine.review(&request, cancel).await?;

    let rendered = match format {
        OutputFormat::Text => render_text(&report),
        OutputFormat::Json => report.to_json()?,
    };

    match output {
        Some(path) => {
            write_report(&path, &rendered)?;
            eprintln!(
                "Report written to {}",
                style(path.display()).cyan()
            );
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn write_report(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

/// List all learned pattern indexes
#[inline]
pub async fn list_indexes() -> Result<()> {
    let engine = ReviewEngine::open(load_config()?).await?;
    let indexes = engine.list_indexes().await?;

    if indexes.is_empty() {
        println!("No repositories have been learned yet.");
        println!("Use 'pattern-review learn <path-or-url>' to learn one.");
        return Ok(());
    }

    println!("Pattern Indexes ({} total):", indexes.len());
    println!();

    for index in &indexes {
        println!("📚 {}", index.name);
        println!("   Source: {}", index.source);
        println!(
            "   Units: {} from {} file(s)",
            index.unit_count, index.file_count
        );
        println!(
            "   Embeddings: {} ({} dimensions)",
            index.embedding_model, index.dimension
        );
        println!(
            "   Learned: {}",
            index.indexed_date.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!();
    }

    Ok(())
}

/// Show one index with its indexing warnings
#[inline]
pub async fn show_index(name: &str) -> Result<()> {
    let engine = ReviewEngine::open(load_config()?).await?;
    let (record, warnings) = engine.describe_index(name).await?;

    println!("📚 {}", record.name);
    println!("   Source: {}", record.source);
    println!("   Snapshot: {}", record.table_name);
    println!(
        "   Units: {} from {} file(s)",
        record.unit_count, record.file_count
    );
    println!(
        "   First learned: {}",
        record.created_date.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "   Last learned: {}",
        record.indexed_date.format("%Y-%m-%d %H:%M:%S UTC")
    );

    match record.parsed_statistics() {
        Ok(statistics) => {
            println!("   Dominant naming: {}", statistics.dominant_naming.as_str());
            println!("   Median complexity: {:.2}", statistics.median_complexity);
            println!("   Mean nesting: {:.2}", statistics.mean_nesting);
            println!(
                "   Units handling errors: {:.0}%",
                statistics.error_handling_fraction * 100.0
            );
        }
        Err(e) => println!("   ⚠️  Statistics unreadable: {}", e),
    }

    if warnings.is_empty() {
        println!("   ✅ Every discovered file was indexed");
    } else {
        println!();
        println!("⚠️  Skipped files ({}):", warnings.len());
        for warning in &warnings {
            println!("   • {}: {}", warning.file_path, warning.reason);
        }
    }

    Ok(())
}

/// Delete a learned index and its snapshot
#[inline]
pub async fn delete_index(name: &str) -> Result<()> {
    let engine = ReviewEngine::open(load_config()?).await?;

    if engine.delete_index(name).await? {
        println!("Index deleted: {}", name);
        println!("✓ Catalog entry and warnings deleted");
        println!("✓ Pattern snapshot deleted");
    } else {
        println!("No index named '{}'", name);
    }

    Ok(())
}

/// Show the health of every store and backend
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;

    println!("📊 Pattern Review Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let database = match Database::initialize_from_config_dir(config.get_base_dir()).await {
        Ok(database) => {
            println!("   ✅ SQLite: Connected");
            Some(database)
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
            None
        }
    };

    println!();
    println!("🔍 Vector Database Status:");
    match VectorStore::new(&config).await {
        Ok(store) => match store.table_names().await {
            Ok(tables) => {
                println!("   ✅ LanceDB: Connected");
                println!("   📦 Snapshots: {}", tables.len());
            }
            Err(e) => println!("   ⚠️  LanceDB: Connected but unreadable - {}", e),
        },
        Err(e) => println!("   ❌ LanceDB: Failed to connect - {}", e),
    }

    println!();
    println!("🧮 Embedding Status:");
    match config.embedding.provider {
        EmbeddingProvider::Hashing => {
            println!(
                "   ✅ Hashing: local, {} dimensions",
                config.embedding.dimension
            );
        }
        EmbeddingProvider::Ollama => match OllamaClient::new(&config) {
            Ok(client) => match client.health_check().await {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected to {}:{}",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Model: {}", config.ollama.model);
                    println!("   🔢 Batch Size: {}", config.ollama.batch_size);
                }
                Err(e) => println!("   ⚠️  Ollama: Connected but unhealthy - {}", e),
            },
            Err(e) => println!("   ❌ Ollama: Failed to connect - {}", e),
        },
    }

    println!();
    println!("🤖 Model Backend Status:");
    match create_backend(&config) {
        Ok(Some(backend)) => {
            println!("   ✅ {}: {}", backend.name(), config.llm.endpoint);
        }
        Ok(None) if !config.llm.enabled => {
            println!("   💤 Disabled: reviews use structural findings only");
        }
        Ok(None) => {
            println!("   ⚠️  No API key for {}", config.llm.endpoint);
            println!(
                "   Set llm.api_key or one of the supported environment variables to enable it"
            );
        }
        Err(e) => println!("   ❌ Invalid backend configuration - {}", e),
    }

    if let Some(database) = database {
        println!();
        println!("📚 Index Overview:");
        match database.list_indexes().await {
            Ok(indexes) if indexes.is_empty() => println!("   📭 No repositories learned yet"),
            Ok(indexes) => {
                let units: i64 = indexes.iter().map(|i| i.unit_count).sum();
                println!("   📊 Total Indexes: {}", indexes.len());
                println!("   📄 Total Units: {}", units);
            }
            Err(e) => println!("   ❌ Failed to load indexes: {}", e),
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'pattern-review learn <path-or-url>' to learn a repository");
    println!("   • Use 'pattern-review review <files> --index <name>' to review code");
    println!("   • Use 'pattern-review list' to see learned indexes");

    Ok(())
}

/// Print the effective configuration
#[inline]
pub fn show_config() -> Result<()> {
    let config = load_config()?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embeddings:").bold().yellow());
    eprintln!("  Provider: {}", style(config.embedding.provider.as_str()).cyan());
    match config.embedding.provider {
        EmbeddingProvider::Ollama => {
            match config.ollama_url() {
                Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
                Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
            }
            eprintln!("  Model: {}", style(&config.ollama.model).cyan());
            eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
            eprintln!(
                "  Dimension: {}",
                style(config.ollama.embedding_dimension).cyan()
            );
        }
        EmbeddingProvider::Hashing => {
            eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
        }
    }

    eprintln!();
    eprintln!("{}", style("Model Backend:").bold().yellow());
    eprintln!("  Enabled: {}", style(config.llm.enabled).cyan());
    eprintln!("  Endpoint: {}", style(&config.llm.endpoint).cyan());
    eprintln!("  Model: {}", style(&config.llm.model).cyan());
    eprintln!(
        "  API Key: {}",
        if config.llm.resolved_api_key().is_some() {
            style("set").green()
        } else {
            style("not set").yellow()
        }
    );
    eprintln!("  Temperature: {}", style(config.llm.temperature).cyan());

    eprintln!();
    eprintln!("{}", style("Indexing:").bold().yellow());
    eprintln!(
        "  Extensions: {}",
        style(config.indexing.normalized_extensions().join(", ")).cyan()
    );
    eprintln!(
        "  Ignored Directories: {}",
        style(config.indexing.ignore_dirs.join(", ")).cyan()
    );
    eprintln!(
        "  Max File Size: {} bytes",
        style(config.indexing.max_file_bytes).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Review:").bold().yellow());
    eprintln!("  Neighbors (top_k): {}", style(config.review.top_k).cyan());
    eprintln!("  Workers: {}", style(config.review.workers).cyan());
    eprintln!(
        "  Std Multiplier: {}",
        style(config.review.std_multiplier).cyan()
    );
    eprintln!(
        "  Error Handling Consensus: {}",
        style(config.review.error_handling_consensus).cyan()
    );
    eprintln!(
        "  Line Length Floor: {} characters",
        style(config.review.line_length_floor).cyan()
    );

    let config_path = config
        .config_file_path()
        .context("Failed to get config file path")?;
    eprintln!();
    eprintln!("Config file: {}", style(config_path.display()).dim());

    Ok(())
}

/// Write the effective configuration to disk so it can be edited
#[inline]
pub fn init_config() -> Result<()> {
    let config = load_config()?;
    let config_path = config
        .config_file_path()
        .context("Failed to get config file path")?;

    if config_path.exists() {
        eprintln!(
            "{}",
            style("⚠ A configuration file already exists, leaving it untouched").yellow()
        );
    } else {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
    }
    eprintln!(
        "Configuration file: {}",
        style(config_path.display()).cyan()
    );

    Ok(())
}
