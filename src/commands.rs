use anyhow::{Context, Result, bail};
use console::style;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::database::VectorIndex;
use crate::database::lancedb::vector_store::BUILD_LOCK_FILE;
use crate::embeddings::{OllamaClient, chunk_catalog};
use crate::eval::EvalLogger;
use crate::harvester::{HarvestReport, Harvester};
use crate::mcp;
use crate::service::RagService;

/// Write the default configuration file unless one exists
#[inline]
pub fn init_config(config: &Config) -> Result<()> {
    let path = config.config_file_path();
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        println!("Edit it directly or run 'toolsybio config --show' to inspect it.");
        return Ok(());
    }

    config.save()?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Harvest tool descriptions from the registry, resuming from the stored catalog
#[inline]
pub async fn harvest_catalog(config: &Config, max_tools: Option<usize>) -> Result<HarvestReport> {
    let max_tools = max_tools.unwrap_or(config.registry.max_tools);
    let store = CatalogStore::new(config.catalog_path());
    let harvester = Harvester::new(&config.registry, store)?;

    info!(
        "Harvesting up to {} tools from {}",
        max_tools, config.registry.base_url
    );
    let report = harvester.harvest(max_tools).await?;

    println!("{}", style("Harvest finished").bold().green());
    println!("  Resumed with:   {} tools", report.resumed);
    println!("  Newly added:    {} tools", report.added);
    println!("  Pages fetched:  {}", report.pages_fetched);
    if report.failed_details > 0 {
        println!(
            "  {} {} tools could not be fetched and will be retried next run",
            style("Skipped:").yellow(),
            report.failed_details
        );
    }
    println!("  Stopped:        {}", report.stop_reason);
    println!(
        "  Catalog:        {} tools in {}",
        report.catalog.len(),
        config.catalog_path().display()
    );

    Ok(report)
}

/// Chunk the catalog and rebuild the vector index from scratch
#[inline]
pub async fn build_index(config: &Config) -> Result<usize> {
    let catalog = CatalogStore::new(config.catalog_path())
        .load()
        .context("Failed to load catalog")?;
    if catalog.is_empty() {
        bail!(
            "Catalog at {} is empty; run 'toolsybio harvest' first",
            config.catalog_path().display()
        );
    }

    let chunks = chunk_catalog(&catalog, &config.chunking)?;
    println!(
        "Split {} tools into {} chunks (size {}, overlap {})",
        catalog.len(),
        chunks.len(),
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );

    let client = OllamaClient::new(&config.ollama)?;
    let index = VectorIndex::build(&config.vector_database_path(), &chunks, Arc::new(client))
        .await
        .context("Failed to build vector index")?;
    let count = index.count().await?;

    println!(
        "{} {} chunks indexed at {}",
        style("Index built:").bold().green(),
        count,
        config.vector_database_path().display()
    );
    Ok(count)
}

/// Answer one question and print the answer with its sources
#[inline]
pub async fn ask_question(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let service = RagService::open(config)
        .await
        .context("Failed to open the RAG service")?;
    let outcome = service.ask(query, top_k).await?;

    println!("{}", style("Answer").bold().cyan());
    println!("{}", outcome.answer.answer.trim_end());
    println!();
    println!("{} (top {})", style("Sources").bold().cyan(), outcome.k);
    if outcome.answer.chunks.is_empty() {
        println!("  (none)");
    }
    for hit in &outcome.answer.chunks {
        println!("  - {}: {}", style(&hit.chunk.name).bold(), hit.chunk.source);
    }

    match &outcome.log {
        Ok(path) => println!("\nLogged to {}", path.display()),
        Err(e) => println!("\n{} {}", style("Warning: interaction was not logged:").yellow(), e),
    }

    Ok(())
}

/// Serve the question-answering tools over MCP on stdio
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    // stdout carries the protocol; everything else goes through tracing on stderr
    match OllamaClient::new(&config.ollama).and_then(|client| client.health_check()) {
        Ok(()) => info!("Ollama is healthy at {}:{}", config.ollama.host, config.ollama.port),
        Err(e) => warn!("Ollama is not ready, tool calls may fail: {:#}", e),
    }

    let service = RagService::open(config)
        .await
        .context("Failed to open the RAG service")?;
    let server = mcp::build_server(Arc::new(service)).await;

    server.serve_stdio().await
}

/// Print catalog, index, log and model status
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("ToolsyBio Status").bold().cyan());
    println!("{}", "=".repeat(40));

    println!("{}", style("Catalog").bold());
    match CatalogStore::new(config.catalog_path()).load() {
        Ok(catalog) => println!("   Tools harvested: {}", catalog.len()),
        Err(e) => println!("   {} {}", style("Unreadable:").red(), e),
    }

    println!("{}", style("Vector index").bold());
    let index_path = config.vector_database_path();
    if index_path.join(BUILD_LOCK_FILE).exists() {
        println!("   {}", style("A build is in progress").yellow());
    } else {
        let client = OllamaClient::new(&config.ollama)?;
        match VectorIndex::open(&index_path, Arc::new(client)).await {
            Ok(index) => match index.count().await {
                Ok(count) => println!("   Chunks indexed: {} ({} dimensions)", count, index.dimension()),
                Err(e) => println!("   {} {}", style("Unreadable:").red(), e),
            },
            Err(e) => println!("   {} {}", style("Not available:").yellow(), e),
        }
    }

    println!("{}", style("Interaction logs").bold());
    match EvalLogger::new(config.query_log_dir()).count() {
        Ok(count) => println!("   Logged questions: {}", count),
        Err(e) => println!("   {} {}", style("Unreadable:").red(), e),
    }

    println!("{}", style("Ollama").bold());
    match OllamaClient::new(&config.ollama).and_then(|client| client.health_check()) {
        Ok(()) => println!(
            "   Connected at {}:{} (embedding: {}, generation: {})",
            config.ollama.host,
            config.ollama.port,
            config.ollama.embedding_model,
            config.ollama.generation_model
        ),
        Err(e) => println!("   {} {:#}", style("Unavailable:").red(), e),
    }

    Ok(())
}
