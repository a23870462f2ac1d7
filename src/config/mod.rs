// Configuration management module
// TOML settings for the registry, Ollama, chunking and retrieval

pub mod settings;


use console::style;

pub use settings::{Config, ConfigError, OllamaConfig, RegistryConfig, RetrievalConfig};

/// Print the effective configuration
#[inline]
pub fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", style("ToolsyBio Configuration").bold().cyan());
    println!();
    println!("{} {}", style("Data directory:").bold(), config.base_dir.display());
    println!(
        "{} {}",
        style("Config file:").bold(),
        config.config_file_path().display()
    );
    println!();

    println!("{}", style("[registry]").yellow());
    println!("  base_url      = {}", config.registry.base_url);
    println!("  query         = {:?}", config.registry.query);
    println!(
        "  sort          = {} ({})",
        config.registry.sort, config.registry.order
    );
    println!("  max_tools     = {}", config.registry.max_tools);
    println!(
        "  delays        = {} ms per tool, {} ms per page",
        config.registry.detail_delay_ms, config.registry.page_delay_ms
    );
    println!();

    println!("{}", style("[ollama]").yellow());
    println!("  url             = {}", config.ollama.ollama_url()?);
    println!("  embedding_model = {}", config.ollama.embedding_model);
    println!("  generation_model = {}", config.ollama.generation_model);
    println!("  batch_size      = {}", config.ollama.batch_size);
    println!();

    println!("{}", style("[chunking]").yellow());
    println!("  chunk_size    = {}", config.chunking.chunk_size);
    println!("  chunk_overlap = {}", config.chunking.chunk_overlap);
    println!();

    println!("{}", style("[retrieval]").yellow());
    println!("  top_k         = {}", config.retrieval.top_k);

    Ok(())
}
