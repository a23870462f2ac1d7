use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::with_base_dir("/tmp/toolsybio");
    assert_eq!(config.registry.base_url, "https://bio.tools");
    assert_eq!(config.registry.query, "sequence analysis");
    assert_eq!(config.registry.max_tools, 40_000);
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.generation_model, "mistral");
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 100);
    assert_eq!(config.retrieval.top_k, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::with_base_dir("/tmp/toolsybio");

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.generation_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.registry.base_url = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.registry.max_tools = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.chunking.chunk_overlap = invalid_config.chunking.chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(1000, 1000))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = OllamaConfig::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::with_base_dir(PathBuf::new());
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [registry]
        query = ""
        max_tools = 25
        "#,
    )
    .expect("should parse partial toml");

    assert_eq!(parsed.registry.query, "");
    assert_eq!(parsed.registry.max_tools, 25);
    assert_eq!(parsed.registry.sort, "last_update");
    assert_eq!(parsed.ollama, OllamaConfig::default());
    assert_eq!(parsed.retrieval.top_k, 3);
}

#[test]
fn unknown_keys_are_ignored() {
    // The vector size comes from the embedding model, not from configuration
    let parsed: Config = toml::from_str(
        r#"
        [ollama]
        embedding_model = "nomic-embed-text"
        embedding_dimension = 768
        "#,
    )
    .expect("should parse toml with unknown keys");

    assert_eq!(parsed.ollama.embedding_model, "nomic-embed-text");
    assert_eq!(parsed.ollama.batch_size, OllamaConfig::default().batch_size);
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(
        config.catalog_path(),
        temp_dir.path().join("data").join("biotools_data.json")
    );
    assert_eq!(config.vector_database_path(), temp_dir.path().join("vectors"));
    assert_eq!(
        config.query_log_dir(),
        temp_dir.path().join("logs").join("queries")
    );
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path().join("nested"));
    config.registry.max_tools = 12;
    config.chunking.chunk_size = 500;
    config.chunking.chunk_overlap = 50;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let reloaded = Config::load(temp_dir.path().join("nested")).expect("should reload config");
    assert_eq!(config, reloaded);
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 200\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}
