use super::*;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.batch_size, 16);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert_eq!(config.store.collection, "aurora_memory");
    assert_eq!(config.store.backend, StoreBackend::LanceDb);
    assert!((config.generation.reasoning_temperature - 0.7).abs() < f32::EPSILON);
    assert!((config.generation.summarization_temperature - 0.3).abs() < f32::EPSILON);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.chat_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.generation.summarization_temperature = 2.5;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTemperature(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.store.collection = "bad name!".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidCollection(_))
    ));

    let mut invalid_config = config;
    invalid_config.chunking.chunk_overlap = invalid_config.chunking.chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(1000, 1000))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let mut parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    parsed_config.base_dir = config.base_dir.clone();
    assert_eq!(config, parsed_config);
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_embedding_model("mxbai-embed-large".to_string()).is_ok());
    assert!(config.set_chat_model("qwen2.5:7b".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_embedding_model(String::new()).is_err());
    assert!(config.set_chat_model("   ".to_string()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());

    assert_eq!(config.protocol, "https");
    assert_eq!(config.chat_model, "qwen2.5:7b");
}

#[test]
fn load_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.vector_store_path(), temp_dir.path().join("vectors"));
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.retrieval.top_k = 8;
    config.store.backend = StoreBackend::File;
    config.store.collection = "notes".to_string();

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path()).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn partial_file_fills_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 3\n\n[store]\nbackend = \"file\"\n",
    )
    .expect("should write config");

    let config = Config::load(temp_dir.path()).expect("should load partial config");
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.store.backend, StoreBackend::File);
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.chunking.chunk_size, 1000);
}

#[test]
fn invalid_file_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn env_overrides_apply() {
    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[
            ("AURORA_OLLAMA_HOST", "gpu-box"),
            ("AURORA_OLLAMA_CHAT_MODEL", "mistral"),
            ("AURORA_RETRIEVAL_TOP_K", "9"),
            ("AURORA_CHUNKING_CHUNK_SIZE", "500"),
            ("AURORA_CHUNKING_CHUNK_OVERLAP", "50"),
            ("AURORA_GENERATION_REASONING_TEMPERATURE", "0.1"),
            ("AURORA_STORE_BACKEND", "file"),
            ("AURORA_STORE_COLLECTION", "work"),
            ("PATH", "/usr/bin"),
        ]))
        .expect("overrides should apply");

    assert_eq!(config.ollama.host, "gpu-box");
    assert_eq!(config.ollama.chat_model, "mistral");
    assert_eq!(config.retrieval.top_k, 9);
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.chunk_overlap, 50);
    assert!((config.generation.reasoning_temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(config.store.backend, StoreBackend::File);
    assert_eq!(config.store.collection, "work");
    assert!(config.validate().is_ok());
}

#[test]
fn env_override_rejects_bad_numbers() {
    let mut config = Config::default();
    let result = config.apply_env_overrides(env(&[("AURORA_RETRIEVAL_TOP_K", "many")]));

    assert!(matches!(
        result,
        Err(ConfigError::InvalidEnvValue { ref var, .. }) if var == "AURORA_RETRIEVAL_TOP_K"
    ));
}

#[test]
fn env_override_ignores_unknown_and_home() {
    let mut config = Config::default();
    let before = config.clone();
    config
        .apply_env_overrides(env(&[
            ("AURORA_HOME", "/tmp/elsewhere"),
            ("AURORA_SOMETHING_ELSE", "x"),
        ]))
        .expect("unknown variables are ignored");

    assert_eq!(config, before);
}

#[test]
fn relative_store_path_resolves_against_base_dir() {
    let mut config = Config {
        base_dir: PathBuf::from("/data/aurora"),
        ..Config::default()
    };
    config.store.path = Some(PathBuf::from("db"));
    assert_eq!(config.vector_store_path(), PathBuf::from("/data/aurora/db"));

    config.store.path = Some(PathBuf::from("/mnt/vectors"));
    assert_eq!(config.vector_store_path(), PathBuf::from("/mnt/vectors"));
}
