use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Default OpenAI-compatible endpoint exposed by the Gemini API.
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Log file used when `DOCQA_LOG_FILE` is unset.
pub const DEFAULT_LOG_FILE: &str = "logs/docqa.log";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document QA server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credential for the hosted LLM and embedding APIs.
    pub google_api_key: String,
    /// Base URL of the OpenAI-compatible API used for chat and embeddings.
    pub llm_base_url: String,
    /// Chat model used to synthesize answers.
    pub chat_model: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Backend holding the published vector snapshots.
    pub vector_store: VectorStoreBackend,
    /// Directory used by the local vector store.
    pub vector_store_dir: PathBuf,
    /// Base URL of the Qdrant instance (required for the Qdrant backend).
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Alias and collection-name prefix used in Qdrant.
    pub qdrant_collection_prefix: String,
    /// Directory holding uploaded documents.
    pub knowledge_base_dir: PathBuf,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of a page.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved for unfiltered questions.
    pub retrieval_top_k: usize,
    /// Number of chunks retrieved when a question targets one document.
    pub filtered_top_k: usize,
    /// Upper bound on request bodies, including uploads.
    pub max_upload_bytes: usize,
    /// HTTP server port.
    pub server_port: u16,
    /// File receiving a copy of the logs; `None` disables file logging.
    pub log_file: Option<PathBuf>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI-compatible embeddings endpoint.
    Remote,
    /// Deterministic offline hashing embeddings.
    Hashing,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    /// Embedded LanceDB tables on local disk.
    Local,
    /// Collections behind an alias in a Qdrant instance.
    Qdrant,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let vector_store = parse_or(&optional, "VECTOR_STORE", VectorStoreBackend::Local)?;
        let qdrant_url = optional("QDRANT_URL");
        if vector_store == VectorStoreBackend::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".to_string()));
        }

        let chunk_size: usize = parse_or(&optional, "CHUNK_SIZE", 1000)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".to_string()));
        }

        Ok(Self {
            google_api_key: optional("GOOGLE_API_KEY")
                .ok_or_else(|| ConfigError::MissingVariable("GOOGLE_API_KEY".to_string()))?,
            llm_base_url: optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            chat_model: optional("CHAT_MODEL").unwrap_or_else(|| "gemini-1.5-flash".to_string()),
            embedding_provider: parse_or(
                &optional,
                "EMBEDDING_PROVIDER",
                EmbeddingProvider::Remote,
            )?,
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-004".to_string()),
            embedding_dimension: parse_or(&optional, "EMBEDDING_DIMENSION", 768)?,
            vector_store,
            vector_store_dir: optional("VECTOR_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./chroma_db")),
            qdrant_url,
            qdrant_api_key: optional("QDRANT_API_KEY"),
            qdrant_collection_prefix: optional("QDRANT_COLLECTION_PREFIX")
                .unwrap_or_else(|| "docqa".to_string()),
            knowledge_base_dir: optional("KNOWLEDGE_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./knowledge_base")),
            chunk_size,
            chunk_overlap: parse_or(&optional, "CHUNK_OVERLAP", 200)?,
            retrieval_top_k: parse_or(&optional, "RETRIEVAL_TOP_K", 4)?,
            filtered_top_k: parse_or(&optional, "FILTERED_TOP_K", 8)?,
            max_upload_bytes: parse_or(&optional, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            server_port: parse_or(&optional, "SERVER_PORT", 8000)?,
            log_file: match optional("DOCQA_LOG_FILE") {
                None => Some(PathBuf::from(DEFAULT_LOG_FILE)),
                Some(value) if value.trim().eq_ignore_ascii_case("off") => None,
                Some(value) => Some(PathBuf::from(value.trim())),
            },
        })
    }
}

fn parse_or<T, F>(optional: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" | "openai" | "gemini" => Ok(Self::Remote),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl FromStr for VectorStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// A missing `GOOGLE_API_KEY` aborts the process here.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        llm_base_url = %config.llm_base_url,
        chat_model = %config.chat_model,
        embedding_provider = ?config.embedding_provider,
        vector_store = ?config.vector_store,
        knowledge_base_dir = %config.knowledge_base_dir.display(),
        server_port = config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
