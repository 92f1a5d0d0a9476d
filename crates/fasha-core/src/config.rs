use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FashaError, Result};

/// Top-level configuration for the Fasha assistant.
///
/// Loaded from `~/.fasha/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FashaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl FashaConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FashaConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| FashaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the order ledger and the generated API key.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.fasha/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. "127.0.0.1".
    pub bind: String,
    /// API server port.
    pub port: u16,
    /// Accepted `X-API-Key` values. Extended by `FASHA_API_KEYS`.
    pub api_keys: Vec<String>,
    /// Maximum chat requests per second across all clients.
    pub rate_limit_per_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            api_keys: vec![],
            rate_limit_per_sec: 50,
        }
    }
}

/// Language model settings used for classification, extraction and phrasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" for an OpenAI-compatible endpoint, "mock" for offline runs.
    pub provider: String,
    /// Chat-completions endpoint.
    pub endpoint: String,
    /// Model name sent with each request.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            timeout_secs: 30,
        }
    }
}

/// Embedding backend for the catalog index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "openai" for the embeddings endpoint, "hash" for offline token hashing.
    pub provider: String,
    /// Embeddings endpoint.
    pub endpoint: String,
    /// Embedding model name.
    pub model: String,
    /// Vector dimensionality.
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: "https://api.openai.com/v1/embeddings".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Product catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file with the product records to index at startup.
    pub products_path: String,
    /// Number of hits retrieved for product discovery.
    pub search_top_k: usize,
    /// Hits scoring at or below this similarity count as no match.
    pub min_score: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            products_path: "~/.fasha/products.json".to_string(),
            search_top_k: 5,
            min_score: 0.05,
        }
    }
}

/// Dialogue state machine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Number of history turns kept per session.
    pub history_turns: usize,
    /// Idle minutes after which a session is reset to IDLE.
    pub session_timeout_minutes: u32,
    /// Upper bound for each collaborator call within a turn.
    pub turn_timeout_secs: u64,
    /// Item descriptions shorter than this are treated as unresolved.
    pub min_item_chars: usize,
    /// Classify SEARCH turns further into employee/affiliate/advisor modes.
    pub search_mode_routing: bool,
    /// Maximum accepted message length in characters.
    pub max_message_chars: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            history_turns: 15,
            session_timeout_minutes: 60,
            turn_timeout_secs: 30,
            min_item_chars: 3,
            search_mode_routing: false,
            max_message_chars: 2000,
        }
    }
}

/// Phrase lists driving commitment and payment detection.
///
/// Matching is case-insensitive substring containment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Phrases signalling the shopper has decided to buy.
    pub commitment: Vec<String>,
    /// Order-detail phrases that also count as commitment.
    pub order_detail: Vec<String>,
    /// Phrases confirming a completed payment.
    pub payment_confirmation: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            commitment: owned(&[
                "saya pesan",
                "jadi pesan",
                "jadi beli",
                "checkout",
                "order sekarang",
                "ambil yang ini",
                "saya mau pesan",
                "saya mau beli",
                "saya mau order",
                "i order",
                "i'll order",
                "order now",
                "take this one",
                "i'll take",
            ]),
            order_detail: owned(&["size", "ukuran", "pcs", "buah", "qty"]),
            payment_confirmation: owned(&[
                "sudah transfer",
                "sudah bayar",
                "udah transfer",
                "udah bayar",
                "bukti transfer",
                "saya sudah transfer",
                "already paid",
                "already transferred",
                "payment sent",
            ]),
        }
    }
}

/// Order ledger storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name inside `general.data_dir`.
    pub ledger_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_file: "orders.db".to_string(),
        }
    }
}
