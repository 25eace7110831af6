use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the oracle engine
#[derive(Error, Debug)]
pub enum OracleError {
    /// Bad paths, bad options, malformed queries
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Repository root does not exist or is not a directory
    #[error("Invalid repository root: {path:?}")]
    InvalidRoot { path: PathBuf },

    /// Missing index file or row on load
    #[error("Not found: {0}")]
    NotFound(String),

    /// Deserialization failure on a persisted index
    #[error("Corrupt index data: {0}")]
    Corrupt(String),

    /// Required index has not been built yet
    #[error("Index missing at {path:?}; run a full index first")]
    IndexMissing { path: PathBuf },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// Syntax tree could not be produced at all for a file
    #[error("Parse error: {0}")]
    Parse(String),

    /// Embedder or reranker artifacts could not be loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Embedding generation failed mid-build
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Rate limits or timeouts on a remote service
    #[error("Transient external failure: {0}")]
    TransientExternal(String),

    /// User or supervisor cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Violated postcondition inside the engine
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path:?}")]
    ConfigNotFound { path: PathBuf },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Chunk store errors
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Lexical index errors
    #[error("Lexical index error: {0}")]
    Lexical(#[from] tantivy::TantivyError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OracleError {
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    /// Whether a load failure should be answered by scheduling a rebuild
    /// rather than surfacing to the caller.
    pub fn is_rebuildable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Corrupt(_))
    }
}

/// Result type for oracle operations
pub type Result<T> = std::result::Result<T, OracleError>;
