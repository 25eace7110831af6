//! Configuration loading and defaults
//!
//! TOML-backed settings with environment overrides. Defaults mirror the
//! engine's tuned constants, so a missing config file is never an error.

use crate::error::{OracleError, Result};
use crate::retrieval::RemoteRerankerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub walker: WalkerConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
}

/// Repository traversal limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Largest file accepted, in bytes.
    pub max_file_bytes: u64,
    /// Directory names ignored in addition to the built-in patterns.
    #[serde(default)]
    pub extra_ignore_dirs: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 500 * 1024,
            extra_ignore_dirs: Vec::new(),
        }
    }
}

/// HNSW graph parameters; stable across save and load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

impl VectorConfig {
    pub fn params(&self) -> crate::index::VectorIndexParams {
        crate::index::VectorIndexParams {
            dimensions: self.dimensions,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
        }
    }
}

/// Query-time pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub bm25_limit: usize,
    pub vector_limit: usize,
    pub fusion_limit: usize,
    pub rrf_k: u32,
    /// Results handed to the caller after reranking.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25_limit: 200,
            vector_limit: 100,
            fusion_limit: 30,
            rrf_k: 60,
            top_k: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn search_options(&self) -> crate::retrieval::SearchOptions {
        crate::retrieval::SearchOptions {
            bm25_limit: self.bm25_limit,
            vector_limit: self.vector_limit,
            fusion_limit: self.fusion_limit,
            rrf_k: self.rrf_k,
        }
    }
}

/// Reranker mode selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    /// Try the hosted reranker first when its credential is present.
    #[serde(default)]
    pub remote: RemoteRerankerConfig,
    /// Load the local cross-encoder when the remote mode is unavailable.
    pub use_local: bool,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote: RemoteRerankerConfig::default(),
            use_local: true,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(OracleError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| OracleError::io(e, format!("Failed to read config file {path:?}")))?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `path` when given, else from the repository's own config,
    /// else fall back to defaults.
    pub fn load_or_default(path: Option<&Path>, repo: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let repo_config = Self::index_dir(repo).join("config.toml");
        if repo_config.exists() {
            Self::load(&repo_config)
        } else {
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OracleError::io(e, format!("Failed to create {parent:?}")))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| OracleError::io(e, format!("Failed to write config file {path:?}")))?;
        Ok(())
    }

    /// Persisted state directory for a repository.
    pub fn index_dir(repo: &Path) -> PathBuf {
        repo.join(".oracle")
    }

    /// Model artifact cache for a repository.
    pub fn models_dir(repo: &Path) -> PathBuf {
        Self::index_dir(repo).join("models")
    }

    /// Environment overrides in `ORACLE_SECTION__KEY` form.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("ORACLE_RERANKER__ENABLED") {
            match value.parse() {
                Ok(enabled) => self.reranker.enabled = enabled,
                Err(_) => tracing::warn!("Cannot parse ORACLE_RERANKER__ENABLED as boolean"),
            }
        }
        if let Ok(value) = std::env::var("ORACLE_RERANKER__API_KEY_ENV") {
            self.reranker.remote.api_key_env = value;
        }
        if let Ok(value) = std::env::var("ORACLE_WALKER__MAX_FILE_BYTES") {
            match value.parse() {
                Ok(bytes) => self.walker.max_file_bytes = bytes,
                Err(_) => tracing::warn!("Cannot parse ORACLE_WALKER__MAX_FILE_BYTES as integer"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_engine_constants() {
        let config = Config::default();
        assert_eq!(config.walker.max_file_bytes, 500 * 1024);
        assert_eq!(config.vector.dimensions, 384);
        assert_eq!(config.vector.connectivity, 16);
        assert_eq!(config.vector.expansion_add, 128);
        assert_eq!(config.vector.expansion_search, 64);
        assert_eq!(config.retrieval.bm25_limit, 200);
        assert_eq!(config.retrieval.vector_limit, 100);
        assert_eq!(config.retrieval.fusion_limit, 30);
        assert_eq!(config.retrieval.rrf_k, 60);
    }

    #[test]
    fn save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.walker.max_file_bytes = 1024;
        config.retrieval.top_k = 5;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.walker.max_file_bytes, 1024);
        assert_eq!(loaded.retrieval.top_k, 5);
    }

    #[test]
    fn load_missing_file_errors() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(OracleError::ConfigNotFound { .. })));
    }

    #[test]
    fn load_or_default_without_any_file() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_or_default(None, temp.path()).unwrap();
        assert_eq!(config.retrieval.rrf_k, 60);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[walker]\nmax_file_bytes = 2048\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.walker.max_file_bytes, 2048);
        assert_eq!(config.retrieval.fusion_limit, 30);
    }

    #[test]
    fn index_dir_layout() {
        assert_eq!(
            Config::index_dir(Path::new("/repo")),
            PathBuf::from("/repo/.oracle")
        );
        assert_eq!(
            Config::models_dir(Path::new("/repo")),
            PathBuf::from("/repo/.oracle/models")
        );
    }
}
