//! Dense vector production for chunk and query text

mod batch;

pub use batch::{BatchEmbedder, BatchItem, BatchResult, ProgressFn};

use crate::error::{OracleError, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;

/// Output dimension of the registered embedding model.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends, including the
/// deterministic test embedder used by the integration suite.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batched for efficiency).
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The fixed output dimension.
    fn dimension(&self) -> usize;

    /// Model identifier.
    fn model_name(&self) -> &str;
}

/// Local embedding via fastembed (all-MiniLM-L6-v2, 384-dim).
///
/// The model mean-pools token outputs and L2-normalizes, so vectors live in
/// cosine space with unit norm. Initialized once and reused.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
}

impl FastEmbedProvider {
    /// Initialize the registered model, optionally caching artifacts under
    /// `cache_dir`. Fails with *model-unavailable* when artifacts cannot be
    /// loaded; that is fatal to both indexing and retrieval.
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let model_name = "all-MiniLM-L6-v2";
        tracing::info!("Initializing embedding model {model_name} ({EMBEDDING_DIM}D)");

        let mut options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model = TextEmbedding::try_new(options)
            .map_err(|e| OracleError::ModelUnavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| OracleError::Embedding(e.to_string()))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| OracleError::Embedding("No embedding produced".to_string()))?;

        if embedding.len() != EMBEDDING_DIM {
            return Err(OracleError::Embedding(format!(
                "Dimension mismatch: expected {EMBEDDING_DIM}, got {}",
                embedding.len()
            )));
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| OracleError::Embedding(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(OracleError::Embedding(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            if embedding.len() != EMBEDDING_DIM {
                return Err(OracleError::Embedding(format!(
                    "Dimension mismatch: expected {EMBEDDING_DIM}, got {}",
                    embedding.len()
                )));
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
