//! Batched embedding generation for index builds

use super::EmbeddingProvider;
use crate::error::{OracleError, Result};
use std::sync::Arc;
use std::time::Instant;

/// Progress seam: `(current, total)` over items embedded so far.
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Item to be embedded (text with its chunk id).
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: u64,
    pub text: String,
}

/// Outcome of a batch run.
#[derive(Debug)]
pub struct BatchResult {
    pub processed: usize,
    pub duration_ms: u64,
}

/// Feeds chunk text through the embedder in fixed-size batches and hands
/// each `(id, vector)` pair to a sink. Any embedding failure aborts the
/// run; partial output must never reach an index as zero vectors.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed every item, invoking `sink` per vector in item order and the
    /// progress callback after each item.
    pub fn run(
        &self,
        items: &[BatchItem],
        mut sink: impl FnMut(u64, Vec<f32>) -> Result<()>,
        progress: Option<&ProgressFn>,
    ) -> Result<BatchResult> {
        let start = Instant::now();
        let total = items.len();
        let mut processed = 0usize;

        for batch in items.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|item| item.text.clone()).collect();
            let embeddings = self.provider.embed_batch(&texts)?;
            if embeddings.len() != batch.len() {
                return Err(OracleError::Embedding(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            for (item, embedding) in batch.iter().zip(embeddings) {
                sink(item.id, embedding)?;
                processed += 1;
                if let Some(report) = progress {
                    report(processed, total);
                }
            }
        }

        Ok(BatchResult {
            processed,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
