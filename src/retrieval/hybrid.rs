//! Hybrid retrieval: lexical + vector search fused by RRF

use crate::embedding::EmbeddingProvider;
use crate::error::{OracleError, Result};
use crate::index::{LexicalIndex, VectorIndex, VectorIndexParams};
use crate::retrieval::fusion::{reciprocal_rank_fusion, DocKey, DEFAULT_RRF_K};
use crate::store::ChunkStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Query-time limits for the two-stage pipeline.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Candidates requested from the lexical index.
    pub bm25_limit: usize,
    /// Candidates requested from the vector index.
    pub vector_limit: usize,
    /// Fused candidates kept for hydration.
    pub fusion_limit: usize,
    /// RRF smoothing constant.
    pub rrf_k: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            bm25_limit: 200,
            vector_limit: 100,
            fusion_limit: 30,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// One hydrated retrieval result, in fused rank order.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub id: i64,
    pub file_path: String,
    /// Empty string when the chunk has no captured identifier.
    pub symbol_name: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f64,
}

/// Read-only query pipeline over the persisted indices and the chunk store.
pub struct Retriever {
    lexical: LexicalIndex,
    vector: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<ChunkStore>,
}

impl Retriever {
    /// Open both persisted indices. A missing or unreadable index surfaces
    /// as `IndexMissing`; the caller decides whether to trigger a build.
    pub fn open(
        lexical_path: &Path,
        vector_path: &Path,
        vector_params: VectorIndexParams,
        store: Arc<ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let lexical = LexicalIndex::open(lexical_path).map_err(|e| {
            if e.is_rebuildable() {
                OracleError::IndexMissing {
                    path: lexical_path.to_path_buf(),
                }
            } else {
                e
            }
        })?;
        let vector = VectorIndex::load(vector_path, vector_params).map_err(|e| {
            if e.is_rebuildable() {
                OracleError::IndexMissing {
                    path: vector_path.to_path_buf(),
                }
            } else {
                e
            }
        })?;

        Ok(Self {
            lexical,
            vector,
            embedder,
            store,
        })
    }

    /// Two-stage hybrid search: lexical search and query embedding proceed
    /// concurrently, rendezvous before the vector search, then the two
    /// rankings fuse and hydrate. Never mutates state.
    pub async fn hybrid_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let (lexical_hits, query_embedding) = tokio::join!(
            async { self.lexical.search(query, options.bm25_limit) },
            async { self.embedder.embed(query) },
        );
        let lexical_hits = lexical_hits?;
        let query_embedding = query_embedding?;

        let vector_hits = self.vector.search(&query_embedding, options.vector_limit)?;

        // Position-based rankings; source scores do not cross the fusion.
        let mut locator_origin: HashMap<String, (String, usize)> = HashMap::new();
        let lexical_ranking: Vec<DocKey> = lexical_hits
            .into_iter()
            .map(|hit| {
                locator_origin.insert(hit.id_str.clone(), (hit.file_path, hit.start_line));
                DocKey::Locator(hit.id_str)
            })
            .collect();
        let vector_ranking: Vec<DocKey> = vector_hits
            .into_iter()
            .map(|hit| DocKey::Chunk(hit.key as i64))
            .collect();

        let fused = reciprocal_rank_fusion(&[lexical_ranking, vector_ranking], options.rrf_k);

        // Resolve both id spaces to chunk ids before truncation: a chunk
        // surfacing through both sources merges into one candidate whose
        // contributions sum, so dual presence outranks single presence.
        let mut order: Vec<i64> = Vec::with_capacity(fused.len());
        let mut merged: HashMap<i64, f64> = HashMap::new();
        for (key, score) in fused {
            let chunk_id = match key {
                DocKey::Chunk(id) => Some(id),
                DocKey::Locator(locator) => match locator_origin.get(&locator) {
                    Some((file_path, start_line)) => self
                        .store
                        .get_by_location(file_path, *start_line)?
                        .map(|record| record.id),
                    None => None,
                },
            };
            match chunk_id {
                Some(id) => {
                    if !merged.contains_key(&id) {
                        order.push(id);
                    }
                    *merged.entry(id).or_insert(0.0) += score;
                }
                None => tracing::debug!("Dropping unresolvable fused id"),
            }
        }

        let mut resolved: Vec<(i64, f64)> = order.into_iter().map(|id| (id, merged[&id])).collect();
        resolved.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        resolved.truncate(options.fusion_limit);

        let ids: Vec<i64> = resolved.iter().map(|(id, _)| *id).collect();
        let records = self.store.get_many(&ids)?;
        let by_id: HashMap<i64, _> = records.into_iter().map(|r| (r.id, r)).collect();

        let mut results = Vec::with_capacity(resolved.len());
        for (id, score) in resolved {
            // An index entry without a store row only happens under
            // concurrent modification; tolerated by skipping.
            let Some(record) = by_id.get(&id) else {
                tracing::debug!("Chunk {id} present in an index but not in the store; skipping");
                continue;
            };
            results.push(RetrievedChunk {
                id: record.id,
                file_path: record.file_path.clone(),
                symbol_name: record.symbol_name.clone().unwrap_or_default(),
                content: record.content.clone(),
                start_line: record.start_line,
                end_line: record.end_line,
                score,
            });
        }

        Ok(results)
    }
}
