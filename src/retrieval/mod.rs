//! Hybrid retrieval and reranking
//!
//! Lexical and semantic rankings are fused with Reciprocal Rank Fusion,
//! then an optional cross-encoder pass reorders the survivors.

mod fusion;
mod hybrid;
mod reranker;

pub use fusion::{reciprocal_rank_fusion, DocKey, DEFAULT_RRF_K};
pub use hybrid::{RetrievedChunk, Retriever, SearchOptions};
pub use reranker::{
    LocalReranker, RemoteReranker, RemoteRerankerConfig, RerankCandidate, RerankMode,
    RerankedCandidate, RerankerStack,
};
