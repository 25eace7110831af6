//! Cross-encoder reranking with silent mode fallback
//!
//! Three modes tried in order: a hosted reranker API, a local ONNX
//! cross-encoder, and passthrough. A mode failure falls through to the
//! next; callers never observe a reranker error.

use crate::error::{OracleError, Result};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Candidate passed into reranking.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: i64,
    pub content: String,
}

/// Scored candidate, descending by relevance.
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    pub id: i64,
    pub score: f32,
}

/// One reranking mode.
pub enum RerankMode {
    Remote(RemoteReranker),
    Local(LocalReranker),
    Passthrough,
}

impl RerankMode {
    fn name(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::Local(_) => "local",
            Self::Passthrough => "passthrough",
        }
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_n: usize,
    ) -> Result<Vec<RerankedCandidate>> {
        match self {
            Self::Remote(remote) => remote.rerank(query, candidates, top_n).await,
            Self::Local(local) => local.rerank(query, candidates, top_n),
            Self::Passthrough => Ok(passthrough(candidates, top_n)),
        }
    }
}

fn passthrough(candidates: &[RerankCandidate], top_n: usize) -> Vec<RerankedCandidate> {
    candidates
        .iter()
        .take(top_n)
        .map(|c| RerankedCandidate { id: c.id, score: 1.0 })
        .collect()
}

/// Ordered fallback chain of reranking modes.
pub struct RerankerStack {
    modes: Vec<RerankMode>,
}

impl RerankerStack {
    pub fn new(modes: Vec<RerankMode>) -> Self {
        Self { modes }
    }

    /// A stack that only ever passes candidates through.
    pub fn passthrough_only() -> Self {
        Self::new(vec![RerankMode::Passthrough])
    }

    /// Score candidates against the query and return the top `top_n`,
    /// descending. When the candidate set already fits in `top_n`, the
    /// models are bypassed and candidates return in input order with
    /// score 1.0.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_n: usize,
    ) -> Vec<RerankedCandidate> {
        if candidates.len() <= top_n {
            return passthrough(candidates, top_n);
        }

        for mode in &self.modes {
            match mode.rerank(query, candidates, top_n).await {
                Ok(reranked) => return reranked,
                Err(e) => {
                    tracing::warn!("{} reranker failed, falling back: {}", mode.name(), e);
                }
            }
        }

        passthrough(candidates, top_n)
    }
}

// ============================================================================
// Remote mode
// ============================================================================

/// Configuration for the hosted reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRerankerConfig {
    /// Rerank endpoint URL (Cohere-compatible request shape).
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for RemoteRerankerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.cohere.ai/v1/rerank".to_string(),
            model: "rerank-english-v3.0".to_string(),
            api_key_env: "ORACLE_RERANK_API_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Hosted cross-encoder, one batched call per query.
pub struct RemoteReranker {
    config: RemoteRerankerConfig,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct RemoteRerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RemoteRerankResponse {
    results: Vec<RemoteRerankResult>,
}

#[derive(Deserialize)]
struct RemoteRerankResult {
    index: usize,
    relevance_score: f64,
}

impl RemoteReranker {
    /// Construct the remote mode. `ModelUnavailable` when the credential
    /// named by the config is absent; the stack then starts at the next mode.
    pub fn new(config: RemoteRerankerConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            OracleError::ModelUnavailable(format!(
                "Environment variable {} not set for remote reranker",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                OracleError::ModelUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_n: usize,
    ) -> Result<Vec<RerankedCandidate>> {
        let request = RemoteRerankRequest {
            model: &self.config.model,
            query,
            documents: candidates.iter().map(|c| c.content.as_str()).collect(),
            top_n,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::TransientExternal(format!("Rerank request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OracleError::TransientExternal(format!(
                "Rerank endpoint returned {}",
                response.status()
            )));
        }

        let parsed: RemoteRerankResponse = response.json().await.map_err(|e| {
            OracleError::TransientExternal(format!("Bad rerank response: {e}"))
        })?;

        let mut reranked: Vec<RerankedCandidate> = parsed
            .results
            .into_iter()
            .filter(|r| r.index < candidates.len())
            .map(|r| RerankedCandidate {
                id: candidates[r.index].id,
                score: r.relevance_score as f32,
            })
            .collect();

        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(top_n);
        Ok(reranked)
    }
}

// ============================================================================
// Local mode
// ============================================================================

/// Local ONNX cross-encoder with its paired tokenizer; each (query,
/// candidate) pair is scored jointly, input truncated to the model's
/// 512-token window, first logit taken as the relevance.
pub struct LocalReranker {
    model: Arc<TextRerank>,
}

impl LocalReranker {
    /// Load the cross-encoder artifacts. `ModelUnavailable` on failure; the
    /// stack then falls through to passthrough.
    pub fn new(cache_dir: Option<std::path::PathBuf>) -> Result<Self> {
        tracing::info!("Initializing local cross-encoder reranker");

        let mut options = RerankInitOptions::new(RerankerModel::BGERerankerBase)
            .with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        let model = TextRerank::try_new(options)
            .map_err(|e| OracleError::ModelUnavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }

    fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_n: usize,
    ) -> Result<Vec<RerankedCandidate>> {
        let documents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();

        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| OracleError::ModelUnavailable(format!("Local rerank failed: {e}")))?;

        let mut reranked: Vec<RerankedCandidate> = results
            .into_iter()
            .filter(|r| r.index < candidates.len())
            .map(|r| RerankedCandidate {
                id: candidates[r.index].id,
                score: r.score,
            })
            .collect();

        reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        reranked.truncate(top_n);
        Ok(reranked)
    }
}
