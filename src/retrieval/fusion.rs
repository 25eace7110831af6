//! Reciprocal Rank Fusion over heterogeneous ranked lists

use std::collections::HashMap;

/// Identifier of a ranked item. Lexical results carry string locators
/// (`"file_path:start_line"`), vector results carry numeric chunk ids; the
/// two spaces stay distinct in the accumulator and the retriever dispatches
/// each back to its source for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocKey {
    Chunk(i64),
    Locator(String),
}

/// Default smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse ranked lists: each item at zero-based rank `r` contributes
/// `1 / (r + 1 + k)` to its id's score. The output is sorted by score
/// descending; exact ties keep first-occurrence order (stable sort), so
/// permuting the input lists changes scores by nothing and order only
/// where scores tie.
pub fn reciprocal_rank_fusion(lists: &[Vec<DocKey>], k: u32) -> Vec<(DocKey, f64)> {
    let mut order: Vec<DocKey> = Vec::new();
    let mut scores: HashMap<DocKey, f64> = HashMap::new();

    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            let contribution = 1.0 / (rank as f64 + 1.0 + k as f64);
            if !scores.contains_key(id) {
                order.push(id.clone());
            }
            *scores.entry(id.clone()).or_insert(0.0) += contribution;
        }
    }

    let mut fused: Vec<(DocKey, f64)> = order
        .into_iter()
        .map(|id| {
            let score = scores[&id];
            (id, score)
        })
        .collect();

    // Stable: equal scores preserve first-occurrence order.
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}
