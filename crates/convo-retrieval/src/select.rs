//! Hybrid scoring and context-budget truncation over a dense-retrieval
//! result set. Lexical scoring is a plain token-overlap measure — no
//! separate BM25 index is maintained, since the chunk set per query is
//! already narrowed by the vector search.

use std::collections::HashSet;

use convo_store::RetrievalConfig;

use crate::types::{RetrievedChunk, SelectedChunk};

/// `chars / 4` is the same token-estimation rule of thumb the LLM request
/// pipeline uses when it doesn't have an exact tokenizer count yet.
fn approx_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

fn lexical_overlap(query: &str, chunk: &str) -> f32 {
    let query_terms: HashSet<String> =
        query.split_whitespace().map(|w| w.to_lowercase()).collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let chunk_terms: HashSet<String> =
        chunk.split_whitespace().map(|w| w.to_lowercase()).collect();
    let hits = query_terms.intersection(&chunk_terms).count();
    hits as f32 / query_terms.len() as f32
}

/// Hybrid-score, threshold, and greedily pack chunks into `context_budget_tokens`.
pub fn select(
    query: &str,
    chunks: Vec<RetrievedChunk>,
    config: &RetrievalConfig,
) -> Vec<SelectedChunk> {
    let hybrid_weight = config.hybrid_weight as f32;
    let min_score = config.min_score as f32;

    let mut scored: Vec<SelectedChunk> = chunks
        .into_iter()
        .map(|c| {
            let lexical = lexical_overlap(query, &c.text);
            let score = hybrid_weight * c.dense_score + (1.0 - hybrid_weight) * lexical;
            SelectedChunk {
                id: c.id,
                asset_id: c.asset_id,
                approx_tokens: approx_tokens(&c.text),
                text: c.text,
                score,
            }
        })
        .filter(|c| c.score >= min_score)
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = Vec::new();
    let mut budget_used: u32 = 0;
    for chunk in scored.into_iter().take(config.max_documents as usize) {
        if budget_used + chunk.approx_tokens > config.context_budget_tokens {
            continue;
        }
        budget_used += chunk.approx_tokens;
        out.push(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::types::{KnowledgeAssetId, TenantId, VectorRecordId};

    fn chunk(text: &str, dense_score: f32) -> RetrievedChunk {
        RetrievedChunk {
            id: VectorRecordId::new(),
            asset_id: KnowledgeAssetId::new(),
            text: text.to_string(),
            dense_score,
        }
    }

    fn config(hybrid_weight: f64, min_score: f64, budget: u32, max_docs: u32) -> RetrievalConfig {
        RetrievalConfig {
            tenant_id: TenantId::new(),
            hybrid_weight,
            min_score,
            max_documents: max_docs,
            context_budget_tokens: budget,
            filters: serde_json::Value::Null,
            fallback_llm: None,
        }
    }

    #[test]
    fn drops_documents_below_min_score() {
        let chunks = vec![chunk("reset your device", 0.9), chunk("unrelated filler", 0.05)];
        let cfg = config(0.5, 0.3, 10_000, 8);
        let out = select("how do I reset", chunks, &cfg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "reset your device");
    }

    #[test]
    fn truncates_to_token_budget_in_score_order() {
        let long_text = "a".repeat(400); // ~100 tokens
        let chunks = vec![
            chunk(&long_text, 0.9),
            chunk(&long_text, 0.8),
            chunk(&long_text, 0.1),
        ];
        let cfg = config(1.0, 0.0, 150, 8);
        let out = select("query", chunks, &cfg);
        assert_eq!(out.len(), 1);
        assert!((out[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn respects_max_documents() {
        let chunks = vec![chunk("x", 0.9), chunk("y", 0.8), chunk("z", 0.7)];
        let cfg = config(1.0, 0.0, 100_000, 2);
        let out = select("x y z", chunks, &cfg);
        assert_eq!(out.len(), 2);
    }
}
