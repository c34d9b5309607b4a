//! Triple-hybrid search: weighted fusion of lexical, semantic, and
//! graph-reachability scores.
//!
//! Execution follows a candidate-union model:
//!
//! 1. Each sub-query with a non-zero weight runs against its index.
//! 2. Candidates are unioned; missing sub-scores are computed directly
//!    (a lexical candidate still gets its true cosine similarity, and
//!    vice versa), or zero where the sub-query was inapplicable.
//! 3. Candidates rank by `α·lexical + β·semantic + γ·graph`.
//!
//! Ordering is deterministic for identical inputs: ties break on the
//! document key.

use super::graph::GraphIndex;
use super::hnsw::HnswIndex;
use super::lexical::LexicalIndex;
use super::types::{HybridResult, Vector};
use crate::error::{AgramaError, AgramaResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Normalized fusion weights.
///
/// Constructed weights are validated (non-negative, positive sum) and
/// normalized so `alpha + beta + gamma == 1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    /// Lexical (BM25) weight
    pub alpha: f32,
    /// Semantic (cosine) weight
    pub beta: f32,
    /// Graph (reachability) weight
    pub gamma: f32,
}

impl HybridWeights {
    /// Validate and normalize a weight triple.
    ///
    /// # Errors
    ///
    /// `InvalidWeights` if any weight is negative or all are zero.
    pub fn new(alpha: f32, beta: f32, gamma: f32) -> AgramaResult<Self> {
        if alpha < 0.0 || beta < 0.0 || gamma < 0.0 {
            return Err(AgramaError::InvalidWeights {
                reason: "weights must be non-negative".into(),
            });
        }
        let sum = alpha + beta + gamma;
        if sum <= 0.0 || !sum.is_finite() {
            return Err(AgramaError::InvalidWeights {
                reason: "weights must sum to a positive value".into(),
            });
        }
        Ok(Self {
            alpha: alpha / sum,
            beta: beta / sum,
            gamma: gamma / sum,
        })
    }

    /// Pure lexical ranking.
    pub fn lexical() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.0,
            gamma: 0.0,
        }
    }

    /// Pure semantic ranking.
    pub fn semantic() -> Self {
        Self {
            alpha: 0.0,
            beta: 1.0,
            gamma: 0.0,
        }
    }

    /// Balanced default (lexical 0.4, semantic 0.4, graph 0.2).
    pub fn balanced() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.4,
            gamma: 0.2,
        }
    }
}

/// One fused query.
#[derive(Debug, Clone)]
pub struct HybridQuery {
    /// Query text for the lexical sub-query
    pub text: String,
    /// Query embedding for the semantic sub-query
    pub embedding: Option<Vector>,
    /// Seeds for the graph sub-query; empty disables it
    pub starting_nodes: Vec<String>,
    /// Results to return
    pub k: usize,
    /// Fusion weights
    pub weights: HybridWeights,
    /// Frontier bound for the graph sub-query
    pub max_hops: usize,
    /// Layer-0 candidate list size for the semantic sub-query
    pub ef: usize,
}

impl HybridQuery {
    /// A query with balanced weights and default bounds.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding: None,
            starting_nodes: Vec::new(),
            k: 10,
            weights: HybridWeights::balanced(),
            max_hops: 3,
            ef: 50,
        }
    }

    /// Set the query embedding.
    pub fn embedding(mut self, embedding: Vector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Set the graph starting nodes.
    pub fn starting_nodes(mut self, nodes: Vec<String>) -> Self {
        self.starting_nodes = nodes;
        self
    }

    /// Set the result count.
    pub fn k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Set the fusion weights.
    pub fn weights(mut self, weights: HybridWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Partially filled candidate accumulated during the union phase.
#[derive(Debug, Default, Clone)]
struct Partial {
    lexical: Option<(f32, Vec<String>)>,
    semantic: Option<f32>,
    graph: Option<usize>,
}

/// Fuses the three indices under a single query surface.
///
/// Holds shared handles; cloning the engine is cheap and all clones see
/// the same indices.
#[derive(Debug, Clone)]
pub struct HybridSearchEngine {
    semantic: Arc<HnswIndex>,
    lexical: Arc<LexicalIndex>,
    graph: Arc<GraphIndex>,
}

impl HybridSearchEngine {
    /// Wire the engine over shared index handles.
    pub fn new(semantic: Arc<HnswIndex>, lexical: Arc<LexicalIndex>, graph: Arc<GraphIndex>) -> Self {
        Self {
            semantic,
            lexical,
            graph,
        }
    }

    /// The semantic index handle.
    pub fn semantic_index(&self) -> &Arc<HnswIndex> {
        &self.semantic
    }

    /// The lexical index handle.
    pub fn lexical_index(&self) -> &Arc<LexicalIndex> {
        &self.lexical
    }

    /// The graph index handle.
    pub fn graph_index(&self) -> &Arc<GraphIndex> {
        &self.graph
    }

    /// Execute a fused query.
    ///
    /// The graph weight is treated as zero when no starting nodes are
    /// supplied, and the semantic weight when no embedding is supplied;
    /// the remaining sub-queries still run under the caller's weights.
    pub fn search(&self, query: &HybridQuery) -> AgramaResult<Vec<HybridResult>> {
        let weights = query.weights;
        let run_lexical = weights.alpha > 0.0 && !query.text.trim().is_empty();
        let run_semantic = weights.beta > 0.0 && query.embedding.is_some();
        let run_graph = weights.gamma > 0.0 && !query.starting_nodes.is_empty();

        // Candidate pools are wider than k so fusion can promote a
        // candidate that no single sub-query ranked near the top.
        let pool = (query.k.max(1)) * 4;
        let pool = pool.max(32);

        // BTreeMap keeps the union iteration (and thus tie handling)
        // deterministic.
        let mut candidates: BTreeMap<String, Partial> = BTreeMap::new();

        if run_lexical {
            for hit in self.lexical.search(&query.text, pool) {
                candidates.entry(hit.doc_key.clone()).or_default().lexical =
                    Some((hit.score, hit.matching_terms));
            }
        }

        if run_semantic {
            let embedding = query.embedding.as_ref().expect("checked above");
            for hit in self.semantic.search(embedding, pool, query.ef.max(pool))? {
                candidates.entry(hit.doc_key.clone()).or_default().semantic = Some(hit.score);
            }
        }

        if run_graph {
            let distances = self.graph.reachability(&query.starting_nodes, query.max_hops);
            for (node, distance) in distances {
                candidates.entry(node).or_default().graph = Some(distance);
            }
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Fill in missing sub-scores for unioned candidates
        let mut results: Vec<HybridResult> = Vec::with_capacity(candidates.len());
        for (doc_key, partial) in candidates {
            let (lexical_score, matching_terms) = match partial.lexical {
                Some((score, terms)) => (score, terms),
                None if run_lexical => self
                    .lexical
                    .score_doc(&doc_key, &query.text)
                    .unwrap_or((0.0, Vec::new())),
                None => (0.0, Vec::new()),
            };

            let semantic_score = match partial.semantic {
                Some(score) => score,
                None if run_semantic => self
                    .semantic
                    .similarity_to(&doc_key, query.embedding.as_ref().expect("checked above"))
                    .unwrap_or(0.0),
                None => 0.0,
            };

            let (graph_score, graph_distance) = match partial.graph {
                Some(distance) => (GraphIndex::score(distance), Some(distance)),
                None => (0.0, None),
            };

            let combined_score = weights.alpha * lexical_score
                + weights.beta * semantic_score
                + weights.gamma * graph_score;

            results.push(HybridResult {
                doc_key,
                semantic_score,
                lexical_score,
                graph_score,
                combined_score,
                matching_terms,
                graph_distance,
            });
        }

        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_key.cmp(&b.doc_key))
        });
        results.truncate(query.k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::hnsw::HnswConfig;
    use crate::search::lexical::LexicalConfig;

    fn engine() -> HybridSearchEngine {
        HybridSearchEngine::new(
            Arc::new(HnswIndex::new(HnswConfig::new(2))),
            Arc::new(LexicalIndex::new(LexicalConfig::default())),
            Arc::new(GraphIndex::new()),
        )
    }

    #[test]
    fn test_weights_normalize() {
        let w = HybridWeights::new(2.0, 1.0, 1.0).unwrap();
        assert!((w.alpha - 0.5).abs() < 1e-6);
        assert!((w.alpha + w.beta + w.gamma - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        assert!(matches!(
            HybridWeights::new(0.0, 0.0, 0.0),
            Err(AgramaError::InvalidWeights { .. })
        ));
        assert!(matches!(
            HybridWeights::new(-0.5, 1.0, 0.5),
            Err(AgramaError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn test_empty_candidate_set_is_empty_result() {
        let engine = engine();
        let query = HybridQuery::new("nothing indexed yet");
        assert!(engine.search(&query).unwrap().is_empty());
    }

    #[test]
    fn test_pure_lexical_matches_lexical_ranking() {
        let engine = engine();
        engine.lexical_index().index("doc1", "the quick brown fox");
        engine.lexical_index().index("doc2", "quick sort algorithm");
        engine.lexical_index().index("doc3", "unrelated text");

        let direct = engine.lexical_index().search("quick", 10);
        let hybrid = engine
            .search(&HybridQuery::new("quick").weights(HybridWeights::lexical()))
            .unwrap();

        let direct_keys: Vec<_> = direct.iter().map(|r| r.doc_key.clone()).collect();
        let hybrid_keys: Vec<_> = hybrid.iter().map(|r| r.doc_key.clone()).collect();
        assert_eq!(direct_keys, hybrid_keys);
    }

    #[test]
    fn test_pure_semantic_matches_semantic_ranking() {
        let engine = engine();
        engine
            .semantic_index()
            .insert("doc1", Vector::new(vec![1.0, 0.0]))
            .unwrap();
        engine
            .semantic_index()
            .insert("doc2", Vector::new(vec![0.0, 1.0]))
            .unwrap();
        engine
            .semantic_index()
            .insert("doc3", Vector::new(vec![0.7, 0.7]))
            .unwrap();

        let query_vec = Vector::new(vec![0.9, 0.1]);
        let direct = engine.semantic_index().search(&query_vec, 10, 50).unwrap();
        let hybrid = engine
            .search(
                &HybridQuery::new("")
                    .embedding(query_vec)
                    .weights(HybridWeights::semantic()),
            )
            .unwrap();

        let direct_keys: Vec<_> = direct.iter().map(|r| r.doc_key.clone()).collect();
        let hybrid_keys: Vec<_> = hybrid.iter().map(|r| r.doc_key.clone()).collect();
        assert_eq!(direct_keys, hybrid_keys);
    }

    #[test]
    fn test_graph_distance_ranks_nearer_first() {
        let engine = engine();
        engine.graph_index().add_edge("A", "B");
        engine.graph_index().add_edge("B", "C");
        engine.lexical_index().index("Z", "unconnected document");

        let weights = HybridWeights::new(0.0, 0.0, 1.0).unwrap();
        let results = engine
            .search(
                &HybridQuery::new("")
                    .starting_nodes(vec!["A".to_string()])
                    .weights(weights),
            )
            .unwrap();

        let keys: Vec<_> = results.iter().map(|r| r.doc_key.as_str()).collect();
        let pos = |k: &str| keys.iter().position(|&x| x == k);
        assert!(pos("B") < pos("C"));
        assert_eq!(results[0].doc_key, "A"); // distance 0
        assert_eq!(pos("Z"), None); // γ-only query never surfaces unconnected docs
    }

    #[test]
    fn test_union_fills_missing_subscores() {
        let engine = engine();
        engine.lexical_index().index("doc1", "rust memory safety");
        engine.lexical_index().index("doc2", "garbage collection");
        engine
            .semantic_index()
            .insert("doc2", Vector::new(vec![1.0, 0.0]))
            .unwrap();
        engine
            .semantic_index()
            .insert("doc1", Vector::new(vec![0.9, 0.1]))
            .unwrap();

        let weights = HybridWeights::new(0.5, 0.5, 0.0).unwrap();
        let results = engine
            .search(
                &HybridQuery::new("rust")
                    .embedding(Vector::new(vec![1.0, 0.0]))
                    .weights(weights),
            )
            .unwrap();

        // doc1 only matched lexically, but still carries its true cosine
        let doc1 = results.iter().find(|r| r.doc_key == "doc1").unwrap();
        assert!(doc1.lexical_score > 0.0);
        assert!(doc1.semantic_score > 0.9);
        assert_eq!(doc1.matching_terms, vec!["rust"]);

        // doc2 only matched semantically; its lexical sub-score is zero
        let doc2 = results.iter().find(|r| r.doc_key == "doc2").unwrap();
        assert_eq!(doc2.lexical_score, 0.0);
        assert!(doc2.semantic_score > 0.99);
    }

    #[test]
    fn test_combined_score_is_weighted_sum() {
        let engine = engine();
        engine.lexical_index().index("doc1", "alpha beta");
        engine.graph_index().add_edge("seed", "doc1");

        let weights = HybridWeights::new(0.5, 0.0, 0.5).unwrap();
        let results = engine
            .search(
                &HybridQuery::new("alpha")
                    .starting_nodes(vec!["seed".to_string()])
                    .weights(weights),
            )
            .unwrap();

        let doc1 = results.iter().find(|r| r.doc_key == "doc1").unwrap();
        let expected = 0.5 * doc1.lexical_score + 0.5 * doc1.graph_score;
        assert!((doc1.combined_score - expected).abs() < 1e-6);
        assert_eq!(doc1.graph_distance, Some(1));
    }

    #[test]
    fn test_deterministic_ordering_on_ties() {
        let engine = engine();
        engine.lexical_index().index("b", "same words");
        engine.lexical_index().index("a", "same words");

        let results = engine
            .search(&HybridQuery::new("same").weights(HybridWeights::lexical()))
            .unwrap();
        assert_eq!(results[0].doc_key, "a");
        assert_eq!(results[1].doc_key, "b");
    }
}
