/// Search-layer tests: HNSW structural invariants, Matryoshka precision
/// bounds, BM25 behavior, and the hybrid fusion laws.
use agrama::{
    GraphIndex, HnswConfig, HnswIndex, HybridQuery, HybridSearchEngine, HybridWeights,
    LexicalConfig, LexicalIndex, Vector,
};
use std::sync::Arc;

fn unit(angle: f32) -> Vector {
    Vector::new(vec![angle.cos(), angle.sin()])
}

#[test]
fn test_hnsw_reachability_and_degree_caps() {
    let index = HnswIndex::new(HnswConfig::new(2).max_connections(4).seed(11));

    for i in 0..400 {
        index
            .insert(format!("doc{i}"), unit(i as f32 * 0.0157))
            .unwrap();
    }

    // validate_invariants checks: every node reachable from the entry
    // point on layer 0, degree ≤ M (M₀ at layer 0), all edges
    // bidirectional, connection lists sized to max_layer
    index.validate_invariants().unwrap();
}

#[test]
fn test_hnsw_invariants_survive_reinserts() {
    let index = HnswIndex::new(HnswConfig::new(2).max_connections(4));

    for i in 0..100 {
        index
            .insert(format!("doc{}", i % 25), unit(i as f32 * 0.13))
            .unwrap();
    }

    assert_eq!(index.len(), 25);
    index.validate_invariants().unwrap();
}

#[test]
fn test_hnsw_search_quality() {
    let index = HnswIndex::new(HnswConfig::new(2).max_connections(8));

    for i in 0..1000 {
        index
            .insert(format!("doc{i}"), unit(i as f32 * 0.00628))
            .unwrap();
    }

    // Query exactly at a stored angle: that document must come back first
    for probe in [0usize, 250, 500, 999] {
        let results = index.search(&unit(probe as f32 * 0.00628), 5, 100).unwrap();
        assert_eq!(results[0].doc_key, format!("doc{probe}"), "probe {probe}");
    }
}

#[test]
fn test_matryoshka_prefix_error_bound() {
    // Matryoshka-style vectors: information concentrated in the prefix
    let make = |seed: usize| {
        let data: Vec<f32> = (0..64)
            .map(|i| {
                let magnitude = 1.0 / (1.0 + i as f32 * 0.5);
                let phase = ((seed * 31 + i * 17) % 13) as f32 - 6.0;
                magnitude * phase
            })
            .collect();
        Vector::new(data)
    };

    let mut worst_coarse = 0.0f32;
    let mut worst_fine = 0.0f32;
    for seed in 0..20 {
        let a = make(seed);
        let b = make(seed + 7);
        let full = a.cosine_similarity(&b).unwrap();
        worst_coarse = worst_coarse.max((a.prefix_similarity(&b, 8).unwrap() - full).abs());
        worst_fine = worst_fine.max((a.prefix_similarity(&b, 32).unwrap() - full).abs());
    }

    // ε(d) shrinks as d approaches the full dimension
    assert!(
        worst_fine <= worst_coarse,
        "fine prefix error {worst_fine} should not exceed coarse {worst_coarse}"
    );
}

#[test]
fn test_bm25_defaults_and_tuning() {
    // Higher b penalizes long documents harder
    let text_short = "allocator";
    let text_long =
        "allocator word word word word word word word word word word word word word word";

    let no_norm = LexicalIndex::new(LexicalConfig::default().params(1.2, 0.0));
    no_norm.index("short", text_short);
    no_norm.index("long", text_long);

    let full_norm = LexicalIndex::new(LexicalConfig::default().params(1.2, 1.0));
    full_norm.index("short", text_short);
    full_norm.index("long", text_long);

    let gap = |index: &LexicalIndex| {
        let results = index.search("allocator", 2);
        let short = results.iter().find(|r| r.doc_key == "short").unwrap().score;
        let long = results.iter().find(|r| r.doc_key == "long").unwrap().score;
        short - long
    };
    assert!(gap(&full_norm) > gap(&no_norm));
}

fn hybrid_engine() -> HybridSearchEngine {
    HybridSearchEngine::new(
        Arc::new(HnswIndex::new(HnswConfig::new(2))),
        Arc::new(LexicalIndex::new(LexicalConfig::default())),
        Arc::new(GraphIndex::new()),
    )
}

#[test]
fn test_hybrid_weight_linearity() {
    let engine = hybrid_engine();
    engine.lexical_index().index("doc1", "alpha beta gamma");
    engine
        .semantic_index()
        .insert("doc1", Vector::new(vec![1.0, 0.0]))
        .unwrap();
    engine.graph_index().add_edge("seed", "doc1");

    let score_with = |alpha: f32, beta: f32, gamma: f32| {
        let query = HybridQuery::new("alpha")
            .embedding(Vector::new(vec![1.0, 0.0]))
            .starting_nodes(vec!["seed".to_string()])
            .weights(HybridWeights::new(alpha, beta, gamma).unwrap());
        let results = engine.search(&query).unwrap();
        results
            .iter()
            .find(|r| r.doc_key == "doc1")
            .map(|r| (r.lexical_score, r.semantic_score, r.graph_score, r.combined_score))
            .unwrap()
    };

    // Sub-scores are weight-independent; combined is their exact
    // weighted sum
    let (lex, sem, graph, combined) = score_with(0.2, 0.3, 0.5);
    assert!((combined - (0.2 * lex + 0.3 * sem + 0.5 * graph)).abs() < 1e-6);

    let (lex2, sem2, graph2, combined2) = score_with(0.6, 0.2, 0.2);
    assert!((lex - lex2).abs() < 1e-6);
    assert!((sem - sem2).abs() < 1e-6);
    assert!((graph - graph2).abs() < 1e-6);
    assert!((combined2 - (0.6 * lex2 + 0.2 * sem2 + 0.2 * graph2)).abs() < 1e-6);
}

#[test]
fn test_hybrid_graph_weight_zero_without_seeds() {
    let engine = hybrid_engine();
    engine.lexical_index().index("doc1", "shared words here");
    engine.graph_index().add_edge("seed", "doc1");

    // γ > 0 but no starting nodes: graph sub-query doesn't run
    let query = HybridQuery::new("shared")
        .weights(HybridWeights::new(0.5, 0.0, 0.5).unwrap());
    let results = engine.search(&query).unwrap();
    let doc1 = results.iter().find(|r| r.doc_key == "doc1").unwrap();
    assert_eq!(doc1.graph_score, 0.0);
    assert_eq!(doc1.graph_distance, None);
}

#[test]
fn test_hybrid_determinism() {
    let engine = hybrid_engine();
    for i in 0..20 {
        engine
            .lexical_index()
            .index(format!("doc{i}"), "identical corpus text for every doc");
    }

    let query = HybridQuery::new("corpus text").weights(HybridWeights::lexical());
    let first: Vec<String> = engine
        .search(&query)
        .unwrap()
        .into_iter()
        .map(|r| r.doc_key)
        .collect();
    for _ in 0..5 {
        let again: Vec<String> = engine
            .search(&query)
            .unwrap()
            .into_iter()
            .map(|r| r.doc_key)
            .collect();
        assert_eq!(first, again);
    }
    // Tie-break is lexicographic on the key
    assert_eq!(first[0], "doc0");
    assert_eq!(first[1], "doc1");
}

#[test]
fn test_semantic_index_shared_across_engine_clones() {
    let engine = hybrid_engine();
    let clone = engine.clone();
    clone
        .semantic_index()
        .insert("doc1", Vector::new(vec![0.0, 1.0]))
        .unwrap();
    assert_eq!(engine.semantic_index().len(), 1);
}
