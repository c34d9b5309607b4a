use agrama::{json, AgramaConfig, HashEmbedder, HybridQuery, HybridWeights, PrimitiveEngine, Vector};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

fn bench_engine(dims: usize) -> PrimitiveEngine {
    let config = AgramaConfig::default()
        .vector_dimensions(dims)
        .matryoshka_dims(vec![dims / 8, dims / 2, dims]);
    PrimitiveEngine::with_embedder(config, Arc::new(HashEmbedder::new(dims))).unwrap()
}

/// Benchmark: single store call (value below the semantic threshold)
fn bench_store_single(c: &mut Criterion) {
    let engine = bench_engine(128);

    c.bench_function("store_single", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(
                engine
                    .execute("bench", "store", &json!({"key": format!("k{i}"), "value": "short payload"}))
                    .unwrap(),
            )
        })
    });
}

/// Benchmark: retrieve of a hot key
fn bench_retrieve(c: &mut Criterion) {
    let engine = bench_engine(128);
    engine
        .execute("bench", "store", &json!({"key": "hot", "value": "payload"}))
        .unwrap();

    c.bench_function("retrieve_hot_key", |b| {
        b.iter(|| {
            black_box(
                engine
                    .execute("bench", "retrieve", &json!({"key": "hot"}))
                    .unwrap(),
            )
        })
    });
}

/// Benchmark: lexical search over a seeded corpus
fn bench_lexical_search(c: &mut Criterion) {
    let engine = bench_engine(128);
    for i in 0..1000 {
        engine
            .execute(
                "bench",
                "store",
                &json!({"key": format!("doc{i}"), "value": format!("document {i} about allocator arena pool search graph")}),
            )
            .unwrap();
    }

    c.bench_function("lexical_search_1k_docs", |b| {
        b.iter(|| {
            black_box(
                engine
                    .execute("bench", "search", &json!({"query": "allocator graph", "type": "lexical"}))
                    .unwrap(),
            )
        })
    });
}

/// Benchmark: HNSW insert and search at increasing index sizes
fn bench_semantic_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("semantic_search");
    for size in [100usize, 1000] {
        let engine = bench_engine(128);
        let embedder = HashEmbedder::new(128);
        let index = engine.hybrid().semantic_index();
        for i in 0..size {
            use agrama::Embedder;
            index
                .insert(format!("doc{i}"), embedder.embed(&format!("topic {} cluster {}", i % 17, i % 5)))
                .unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            use agrama::Embedder;
            let query = embedder.embed("topic 3 cluster 2");
            b.iter(|| black_box(index.search(&query, 10, 50).unwrap()))
        });
    }
    group.finish();
}

/// Benchmark: full triple-hybrid query
fn bench_hybrid_search(c: &mut Criterion) {
    let engine = bench_engine(128);
    for i in 0..500 {
        engine
            .execute(
                "bench",
                "store",
                &json!({"key": format!("doc{i}"),
                        "value": format!("artifact {i} covering search fusion weights and pooled allocation paths")}),
            )
            .unwrap();
    }
    for i in 0..499 {
        engine
            .execute(
                "bench",
                "link",
                &json!({"from": format!("doc{i}"), "to": format!("doc{}", i + 1), "relation": "next"}),
            )
            .unwrap();
    }

    c.bench_function("hybrid_search_500_docs", |b| {
        b.iter(|| {
            black_box(
                engine
                    .execute(
                        "bench",
                        "search",
                        &json!({"query": "search fusion", "type": "hybrid",
                                "options": {"alpha": 0.4, "beta": 0.4, "gamma": 0.2,
                                            "starting_nodes": ["doc0"]}}),
                    )
                    .unwrap(),
            )
        })
    });
}

/// Benchmark: direct hybrid engine path (no wire params)
fn bench_hybrid_direct(c: &mut Criterion) {
    let engine = bench_engine(64);
    let hybrid = engine.hybrid();
    for i in 0..200 {
        hybrid
            .lexical_index()
            .index(format!("doc{i}"), "shared vocabulary across documents");
        hybrid
            .semantic_index()
            .insert(format!("doc{i}"), Vector::new((0..64).map(|d| ((i * d) % 7) as f32).collect()))
            .unwrap();
    }

    c.bench_function("hybrid_direct_200_docs", |b| {
        let query = HybridQuery::new("shared vocabulary")
            .embedding(Vector::new((0..64).map(|d| (d % 7) as f32).collect()))
            .weights(HybridWeights::balanced());
        b.iter(|| black_box(hybrid.search(&query).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_store_single,
    bench_retrieve,
    bench_lexical_search,
    bench_semantic_search,
    bench_hybrid_search,
    bench_hybrid_direct,
);
criterion_main!(benches);
