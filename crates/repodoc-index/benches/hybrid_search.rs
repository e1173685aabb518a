use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use repodoc_index::{
    Chunk, DistanceMetric, DocumentStore, EmbeddingIndex, HybridRetriever, LexicalIndex,
    StoreConfig,
};
use repodoc_llm::mock::MockProvider;
use std::hint::black_box;
use std::sync::Arc;

const WORDS: &[&str] = &[
    "parser", "config", "token", "buffer", "stream", "index", "query", "cache", "retry",
    "socket", "render", "schema", "vector", "thread", "signal", "module",
];

fn generate_corpus(size: usize) -> Vec<Chunk> {
    (0..size)
        .map(|i| {
            let text: Vec<&str> = (0..24).map(|j| WORDS[(i * 7 + j * 3) % WORDS.len()]).collect();
            Chunk::new(format!("chunk_{i}"), text.join(" "))
        })
        .collect()
}

fn lexical_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("bm25_score");

    for size in [100, 1_000, 10_000] {
        let corpus = generate_corpus(size);
        let mut index = LexicalIndex::default();
        index.build(&corpus);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("two_terms", size), &index, |b, index| {
            b.iter(|| index.normalized_scores(black_box("parser cache")));
        });
    }

    group.finish();
}

fn embedding_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_l2_search");
    let provider = MockProvider::default().with_dimension(256);

    for size in [1_000, 10_000] {
        let vectors: Vec<Vec<f32>> = generate_corpus(size)
            .iter()
            .map(|c| provider.hash_embedding(&c.content))
            .collect();
        let mut index = EmbeddingIndex::new(256, DistanceMetric::Euclidean);
        index.add(&vectors).unwrap();
        let query = provider.hash_embedding("parser cache retry");
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("top_10", size), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), 10).unwrap());
        });
    }

    group.finish();
}

fn hybrid_search(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let provider = Arc::new(MockProvider::default().with_dimension(64));
    let config = StoreConfig {
        model: "mock".into(),
        dimension: 64,
        ..StoreConfig::default()
    };
    let mut retriever = HybridRetriever::new(DocumentStore::new(provider, config), 0.5).unwrap();
    rt.block_on(retriever.index(generate_corpus(2_000))).unwrap();

    c.bench_function("hybrid_search_2000_top5", |b| {
        b.iter(|| {
            rt.block_on(retriever.search(black_box("config stream socket"), 5))
                .unwrap()
        });
    });
}

criterion_group!(benches, lexical_scoring, embedding_search, hybrid_search);
criterion_main!(benches);
