//! Benchmarks for the memory store's retrieval and scoring path: storing
//! a population of memories, then retrieving the top-k candidates for a
//! query embedding.
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use crt_core::embedding::{Embedder, HashEmbedder};
use crt_core::memory::{score, MemoryStore, SqliteMemoryStore};
use crt_core::models::{Memory, Source};
use std::collections::HashMap;
use std::hint::black_box;

fn populated_store(count: usize) -> (SqliteMemoryStore, HashEmbedder) {
    let store = SqliteMemoryStore::open_in_memory().expect("open in-memory store");
    let embedder = HashEmbedder::new();
    for i in 0..count {
        let text = format!("fact number {i} about something the user mentioned once");
        let embedding = embedder.embed(&text).unwrap();
        let memory = Memory::new(text, Source::User, embedding, 0.8, HashMap::new(), false);
        store.store(&memory).unwrap();
    }
    (store, embedder)
}

fn bench_retrieve(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_retrieve_top_k");
    for size in [10usize, 100, 1_000] {
        let (store, embedder) = populated_store(size);
        let query = embedder.embed("fact number 42 about something").unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| store.retrieve(black_box(&query), 0.0, black_box(8), 604_800.0).unwrap());
        });
    }
    group.finish();
}

fn bench_score(c: &mut Criterion) {
    c.bench_function("score_function", |b| {
        b.iter(|| score(black_box(0.82), black_box(0.65), black_box(1.0)));
    });
}

criterion_group!(benches, bench_retrieve, bench_score);
criterion_main!(benches);
