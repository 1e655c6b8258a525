//! Benchmarks for the hash embedder and its caching wrapper.
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crt_core::embedding::{cosine_similarity, CachingEmbedder, Embedder, HashEmbedder};
use std::hint::black_box;

const SHORT_TEXT: &str = "database storage";
const MEDIUM_TEXT: &str = "How do I implement user authentication with a token refresh flow?";
const LONG_TEXT: &str = "I'm building a new conversational application that needs to keep \
    track of a user's stated preferences over many sessions, reconcile contradictions when \
    the user changes their mind, and surface clarification questions only when genuinely \
    unresolved conflicts exist in the stored beliefs.";

fn bench_embed(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_embed");
    for (name, text) in [("short", SHORT_TEXT), ("medium", MEDIUM_TEXT), ("long", LONG_TEXT)] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            let embedder = HashEmbedder::new();
            b.iter(|| embedder.embed(black_box(text)).unwrap());
        });
    }
    group.finish();
}

fn bench_caching_embed_warm(c: &mut Criterion) {
    let embedder = CachingEmbedder::with_capacity(HashEmbedder::new(), 128);
    embedder.embed(MEDIUM_TEXT).unwrap();
    c.bench_function("caching_embed_warm", |b| {
        b.iter(|| embedder.embed(black_box(MEDIUM_TEXT)).unwrap());
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let embedder = HashEmbedder::new();
    let a = embedder.embed(MEDIUM_TEXT).unwrap();
    let b_vec = embedder.embed(LONG_TEXT).unwrap();
    c.bench_function("cosine_similarity", |bencher| {
        bencher.iter(|| cosine_similarity(black_box(&a), black_box(&b_vec)));
    });
}

criterion_group!(benches, bench_embed, bench_caching_embed_warm, bench_cosine_similarity);
criterion_main!(benches);
