use criterion::{Criterion, criterion_group, criterion_main};
use risk_rag::embeddings::chunking::{ChunkingConfig, ChunkingPolicy, chunk_text};
use std::hint::black_box;

const SAMPLE_REPORT: &str = "Patient Name: Jane Doe\nDOB: 1975-03-02\nSex: F\n\
Specimen: cervical biopsy, 12 o'clock. Microscopic description: squamous mucosa with \
full-thickness atypia, loss of maturation and frequent mitotic figures. \
Immunohistochemistry: p16 block-positive. Diagnosis: high grade squamous intraepithelial \
lesion (CIN 3). No invasive carcinoma identified in the sampled tissue. ";

pub fn criterion_benchmark(c: &mut Criterion) {
    let report = SAMPLE_REPORT.repeat(200);

    c.bench_function("chunking_character_window", |b| {
        b.iter(|| chunk_text(black_box(&report), black_box(500)));
    });

    let words = ChunkingConfig {
        policy: ChunkingPolicy::Words,
        ..ChunkingConfig::default()
    };
    c.bench_function("chunking_words", |b| {
        b.iter(|| words.chunk(black_box(&report)));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
