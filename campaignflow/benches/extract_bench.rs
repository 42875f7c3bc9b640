//! Benchmarks for partial-JSON field extraction.

use campaignflow::extract::{parse_model_json, ExtractedFieldSet, FieldSchema};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PERSONAS: &str = r#"{"personas": [{"id": "ops", "name": "Operations lead", "painPoints": ["manual reporting", "tool sprawl"]}, {"id": "cfo", "name": "Finance chief", "painPoints": ["forecast accuracy"]}, {"id": "founder", "name": "Founder", "painPoints": ["hiring", "runway"]}], "summary": "Three personas with distinct budgets"}"#;

fn schema() -> FieldSchema {
    FieldSchema::new().array("personas").string("summary")
}

fn extract_benchmark(c: &mut Criterion) {
    let schema = schema();

    c.bench_function("extract_complete_buffer", |b| {
        b.iter(|| ExtractedFieldSet::from_buffer(black_box(PERSONAS), &schema, 100, true));
    });

    let partial = &PERSONAS[..PERSONAS.len() / 2];
    c.bench_function("extract_partial_buffer", |b| {
        b.iter(|| ExtractedFieldSet::from_buffer(black_box(partial), &schema, 50, false));
    });

    // One pass per 8-character chunk, as the stage runner would do with no
    // batching interval.
    c.bench_function("extract_every_chunk", |b| {
        b.iter(|| {
            let mut end = 8;
            while end < PERSONAS.len() {
                black_box(ExtractedFieldSet::from_buffer(&PERSONAS[..end], &schema, end / 8, false));
                end += 8;
            }
        });
    });

    c.bench_function("parse_model_json", |b| {
        b.iter(|| parse_model_json("brainstorm", black_box(PERSONAS), 500));
    });
}

criterion_group!(benches, extract_benchmark);
criterion_main!(benches);
