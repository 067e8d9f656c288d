use criterion::{Criterion, criterion_group, criterion_main};
use pattern_review::analysis::{DifferenceAnalyzer, Thresholds};
use pattern_review::parser::ParserRegistry;
use pattern_review::patterns::{PatternFingerprint, aggregate, extract};
use std::fmt::Write as _;
use std::hint::black_box;

fn synthetic_module(functions: usize) -> String {
    let mut source = String::from("import json\nimport os\n\n");
    for i in 0..functions {
        let _ = write!(
            source,
            "\ndef load_record_{i}(path):\n    \"\"\"Load record {i}.\"\"\"\n    try:\n        with open(path) as handle:\n            data = json.load(handle)\n    except OSError:\n        return None\n    if data.get(\"kind\") == \"{i}\":\n        for key in data:\n            if key.startswith(\"_\"):\n                data.pop(key)\n    return data\n\n"
        );
    }
    source
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let parsers = ParserRegistry::new();
    let source = synthetic_module(200);

    c.bench_function("parse", |b| {
        b.iter(|| parsers.parse("bench/records.py", black_box(&source), None))
    });

    let units = parsers
        .parse("bench/records.py", &source, None)
        .expect("synthetic module parses");
    c.bench_function("fingerprint", |b| {
        b.iter(|| units.iter().map(|u| extract(black_box(u))).count())
    });

    let fingerprints: Vec<PatternFingerprint> = units.iter().map(extract).collect();
    c.bench_function("aggregate", |b| {
        b.iter(|| aggregate(units.iter().zip(black_box(&fingerprints))))
    });

    let analyzer = DifferenceAnalyzer::new(Thresholds::default());
    let neighbors: Vec<&PatternFingerprint> = fingerprints.iter().take(5).collect();
    c.bench_function("analyze", |b| {
        b.iter(|| analyzer.analyze(black_box(&fingerprints[10]), &neighbors))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
