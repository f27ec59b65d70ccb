//! Performance benchmarks for sampledb-engine

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sampledb_engine::federation::merge::merge;
use sampledb_engine::{
    calculate_data_hash, NewVersion, Schema, SearchConfig, SearchEngine, Store,
};
use serde_json::{json, Value};

const QUERY: &str =
    "(length >= 2cm and length < 1m) or (#alpha and not array_attr.?.bool_attr) or \"Sample\" in name";

fn create_test_schema() -> Schema {
    Schema::from_json(json!({
        "type": "object",
        "properties": {
            "name": {"type": "text"},
            "length": {"type": "quantity", "units": "mm"},
            "tags": {"type": "tags"},
            "array_attr": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"bool_attr": {"type": "bool"}}
                }
            },
            "list": {"type": "array", "items": {"type": "text"}}
        }
    }))
    .unwrap()
}

fn object_data(i: usize) -> Value {
    json!({
        "name": {"_type": "text", "text": format!("Sample {}", i)},
        "length": {
            "_type": "quantity",
            "magnitude_in_base_units": i as f64 * 1e-3,
            "units": "mm",
            "dimensionality": "[length]"
        },
        "tags": {"_type": "tags", "tags": if i % 2 == 0 { vec!["alpha"] } else { vec!["beta"] }},
        "array_attr": (0..5)
            .map(|j| json!({"bool_attr": {"_type": "bool", "value": (i + j) % 7 == 0}}))
            .collect::<Vec<_>>(),
        "list": (0..10)
            .map(|j| json!({"_type": "text", "text": format!("item {}", j)}))
            .collect::<Vec<_>>()
    })
}

fn create_test_store(size: usize) -> Store {
    let schema = create_test_schema();
    let mut store = Store::new();
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for i in 0..size {
        store
            .create_object(Some(1), NewVersion::local(object_data(i), schema.clone(), None, at))
            .unwrap();
    }
    store
}

fn bench_query_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_compilation");
    let engine = SearchEngine::new(SearchConfig::new());
    let schema = create_test_schema();

    group.bench_function("parse", |b| b.iter(|| engine.parse(black_box(QUERY))));

    group.bench_function("parse_and_compile", |b| {
        b.iter(|| engine.generate_filter_func(black_box(QUERY), true, &schema))
    });

    // fallback path: advanced parse fails, full-text predicate is built
    group.bench_function("full_text_fallback", |b| {
        b.iter(|| engine.generate_filter_func(black_box("sample 12"), false, &schema))
    });

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let engine = SearchEngine::new(SearchConfig::new());
    let schema = create_test_schema();

    for size in [100, 1000].iter() {
        let store = create_test_store(*size);
        group.bench_with_input(BenchmarkId::new("advanced", size), size, |b, _| {
            b.iter(|| engine.search(&store, black_box(QUERY), true, &schema).objects.len())
        });
        group.bench_with_input(BenchmarkId::new("full_text", size), size, |b, _| {
            b.iter(|| engine.search(&store, black_box("item 9"), false, &schema).objects.len())
        });
    }

    group.finish();
}

fn bench_federation(c: &mut Criterion) {
    let mut group = c.benchmark_group("federation");
    let schema = create_test_schema();

    let base = object_data(1);
    let mut local = base.clone();
    local["name"] = json!({"_type": "text", "text": "local"});
    let mut imported = base.clone();
    imported["list"]
        .as_array_mut()
        .unwrap()
        .push(json!({"_type": "text", "text": "appended"}));

    group.bench_function("automerge", |b| {
        b.iter(|| merge(Some(&base), black_box(&local), black_box(&imported), schema.root()))
    });

    group.bench_function("data_hash", |b| {
        b.iter(|| calculate_data_hash(Some(black_box(&base)), Some(&schema), None))
    });

    group.finish();
}

criterion_group!(benches, bench_query_compilation, bench_search, bench_federation);
criterion_main!(benches);
