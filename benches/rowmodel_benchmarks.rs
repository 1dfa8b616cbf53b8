use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rowmodel::filter::{apply_filter, parse_filter_model};
use rowmodel::group::apply_group;
use rowmodel::sort::apply_sort;
use rowmodel::*;
use serde_json::json;
use std::collections::HashMap;

fn build_table(size: usize) -> Table {
    let schema = Schema::new(vec![
        ("region".to_string(), ColumnType::String, false),
        ("product".to_string(), ColumnType::String, false),
        ("amount".to_string(), ColumnType::Float64, false),
        ("waiver".to_string(), ColumnType::String, false),
    ]);
    let mut table = Table::new("bench".to_string(), schema);
    for i in 0..size {
        let mut row = HashMap::new();
        row.insert("region".to_string(), ColumnValue::String(format!("region_{}", i % 8)));
        row.insert("product".to_string(), ColumnValue::String(format!("product_{}", i % 50)));
        row.insert("amount".to_string(), ColumnValue::Float64((i % 997) as f64 * 1.5));
        row.insert("waiver".to_string(), ColumnValue::String(String::new()));
        table.append_row(row).unwrap();
    }
    table.with_identity().unwrap()
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_or");
    let model = json!({
        "filterType": "join",
        "type": "OR",
        "conditions": [
            {"colId": "amount", "filterType": "number", "type": "greaterThan", "filter": 1000},
            {"colId": "region", "filterType": "text", "type": "startsWith", "filter": "region_1"}
        ]
    });
    let node = parse_filter_model(&model).unwrap().unwrap();

    for size in [1000, 10000, 100000].iter() {
        let table = build_table(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| apply_filter(black_box(&table), &node).unwrap());
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_two_keys");
    let keys = vec![SortKey::ascending("product"), SortKey::descending("amount")];

    for size in [1000, 10000, 100000].iter() {
        let table = build_table(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| apply_sort(black_box(&table), &keys, &[]).unwrap());
        });
    }
    group.finish();
}

fn bench_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_drill");
    let request = GroupRequest {
        dimensions: vec!["region".to_string(), "product".to_string()],
        drill_path: vec![DrillKey::Value(ColumnValue::String("region_3".to_string()))],
        aggregations: vec![("amount".to_string(), AggFunc::Sum)],
    };

    for size in [1000, 10000, 100000].iter() {
        let table = build_table(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| apply_group(black_box(&table), &request, &GroupOptions::default()).unwrap());
        });
    }
    group.finish();
}

fn bench_handle_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_view");
    let request: ViewRequest = serde_json::from_value(json!({
        "filterModel": {"colId": "amount", "filterType": "number", "type": "greaterThan", "filter": 100},
        "sortModel": [{"colId": "region", "sort": "desc"}],
        "rowGroupCols": [{"id": "region"}, {"id": "product"}],
        "groupKeys": [],
        "valueCols": [{"id": "amount", "aggFunc": "avg"}],
        "startRow": 0,
        "endRow": 100
    }))
    .unwrap();
    let options = ViewOptions::default();

    for size in [1000, 10000, 100000].iter() {
        let table = build_table(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| handle_view(black_box(&table), &request, &options));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_filter, bench_sort, bench_group, bench_handle_view);
criterion_main!(benches);
