//! Schema Rendering Benchmarks
//!
//! Measures `schema_as_sql` over descriptor sets of increasing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use schemata::engine::render::schema_as_sql;
use schemata::{ColumnDescriptor, TableDescriptor};

fn tables(count: usize) -> Vec<TableDescriptor> {
    (0..count)
        .map(|i| TableDescriptor {
            name: format!("table_{i}"),
            columns: vec![
                ColumnDescriptor {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: false,
                    default: Some(format!("nextval('table_{i}_id_seq'::regclass)")),
                    is_primary: true,
                },
                ColumnDescriptor {
                    name: "name".to_string(),
                    data_type: "text".to_string(),
                    nullable: false,
                    default: None,
                    is_primary: false,
                },
                ColumnDescriptor {
                    name: "created_at".to_string(),
                    data_type: "timestamp without time zone".to_string(),
                    nullable: true,
                    default: Some("now()".to_string()),
                    is_primary: false,
                },
            ],
            row_count: 0,
        })
        .collect()
}

fn bench_schema_as_sql(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema_as_sql");
    for count in [1, 10, 100] {
        let input = tables(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| schema_as_sql(black_box(input)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_schema_as_sql);
criterion_main!(benches);
