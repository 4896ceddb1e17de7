//! Statement Policy Benchmarks
//!
//! Every tenant statement passes the deny-list and readonly gate before it
//! reaches the pool. These benchmarks measure that check for:
//! - Short SELECT statements
//! - Denied statements (early exit)
//! - Large migration scripts scanned in full

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use schemata::{validate_statement, ExecutionMode};

fn bench_readonly_select(c: &mut Criterion) {
    c.bench_function("policy_readonly_select", |b| {
        b.iter(|| {
            validate_statement(
                black_box("SELECT id, name FROM widgets WHERE id > 10 ORDER BY name"),
                ExecutionMode::ReadOnly,
            )
        });
    });
}

fn bench_denied_statement(c: &mut Criterion) {
    c.bench_function("policy_denied_drop_schema", |b| {
        b.iter(|| validate_statement(black_box("drop schema project_1 cascade"), ExecutionMode::ReadWrite));
    });
}

fn bench_large_migration(c: &mut Criterion) {
    let script: String = (0..500)
        .map(|i| format!("CREATE TABLE t{i} (id serial primary key, name text not null);\n"))
        .collect();

    c.bench_function("policy_large_migration", |b| {
        b.iter(|| validate_statement(black_box(&script), ExecutionMode::ReadWrite));
    });
}

criterion_group!(benches, bench_readonly_select, bench_denied_statement, bench_large_migration);
criterion_main!(benches);
