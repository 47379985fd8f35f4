use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pgsql_lob_driver::QueryOptions;
use pgsql_lob_driver::preprocess::preprocess;
use pgsql_lob_driver::test_utils::memory::MemoryServer;

fn plain_statement(columns: usize) -> String {
    let list = (0..columns)
        .map(|i| format!("c{i} /* column {i} */"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {list} FROM t WHERE name = 'it''s' AND path = 'a\\b'")
}

fn preprocess_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");

    for columns in [10usize, 100, 1000] {
        let sql = plain_statement(columns);
        group.throughput(Throughput::Bytes(sql.len() as u64));
        group.bench_with_input(BenchmarkId::new("fast_path", columns), &sql, |b, sql| {
            let server = MemoryServer::new();
            let mut conn = server.connection();
            let options = QueryOptions::default();
            b.iter(|| {
                let out = preprocess(&mut conn, black_box(sql), &options, 4096)
                    .expect("plain statement");
                black_box(out.sql.len())
            });
        });
    }

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let sql = format!("INSERT INTO docs VALUES (/**body**/'{}')", "x".repeat(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("literal_upload", size), &sql, |b, sql| {
            b.iter(|| {
                // fresh server per iteration so stored objects do not accumulate
                let server = MemoryServer::new();
                let mut conn = server.connection();
                let out = preprocess(&mut conn, black_box(sql), &QueryOptions::default(), 4096)
                    .expect("annotated statement");
                black_box(out.large_objects)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, preprocess_benchmark);
criterion_main!(benches);
