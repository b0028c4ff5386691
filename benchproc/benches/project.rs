//! Microbenchmarks for the per-record hot paths.
//!
//! Measures `Schema::project`, `Schema::project_values` and
//! `Filter::match_record` over a realistic record stream.
//!
//! Run with: `cargo bench -p benchproc -- project`

#![allow(missing_docs, clippy::cast_precision_loss)]

use benchproc::filter::Filter;
use benchproc::projection::ProjectionParser;
use benchproc::record::Record;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

/// Builds `n` records spread over a few machines, sizes and modes.
fn records(n: usize) -> Vec<Record> {
    let oses = ["linux", "darwin", "windows"];
    let arches = ["amd64", "arm64"];
    (0..n)
        .map(|i| {
            Record::new(format!(
                "BenchmarkEncode/size={}/mode={}-8",
                1 << (i % 10),
                if i % 2 == 0 { "fast" } else { "safe" }
            ))
            .with_file_config("goos", oses[i % oses.len()])
            .with_file_config("goarch", arches[i % arches.len()])
            .with_file_config("commit", &format!("c{}", i % 4))
            .with_value(100.0 + (i % 7) as f64, "ns/op")
            .with_value(64.0, "B/op")
            .with_value(2.0, "allocs/op")
        })
        .collect()
}

fn bench_project(c: &mut Criterion) {
    let recs = records(1000);
    let mut group = c.benchmark_group("project");

    for proj in [".name", "goos,goarch", ".config", ".fullname", "goos,/size@numeric,/mode"] {
        let mut schema = ProjectionParser::new().parse(proj).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(proj), &recs, |b, recs| {
            b.iter(|| {
                for r in recs {
                    black_box(schema.project(black_box(r)));
                }
            });
        });
    }
    group.finish();
}

fn bench_project_values(c: &mut Criterion) {
    let recs = records(1000);
    let mut schema = ProjectionParser::new().parse("/size,.unit").unwrap();

    c.bench_function("project_values/size_unit", |b| {
        b.iter(|| {
            for r in &recs {
                black_box(schema.project_values(black_box(r)));
            }
        });
    });
}

fn bench_match(c: &mut Criterion) {
    let recs = records(1000);
    let mut group = c.benchmark_group("match");

    for query in [
        "*",
        "goos:linux",
        "goos:(linux darwin) -goarch:arm64",
        "/size:(1 2 4) AND .unit:ns/op",
        ".name:Benchmark.* OR commit:c[0-2]",
    ] {
        let filter = Filter::new(query).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(query), &recs, |b, recs| {
            b.iter(|| {
                for r in recs {
                    black_box(filter.match_record(black_box(r)));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_project, bench_project_values, bench_match);
criterion_main!(benches);
