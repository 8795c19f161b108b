use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use piecetext::{Document, SearchOptions};
use std::time::Duration;

fn sample_text(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("    let value_{i} = compute({i}, \"item\");\n"))
        .collect()
}

fn typing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("typing");
    group.measurement_time(Duration::from_secs(10));

    let text = sample_text(10_000);
    group.bench_function("type_1000_chars_mid_document", |b| {
        b.iter(|| {
            let mut doc = Document::from_text(&text).unwrap();
            let mut offset = doc.line_start(5_000).unwrap();
            for _ in 0..1000 {
                doc.insert(offset, "x").unwrap();
                offset += 1;
            }
            black_box(doc.len())
        })
    });

    group.bench_function("undo_redo_burst", |b| {
        let mut doc = Document::from_text(&text).unwrap();
        for i in 0..200 {
            doc.insert(i, "y").unwrap();
        }
        b.iter(|| {
            doc.undo().unwrap();
            black_box(doc.redo().unwrap())
        })
    });

    group.finish();
}

fn random_edit_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_edits");
    group.measurement_time(Duration::from_secs(10));

    for lines in [1_000, 10_000, 100_000].iter() {
        let text = sample_text(*lines);
        group.bench_with_input(BenchmarkId::new("scattered_replace", lines), lines, |b, _| {
            b.iter(|| {
                let mut doc = Document::from_text(&text).unwrap();
                // Fixed LCG so every run edits the same places
                let mut seed = 0x2545_F491_u64;
                for _ in 0..500 {
                    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let offset = (seed >> 33) as usize % doc.len();
                    doc.replace(offset, 1, "z\n").unwrap();
                }
                black_box(doc.line_count())
            })
        });
    }

    let text = sample_text(10_000);
    let doc = Document::from_text(&text).unwrap();
    group.bench_function("line_lookup", |b| {
        b.iter(|| {
            for line in (0..10_000).step_by(97) {
                black_box(doc.line_text(line));
            }
        })
    });

    group.finish();
}

fn search_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.measurement_time(Duration::from_secs(10));

    let mut doc = Document::from_text(&sample_text(50_000)).unwrap();
    // Fragment the table so matches straddle pieces
    for i in (0..doc.len()).step_by(4_001).take(500) {
        doc.insert_block(i, "#").unwrap();
    }

    group.bench_function("find_all_literal", |b| {
        b.iter(|| black_box(doc.find_all("compute(4999", &SearchOptions::default()).unwrap()))
    });
    group.bench_function("find_all_regex", |b| {
        let options = SearchOptions::default().regex();
        b.iter(|| black_box(doc.find_all(r"value_\d+7 ", &options).unwrap()))
    });
    group.bench_function("find_backward_wrapping", |b| {
        let options = SearchOptions::default().backward().wrapping();
        b.iter(|| black_box(doc.search("value_49999", 0, &options).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, typing_benchmark, random_edit_benchmark, search_benchmark);
criterion_main!(benches);
