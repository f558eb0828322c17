//! Benchmarks for marker scanning.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sidenotes::config::AnnotationFormat;
use sidenotes::markers::{ScanOptions, scan};

fn long_document(paragraphs: usize) -> String {
    let mut md = String::new();
    for i in 0..paragraphs {
        if i % 20 == 0 {
            md.push_str(&format!("## Section {i}\n\n"));
        }
        md.push_str(&format!(
            "Paragraph {i} with a note<span class=\"sidenote\">Note {i}</span> and a ref[^{i}].\n\n"
        ));
    }
    for i in 0..paragraphs {
        md.push_str(&format!("[^{i}]: Definition {i}\n"));
    }
    md
}

fn bench_scan_fixture(c: &mut Criterion) {
    let md = include_str!("../tests/fixtures/essay.md");
    c.bench_function("scan_fixture_inline", |b| {
        b.iter(|| scan(black_box(md), ScanOptions::default()))
    });
}

fn bench_scan_long(c: &mut Criterion) {
    let md = long_document(1_000);
    c.bench_function("scan_long_inline", |b| {
        b.iter(|| scan(black_box(&md), ScanOptions::default()))
    });
    let footnotes = ScanOptions {
        format: AnnotationFormat::FootnoteRef,
        reset_per_heading: true,
    };
    c.bench_function("scan_long_footnotes", |b| {
        b.iter(|| scan(black_box(&md), footnotes))
    });
}

criterion_group!(benches, bench_scan_fixture, bench_scan_long);
criterion_main!(benches);
