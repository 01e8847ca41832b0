// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the document object model: page copying (merge and
// split) and overlay stamping on a synthetic 20-page document.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use blattwerk_document::testing::sample_pdf;
use blattwerk_document::{DocumentHandle, WatermarkStyle};

const PAGES: usize = 20;

fn letter_document() -> Vec<u8> {
    sample_pdf(&[(612.0, 792.0); PAGES])
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Parse two documents and concatenate them into a fresh one.
fn bench_merge(c: &mut Criterion) {
    let bytes = letter_document();
    let indices: Vec<u32> = (0..PAGES as u32).collect();

    c.bench_function("merge (2 x 20 pages)", |b| {
        b.iter(|| {
            let mut merged = DocumentHandle::empty();
            for _ in 0..2 {
                let source = DocumentHandle::parse(black_box(&bytes)).expect("parse");
                merged.copy_pages(&source, &indices).expect("copy");
            }
            black_box(merged.serialize().expect("serialize"));
        });
    });
}

/// Split every page into its own document.
fn bench_split(c: &mut Criterion) {
    let bytes = letter_document();

    c.bench_function("split (20 pages)", |b| {
        b.iter(|| {
            let source = DocumentHandle::parse(black_box(&bytes)).expect("parse");
            for index in 0..source.page_count() {
                let mut single = DocumentHandle::empty();
                single.copy_pages(&source, &[index]).expect("copy");
                black_box(single.serialize().expect("serialize"));
            }
        });
    });
}

/// Stamp the default watermark on every page.
fn bench_watermark(c: &mut Criterion) {
    let bytes = letter_document();
    let style = WatermarkStyle::default();

    c.bench_function("watermark (20 pages)", |b| {
        b.iter(|| {
            let mut doc = DocumentHandle::parse(black_box(&bytes)).expect("parse");
            doc.stamp_watermark(&style).expect("watermark");
            black_box(doc.serialize().expect("serialize"));
        });
    });
}

criterion_group!(benches, bench_merge, bench_split, bench_watermark);
criterion_main!(benches);
