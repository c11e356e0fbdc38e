//! Benchmarks for frame scoring and the batch search pipeline.
//!
//! Run with: cargo bench
//!
//! All inputs are synthetic, so no media fixtures are required.

use criterion::Criterion;
use image::{GrayImage, Luma};
use stillscan::{
    BoundarySearch, PixelDiff, SearchOptions, SearchOutcome, SimilarityMetric, Ssim,
    SyntheticSource,
};

fn gradient(width: u32, height: u32, phase: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([((x + y * 3 + phase) % 251) as u8])
    })
}

fn benchmark_metric_scoring(criterion: &mut Criterion) {
    let reference = gradient(640, 360, 0);
    let similar = gradient(640, 360, 2);
    let unrelated = GrayImage::from_pixel(640, 360, Luma([18]));

    criterion.bench_function("ssim 640x360 similar pair", |bencher| {
        let ssim = Ssim;
        bencher.iter(|| {
            let _score = ssim.score(&reference, &similar).unwrap();
        });
    });

    criterion.bench_function("ssim 640x360 unrelated pair", |bencher| {
        let ssim = Ssim;
        bencher.iter(|| {
            let _score = ssim.score(&reference, &unrelated).unwrap();
        });
    });

    criterion.bench_function("pixel diff 640x360", |bencher| {
        let pixel = PixelDiff;
        bencher.iter(|| {
            let _score = pixel.score(&reference, &similar).unwrap();
        });
    });
}

fn benchmark_batch_search(criterion: &mut Criterion) {
    let reference = gradient(160, 90, 0);
    let mut stream: Vec<GrayImage> = (0..200).map(|i| gradient(160, 90, i % 5)).collect();
    stream.extend((0..40).map(|_| GrayImage::from_pixel(160, 90, Luma([18]))));

    let mut group = criterion.benchmark_group("batch search 240 frames");
    group.sample_size(20);

    for workers in [1, 2, 4] {
        group.bench_function(format!("{workers} workers"), |bencher| {
            bencher.iter(|| {
                let mut source = SyntheticSource::new(stream.clone(), 24.0);
                let options = SearchOptions::new().with_workers(workers).with_batch_size(64);
                let search = BoundarySearch::new(reference.clone(), options);
                let outcome = search.run(&mut source).unwrap();
                assert!(matches!(outcome, SearchOutcome::Found(_)));
            });
        });
    }

    group.finish();
}

criterion::criterion_group!(benches, benchmark_metric_scoring, benchmark_batch_search);
criterion::criterion_main!(benches);
