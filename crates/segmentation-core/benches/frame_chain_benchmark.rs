// Frame chain benchmark - measure the CPU stages around inference
//
// Run with: cargo bench -p surgery-seg-core --bench frame_chain_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array4;
use surgery_seg_common::{ChannelOrder, Frame, CROP_HEIGHT, CROP_WIDTH};
use surgery_seg_core::{composite, decode_mask, preprocess};

fn test_frame(width: u32, height: u32) -> Frame {
    Frame::from_fn(width, height, ChannelOrder::Bgr, |x, y| {
        [
            ((x + y) % 256) as u8,
            ((x * 2) % 256) as u8,
            ((y * 2) % 256) as u8,
        ]
    })
}

/// Crop + tensor conversion at common source resolutions
fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");

    let resolutions = vec![(1280, 1024, "1280x1024"), (1920, 1080, "1920x1080")];

    for (width, height, name) in resolutions {
        let frame = test_frame(width, height);
        group.bench_with_input(BenchmarkId::new("crop_and_tensor", name), &frame, |b, f| {
            b.iter(|| {
                let result = preprocess(black_box(f));
                black_box(result)
            });
        });
    }

    group.finish();
}

/// Mask decode and compositing at the crop size
fn bench_postprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocess");

    let (h, w) = (CROP_HEIGHT as usize, CROP_WIDTH as usize);
    let raw = Array4::from_shape_fn((1, 4, h, w), |(_, c, y, x)| {
        ((c * 31 + y * 7 + x * 3) % 101) as f32 / 100.0
    });

    group.bench_function("decode_mask", |b| {
        b.iter(|| black_box(decode_mask(black_box(&raw))));
    });

    let frame = test_frame(CROP_WIDTH, CROP_HEIGHT);
    let mask = decode_mask(&raw).expect("raw output has crop shape");
    group.bench_function("composite", |b| {
        b.iter(|| black_box(composite(black_box(&frame), black_box(&mask))));
    });

    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_postprocess);
criterion_main!(benches);
