// benches/roundtrip_benchmarks.rs — Host-side and end-to-end round-trip
// benchmarks.
//
//   cargo bench --bench roundtrip_benchmarks
//
// The host benchmarks always run. The GPU group is skipped with a note on
// stderr when no adapter is available.
//
// The GPU numbers are wall time for a full upload → launch → sync →
// read-back → compare cycle, including resource creation and release.
// The first iterations pay pipeline compilation on some drivers, so the
// warm-up time is set explicitly.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;

use tex2d_probe::gpu::device::GpuDevice;
use tex2d_probe::gpu::kernel::KernelModule;
use tex2d_probe::gpu::texture::{Copy2d, SamplerConfig};
use tex2d_probe::image::{linear_ramp, reference_kernel};
use tex2d_probe::roundtrip::run_round_trip;
use tex2d_probe::verify::compare;

const SIZES: [(usize, usize); 3] = [(256, 256), (1000, 600), (2048, 2048)];

const KERNEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/tex2d_kernel.wgsl");

// ============================================================
// Host side
// ============================================================

fn bench_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("host");

    for &(w, h) in &SIZES {
        let id = format!("{w}x{h}");
        let src = linear_ramp(w, h);
        let out = src.clone();
        let copy = Copy2d::for_image(&src);

        group.bench_with_input(BenchmarkId::new("linear_ramp", &id), &(w, h), |b, &(w, h)| {
            b.iter(|| linear_ramp(black_box(w), black_box(h)))
        });
        group.bench_with_input(BenchmarkId::new("compare", &id), &src, |b, src| {
            b.iter(|| compare(black_box(src), black_box(&out)))
        });
        group.bench_with_input(BenchmarkId::new("repack", &id), &src, |b, src| {
            b.iter(|| copy.repack(black_box(src.as_bytes())))
        });
    }

    let src = linear_ramp(256, 256);
    group.bench_function("reference_kernel/256x256", |b| {
        b.iter(|| reference_kernel(black_box(&src), SamplerConfig::default().address_mode))
    });

    group.finish();
}

// ============================================================
// GPU round trip
// ============================================================

fn bench_round_trip(c: &mut Criterion) {
    let gpu = match GpuDevice::new() {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no GPU ({e}), skipping round-trip benchmark.");
            return;
        }
    };
    let kernel = KernelModule::load(&gpu, KERNEL).expect("shipped kernel should compile");
    eprintln!("round-trip benchmark on {gpu}");

    let mut group = c.benchmark_group("round_trip");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(20);

    for &(w, h) in &SIZES {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}")),
            &(w as u32, h as u32),
            |b, &(w, h)| {
                b.iter(|| {
                    let v = run_round_trip(&gpu, &kernel, w, h, SamplerConfig::default())
                        .expect("round trip failed");
                    assert!(v.passed());
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_host, bench_round_trip);
criterion_main!(benches);
