//! Convolver hot-path benchmarks.
//!
//! The per-block cost must stay well under the period deadline
//! (e.g. 256 frames @ 48 kHz = 5.33 ms); these benches track it across
//! representative cabinet IR lengths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cadena_dsp::PartitionedConvolver;

fn ir_of_len(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let decay = (-(i as f32) / len as f32 * 6.0).exp();
            decay * if i % 2 == 0 { 1.0 } else { -0.8 }
        })
        .collect()
}

fn bench_process_block(c: &mut Criterion) {
    let block = 256;
    let input: Vec<f32> = (0..block).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();

    let mut group = c.benchmark_group("convolver_process");
    for ir_len in [512usize, 4096, 24000] {
        let ir = ir_of_len(ir_len);
        let mut conv = PartitionedConvolver::new(&ir, block).unwrap();
        let mut out = vec![0.0f32; block];

        group.bench_function(format!("ir_{ir_len}_block_{block}"), |b| {
            b.iter(|| {
                conv.process(black_box(&input), black_box(&mut out));
            })
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let ir = ir_of_len(24000);
    c.bench_function("convolver_build_ir_24000", |b| {
        b.iter(|| PartitionedConvolver::new(black_box(&ir), 256).unwrap())
    });
}

criterion_group!(benches, bench_process_block, bench_build);
criterion_main!(benches);
