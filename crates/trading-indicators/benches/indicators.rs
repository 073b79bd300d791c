//! Benchmarks for incremental versus batch indicator computation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trading_core::traits::Indicator;
use trading_indicators::{Ema, IndicatorConfig, IndicatorState, Macd};

fn generate_test_data(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0)
        .collect()
}

fn benchmark_next_bar(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_bar");

    for size in [200, 500, 2000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("incremental", size), &data, |b, data| {
            let mut state = IndicatorState::new(IndicatorConfig::new(12, 26, 9).with_base(200))
                .expect("valid periods");
            state.seed(&data[..200]).expect("enough closes");
            b.iter(|| state.update(black_box(101.0)))
        });

        group.bench_with_input(BenchmarkId::new("batch", size), &data, |b, data| {
            let macd = Macd::with_periods(12, 26, 9);
            let base = Ema::new(200);
            b.iter(|| {
                let m = macd.calculate(black_box(data));
                let e = base.calculate(black_box(data));
                (m.last().copied(), e.last().copied())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_next_bar);
criterion_main!(benches);
