use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cip_bench::wide_arena;
use cip_mcts::{select_child, ROOT};

fn bench_select_child(c: &mut Criterion) {
    let mut g = c.benchmark_group("cip_mcts_select_child");
    for &n in &[16usize, 256usize] {
        let arena = wide_arena(n);
        g.bench_with_input(BenchmarkId::new("uct", n), &arena, |b, a| {
            b.iter(|| black_box(select_child(black_box(a), ROOT, black_box(0.5))))
        });
    }
    g.finish();
}

criterion_group!(benches, bench_select_child);
criterion_main!(benches);
