use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use qbdt::config::Config;
use qbdt::node::Mtrx2x2;
use qbdt::qbdt::Qbdt;

fn bench_single_qubit_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("hadamard_all_qubits");
    for qubit_count in [4usize, 8, 12, 16, 20] {
        group.bench_with_input(BenchmarkId::from_parameter(qubit_count), &qubit_count, |b, &n| {
            b.iter(|| {
                let mut q = Qbdt::new(n, Config::default());
                for target in 0..n {
                    q.mtrx(&Mtrx2x2::hadamard(), target).unwrap();
                }
                black_box(q.prob(0).unwrap())
            });
        });
    }
    group.finish();
}

fn bench_ghz_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("ghz_chain");
    for qubit_count in [4usize, 8, 12, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(qubit_count), &qubit_count, |b, &n| {
            b.iter(|| {
                let mut q = Qbdt::new(n, Config::default());
                q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
                for target in 1..n {
                    q.mc_mtrx(&[target - 1], &Mtrx2x2::pauli_x(), target).unwrap();
                }
                black_box(q.prob(n - 1).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_qubit_gate, bench_ghz_chain);
criterion_main!(benches);
