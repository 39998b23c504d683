use num_complex::Complex64;

use qbdt::config::Config;
use qbdt::node::Mtrx2x2;
use qbdt::qbdt::Qbdt;

fn assert_normalized(q: &Qbdt) {
    let total: f64 = q.get_probs().iter().sum();
    assert!((total - 1.0).abs() < 1e-9, "total probability {total} should be 1");
}

#[test]
fn bell_pair_measurements_are_correlated() {
    let mut q = Qbdt::new(2, Config::default());
    q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
    q.mc_mtrx(&[0], &Mtrx2x2::pauli_x(), 1).unwrap();
    assert_normalized(&q);

    let a = q.force_m(0, None).unwrap();
    let b = q.force_m(1, None).unwrap();
    assert_eq!(a, b);
}

#[test]
fn ghz_chain_of_five_qubits_stays_normalized_and_correlated() {
    let mut q = Qbdt::new(5, Config::default());
    q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
    for target in 1..5 {
        q.mc_mtrx(&[target - 1], &Mtrx2x2::pauli_x(), target).unwrap();
    }
    assert_normalized(&q);
    let perm = q.m_all();
    let all_zero = perm == 0;
    let all_one = perm == 0b11111;
    assert!(all_zero || all_one);
}

#[test]
fn compose_then_decompose_round_trips_a_product_state() {
    let mut a = Qbdt::new(2, Config::default());
    a.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
    a.mtrx(&Mtrx2x2::pauli_x(), 1).unwrap();
    let b = Qbdt::new(3, Config::default());

    let mut combined = a.clone();
    combined.compose(b);
    assert_eq!(combined.qubit_count(), 5);

    let recovered = combined.decompose(2, 3).unwrap();
    assert_eq!(recovered.qubit_count(), 3);
    assert_eq!(combined.qubit_count(), 2);
    assert!(combined.sum_sqr_diff(&a) < 1e-9);
}

#[test]
fn decomposing_an_entangled_range_is_rejected() {
    let mut q = Qbdt::new(2, Config::default());
    q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
    q.mc_mtrx(&[0], &Mtrx2x2::pauli_x(), 1).unwrap();
    assert!(!q.is_separable(0, 1));
    assert!(q.decompose(0, 1).is_err());
}

#[test]
fn set_and_get_quantum_state_round_trips() {
    let mut q = Qbdt::new(2, Config::default());
    let target = vec![
        Complex64::new(0.5, 0.0),
        Complex64::new(0.5, 0.0),
        Complex64::new(0.5, 0.0),
        Complex64::new(0.5, 0.0),
    ];
    q.set_quantum_state(&target);
    let state = q.get_quantum_state();
    for (got, want) in state.iter().zip(target.iter()) {
        assert!((got - want).norm() < 1e-9);
    }
}

#[test]
fn x_gate_then_x_gate_is_identity() {
    let mut q = Qbdt::new(1, Config::default());
    q.mtrx(&Mtrx2x2::pauli_x(), 0).unwrap();
    q.mtrx(&Mtrx2x2::pauli_x(), 0).unwrap();
    assert!((q.prob(0).unwrap()).abs() < 1e-9);
}

#[test]
fn repeated_hadamards_on_a_wide_register_stay_normalized() {
    let mut q = Qbdt::new(10, Config::default());
    for _ in 0..3 {
        for target in 0..10 {
            q.mtrx(&Mtrx2x2::hadamard(), target).unwrap();
        }
    }
    assert_normalized(&q);
}
