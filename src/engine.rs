//! The backend engine interface (§6): the opaque, dense sub-state-vector
//! collaborator an [`crate::node::Node::AttachedLeaf`] wraps. The gate
//! library, OpenCL/accelerator drivers, and RNG backing these engines are
//! all out of scope (§1) — this module defines the trait boundary plus one
//! concrete, dense, in-memory implementation so the rest of the crate is
//! exercisable without a real accelerator.
//!
//! Grounded in the teacher's trait-bounded external-collaborator pattern
//! (`src/communication/world_communicator.rs`, `collective_communicator.rs`):
//! a small trait capturing exactly the operations the core needs from its
//! collaborator, with the concrete transport (there: MPI vs. in-process;
//! here: a real accelerator vs. a dense CPU stand-in) swapped out behind it.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;

use crate::node::Mtrx2x2;

/// The dense sub-state-vector engine an [`crate::node::Node::AttachedLeaf`]
/// delegates to once a gate target falls past `bdtQubitCount`.
pub trait AttachedEngine: Send + Sync + fmt::Debug {
    fn qubit_count(&self) -> usize;

    fn get_amplitude(&self, perm: u64) -> Complex64;
    fn set_amplitude(&mut self, perm: u64, amplitude: Complex64);

    fn prob(&self, qubit: usize) -> f64;
    fn prob_all(&self, perm: u64) -> f64 {
        self.get_amplitude(perm).norm_sqr()
    }

    /// Projective measurement of `qubit`. Returns the sampled/forced result.
    fn force_m(&mut self, qubit: usize, result: bool, do_force: bool, do_apply: bool) -> bool;
    /// Full measurement, returning the measured basis state.
    fn m_all(&mut self) -> u64;

    fn mtrx(&mut self, u: &Mtrx2x2, target: usize);
    fn mc_mtrx(&mut self, controls: &[usize], u: &Mtrx2x2, target: usize);

    /// Composes `other` onto the high-index qubits of `self`, growing
    /// `qubit_count()` by `other.qubit_count()`.
    fn compose(&mut self, other: &dyn AttachedEngine);

    fn set_device(&mut self, id: usize);
    fn device_id(&self) -> usize;
    fn max_size(&self) -> u64;

    fn clone_engine(&self) -> Arc<dyn AttachedEngine>;
}

/// A reference dense state-vector engine: the default, always-available
/// backend used wherever a real accelerator engine would be supplied.
#[derive(Debug, Clone)]
pub struct DenseEngine {
    qubit_count: usize,
    amplitudes: Vec<Complex64>,
    device_id: usize,
}

impl DenseEngine {
    pub fn new_basis_state(qubit_count: usize, init_state: u64) -> Self {
        let size = 1usize << qubit_count;
        let mut amplitudes = vec![Complex64::new(0.0, 0.0); size];
        amplitudes[init_state as usize] = Complex64::new(1.0, 0.0);
        Self {
            qubit_count,
            amplitudes,
            device_id: 0,
        }
    }

    pub fn from_amplitudes(qubit_count: usize, amplitudes: Vec<Complex64>) -> Self {
        debug_assert_eq!(amplitudes.len(), 1usize << qubit_count);
        Self {
            qubit_count,
            amplitudes,
            device_id: 0,
        }
    }

    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }
}

impl AttachedEngine for DenseEngine {
    fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    fn get_amplitude(&self, perm: u64) -> Complex64 {
        self.amplitudes[perm as usize]
    }

    fn set_amplitude(&mut self, perm: u64, amplitude: Complex64) {
        self.amplitudes[perm as usize] = amplitude;
    }

    fn prob(&self, qubit: usize) -> f64 {
        let bit = 1usize << qubit;
        self.amplitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| i & bit != 0)
            .map(|(_, amp)| amp.norm_sqr())
            .sum()
    }

    fn force_m(&mut self, qubit: usize, result: bool, do_force: bool, do_apply: bool) -> bool {
        let bit = 1usize << qubit;
        let one_chance = self.prob(qubit);
        let outcome = if do_force {
            result
        } else {
            ::rand::random::<f64>() < one_chance
        };
        if do_apply {
            let norm = if outcome {
                one_chance.sqrt()
            } else {
                (1.0 - one_chance).sqrt()
            };
            for (i, amp) in self.amplitudes.iter_mut().enumerate() {
                let bit_set = i & bit != 0;
                if bit_set != outcome {
                    *amp = Complex64::new(0.0, 0.0);
                } else if norm > 0.0 {
                    *amp /= norm;
                }
            }
        }
        outcome
    }

    fn m_all(&mut self) -> u64 {
        let r: f64 = ::rand::random();
        let mut acc = 0.0;
        let mut chosen = self.amplitudes.len() - 1;
        for (i, amp) in self.amplitudes.iter().enumerate() {
            acc += amp.norm_sqr();
            if r < acc {
                chosen = i;
                break;
            }
        }
        self.amplitudes.iter_mut().for_each(|a| *a = Complex64::new(0.0, 0.0));
        self.amplitudes[chosen] = Complex64::new(1.0, 0.0);
        chosen as u64
    }

    fn mtrx(&mut self, u: &Mtrx2x2, target: usize) {
        let bit = 1usize << target;
        for i in 0..self.amplitudes.len() {
            if i & bit != 0 {
                continue;
            }
            let j = i | bit;
            let (a, b) = u.apply(self.amplitudes[i], self.amplitudes[j]);
            self.amplitudes[i] = a;
            self.amplitudes[j] = b;
        }
    }

    fn mc_mtrx(&mut self, controls: &[usize], u: &Mtrx2x2, target: usize) {
        let bit = 1usize << target;
        let control_mask: usize = controls.iter().map(|c| 1usize << c).sum();
        for i in 0..self.amplitudes.len() {
            if i & bit != 0 {
                continue;
            }
            if i & control_mask != control_mask {
                continue;
            }
            let j = i | bit;
            let (a, b) = u.apply(self.amplitudes[i], self.amplitudes[j]);
            self.amplitudes[i] = a;
            self.amplitudes[j] = b;
        }
    }

    fn compose(&mut self, other: &dyn AttachedEngine) {
        let other_count = other.qubit_count();
        let mut new_amplitudes =
            vec![Complex64::new(0.0, 0.0); self.amplitudes.len() * (1usize << other_count)];
        for (i, self_amp) in self.amplitudes.iter().enumerate() {
            if self_amp.norm_sqr() == 0.0 {
                continue;
            }
            for j in 0..(1u64 << other_count) {
                let other_amp = other.get_amplitude(j);
                if other_amp.norm_sqr() == 0.0 {
                    continue;
                }
                let idx = i | ((j as usize) << self.qubit_count);
                new_amplitudes[idx] = self_amp * other_amp;
            }
        }
        self.qubit_count += other_count;
        self.amplitudes = new_amplitudes;
    }

    fn set_device(&mut self, id: usize) {
        self.device_id = id;
    }

    fn device_id(&self) -> usize {
        self.device_id
    }

    fn max_size(&self) -> u64 {
        crate::device::registry()
            .get(self.device_id)
            .map(|d| d.max_size())
            .unwrap_or(u64::MAX)
    }

    fn clone_engine(&self) -> Arc<dyn AttachedEngine> {
        Arc::new(self.clone())
    }
}
