//! `QUnit` (§4.3): a shard-partitioned register. Single-qubit gates stay
//! local to a shard; any gate spanning shards entangles them first via
//! `EntangleInCurrentBasis`, which composes the touched shards' engines into
//! one. `QUnit` itself is device-agnostic — device placement is
//! `QUnitMulti`'s concern, layered on top in `qunit_multi.rs`.
//!
//! Grounded on `src/domain/mod.rs`'s `DomainDistribution`, which also owns a
//! partition of work units and re-partitions them lazily as load shifts;
//! here the work units are qubits and the trigger is entanglement rather
//! than load imbalance.

use num_complex::Complex64;

use crate::config::Config;
use crate::error::{QbdtError, Result};
use crate::node::Mtrx2x2;
use crate::shard::Shard;

#[derive(Clone, Debug)]
pub struct QUnit {
    shards: Vec<Shard>,
    qubit_count: usize,
    config: Config,
}

impl QUnit {
    pub fn new(qubit_count: usize, config: Config) -> Self {
        let shards = (0..qubit_count)
            .map(|q| Shard::new_single_qubit(q, 0, config.clone()))
            .collect();
        Self {
            shards,
            qubit_count,
            config,
        }
    }

    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn shards_mut(&mut self) -> &mut [Shard] {
        &mut self.shards
    }

    pub fn remove_shard(&mut self, index: usize) -> Shard {
        self.shards.remove(index)
    }

    pub fn push_shard(&mut self, shard: Shard) {
        self.shards.push(shard);
    }

    /// Rebuilds a `QUnit` around an already-partitioned shard set, e.g. the
    /// single shard `QUnitMulti::detach` carves off into its own register.
    /// `qubit_count` must cover every global index appearing in `shards`.
    pub fn from_shards(shards: Vec<Shard>, qubit_count: usize, config: Config) -> Self {
        Self {
            shards,
            qubit_count,
            config,
        }
    }

    pub fn shard_index_of(&self, qubit: usize) -> usize {
        self.shards
            .iter()
            .position(|s| s.contains(qubit))
            .expect("qubit index should belong to exactly one shard")
    }

    fn check_index(&self, qubit: usize) -> Result<()> {
        if qubit >= self.qubit_count {
            Err(QbdtError::InvalidQubitIndex {
                index: qubit,
                qubit_count: self.qubit_count,
            })
        } else {
            Ok(())
        }
    }

    /// `EntangleInCurrentBasis` (§4.3): merges every shard touching any of
    /// `qubits` into a single shard, composing their engines in shard order.
    pub fn entangle_in_current_basis(&mut self, qubits: &[usize]) {
        let mut touched: Vec<usize> = qubits.iter().map(|&q| self.shard_index_of(q)).collect();
        touched.sort_unstable();
        touched.dedup();
        if touched.len() <= 1 {
            return;
        }

        let device_id = self.shards[touched[0]].device_id;
        let mut merged_qubits = Vec::new();
        let mut merged_engine: Option<crate::qbdt::Qbdt> = None;
        for &idx in &touched {
            let shard = &self.shards[idx];
            merged_qubits.extend(shard.qubits.iter().copied());
            merged_engine = Some(match merged_engine.take() {
                None => shard.engine.clone(),
                Some(mut acc) => {
                    acc.compose(shard.engine.clone());
                    acc
                }
            });
        }
        let merged = Shard {
            qubits: merged_qubits,
            engine: merged_engine.expect("touched is non-empty"),
            device_id,
        };

        let mut rebuilt = Vec::with_capacity(self.shards.len() - touched.len() + 1);
        let mut inserted = false;
        for (i, shard) in self.shards.iter().enumerate() {
            if touched.contains(&i) {
                if !inserted {
                    rebuilt.push(merged.clone());
                    inserted = true;
                }
                continue;
            }
            rebuilt.push(shard.clone());
        }
        self.shards = rebuilt;
    }

    pub fn mtrx(&mut self, u: &Mtrx2x2, target: usize) -> Result<()> {
        self.check_index(target)?;
        let si = self.shard_index_of(target);
        let local = self.shards[si].local_index(target).unwrap();
        self.shards[si].engine.mtrx(u, local)
    }

    pub fn mc_mtrx(&mut self, controls: &[usize], u: &Mtrx2x2, target: usize) -> Result<()> {
        self.check_index(target)?;
        for &c in controls {
            self.check_index(c)?;
        }
        let touched: Vec<usize> = controls.iter().copied().chain(std::iter::once(target)).collect();
        self.entangle_in_current_basis(&touched);
        let si = self.shard_index_of(target);
        let locals: Vec<usize> = controls.iter().map(|&c| self.shards[si].local_index(c).unwrap()).collect();
        let local_target = self.shards[si].local_index(target).unwrap();
        self.shards[si].engine.mc_mtrx(&locals, u, local_target)
    }

    pub fn prob(&self, qubit: usize) -> Result<f64> {
        self.check_index(qubit)?;
        let si = self.shard_index_of(qubit);
        let local = self.shards[si].local_index(qubit).unwrap();
        self.shards[si].engine.prob(local)
    }

    pub fn get_amplitude(&self, perm: u64) -> Complex64 {
        self.shards
            .iter()
            .map(|shard| {
                let mut local_perm = 0u64;
                for (local_i, &global_q) in shard.qubits.iter().enumerate() {
                    if (perm >> global_q) & 1 == 1 {
                        local_perm |= 1 << local_i;
                    }
                }
                shard.engine.get_amplitude(local_perm)
            })
            .product()
    }

    pub fn get_quantum_state(&self) -> Vec<Complex64> {
        (0..(1u64 << self.qubit_count)).map(|p| self.get_amplitude(p)).collect()
    }

    pub fn force_m(&mut self, qubit: usize, result: Option<bool>) -> Result<bool> {
        self.check_index(qubit)?;
        let si = self.shard_index_of(qubit);
        let local = self.shards[si].local_index(qubit).unwrap();
        self.shards[si].engine.force_m(local, result)
    }

    /// `MAll`: each shard is independent (any cross-shard correlation would
    /// already have forced a merge), so every shard measures on its own.
    pub fn m_all(&mut self) -> u64 {
        let mut perm = 0u64;
        for shard in self.shards.iter_mut() {
            let local = shard.engine.m_all();
            for (local_i, &global_q) in shard.qubits.iter().enumerate() {
                if (local >> local_i) & 1 == 1 {
                    perm |= 1 << global_q;
                }
            }
        }
        perm
    }

    /// `TrySeparate` (supplemented, §4.3 mentions `SeparateBit` without
    /// detail): if `qubit`'s probability has collapsed to (within
    /// tolerance) 0 or 1, returns the definite bit value.
    pub fn try_separate_bit(&self, qubit: usize) -> Option<bool> {
        let p = self.prob(qubit).ok()?;
        let eps = self.config.separability_threshold;
        if p < eps {
            Some(false)
        } else if (1.0 - p) < eps {
            Some(true)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn independent_qubits_stay_in_separate_shards() {
        let q = QUnit::new(3, Config::default());
        assert_eq!(q.shards().len(), 3);
    }

    #[test]
    fn mc_mtrx_merges_touched_shards() {
        let mut q = QUnit::new(3, Config::default());
        q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
        q.mc_mtrx(&[0], &Mtrx2x2::pauli_x(), 1).unwrap();
        assert_eq!(q.shards().len(), 2);
        assert!((q.prob(0).unwrap() - 0.5).abs() < 1e-9);
        assert!((q.prob(1).unwrap() - 0.5).abs() < 1e-9);
        assert!((q.prob(2).unwrap()).abs() < 1e-9);
    }

    #[test]
    fn try_separate_bit_reads_definite_qubits() {
        let mut q = QUnit::new(1, Config::default());
        q.mtrx(&Mtrx2x2::pauli_x(), 0).unwrap();
        assert_eq!(q.try_separate_bit(0), Some(true));
    }

    #[test]
    fn try_separate_bit_is_none_under_superposition() {
        let mut q = QUnit::new(1, Config::default());
        q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
        assert_eq!(q.try_separate_bit(0), None);
    }
}
