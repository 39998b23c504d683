//! `QUnitMulti` (§4.3): layers device-aware shard placement on top of
//! [`crate::qunit::QUnit`] — `GetQInfos`, best-fit `RedistributeQEngines`,
//! and the shard-level `Detach`/`Clone` operations.
//!
//! Grounded on `src/domain/decomposition.rs`'s rank-assignment pass (there:
//! assigning spatial cells to MPI ranks by load) and `src/domain/segment.rs`'s
//! `split_into`, reworked here from range-splitting into best-fit bin
//! packing of shards onto devices by qubit count.

use std::collections::BTreeMap;

use num_complex::Complex64;

use crate::config::Config;
use crate::device;
use crate::error::{QbdtError, Result};
use crate::node::Mtrx2x2;
use crate::qunit::QUnit;
use crate::shard::Shard;

/// `GetQInfos`' per-shard row: which device a shard lives on and how big it
/// is, the input `RedistributeQEngines` repacks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QInfo {
    pub shard_index: usize,
    pub qubit_count: usize,
    pub device_id: usize,
}

#[derive(Clone, Debug)]
pub struct QUnitMulti {
    inner: QUnit,
}

impl QUnitMulti {
    pub fn new(qubit_count: usize, config: Config) -> Self {
        let default_id = device::registry().default_device().id;
        let mut inner = QUnit::new(qubit_count, config);
        for shard in inner.shards_mut() {
            shard.device_id = default_id;
        }
        Self { inner }
    }

    fn from_single_shard(shard: Shard) -> Self {
        let config = shard.engine.config().clone();
        // A detached register keeps its shard's original global qubit
        // numbering, so qubit_count must cover the highest index it uses
        // rather than just its qubit_count().
        let qubit_count = shard.qubits.iter().copied().max().map_or(0, |q| q + 1);
        let inner = QUnit::from_shards(vec![shard], qubit_count, config);
        Self { inner }
    }

    pub fn qubit_count(&self) -> usize {
        self.inner.qubit_count()
    }

    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    /// `GetQInfos` (§4.3): a snapshot of every shard's size and current
    /// device, the input to `RedistributeQEngines`, sorted largest-first.
    pub fn get_q_infos(&self) -> Vec<QInfo> {
        let mut infos: Vec<QInfo> = self
            .inner
            .shards()
            .iter()
            .enumerate()
            .map(|(i, s)| QInfo {
                shard_index: i,
                qubit_count: s.qubit_count(),
                device_id: s.device_id,
            })
            .collect();
        infos.sort_by(|a, b| b.qubit_count.cmp(&a.qubit_count));
        infos
    }

    /// `RedistributeQEngines` (§4.3): walks shards largest-first, tracking
    /// each device's running load (qubits already placed on it *this pass*)
    /// and for each shard picking, in order: its current device if nothing
    /// has been placed there yet this pass; the default device if the
    /// default's running load doesn't exceed the current device's; else the
    /// device with the smallest running load that still has room. If none
    /// has room — `DeviceCapacityExceeded` — it falls back to the default
    /// device, which the registry always seeds as effectively unbounded
    /// (§7 "recovered by falling back to the default device").
    pub fn redistribute_q_engines(&mut self) {
        let infos = self.get_q_infos();
        let devices = device::registry().all();
        let default_id = device::registry().default_device().id;
        let max_qubits: BTreeMap<usize, usize> = devices.iter().map(|d| (d.id, d.max_qubits)).collect();
        let mut load: BTreeMap<usize, usize> = devices.iter().map(|d| (d.id, 0)).collect();

        let mut assignment = Vec::with_capacity(infos.len());
        for info in &infos {
            if info.qubit_count < self.inner.config().concurrency_threshold {
                assignment.push((info.shard_index, info.device_id));
                continue;
            }
            let current_load = *load.get(&info.device_id).unwrap_or(&0);
            let default_load = *load.get(&default_id).unwrap_or(&0);
            let chosen = if current_load == 0 {
                info.device_id
            } else if default_load <= current_load {
                default_id
            } else {
                load.iter()
                    .filter(|&(&d, &l)| l + info.qubit_count <= *max_qubits.get(&d).unwrap_or(&0))
                    .min_by_key(|&(_, &l)| l)
                    .map(|(&d, _)| d)
                    .unwrap_or(default_id)
            };
            *load.entry(chosen).or_insert(0) += info.qubit_count;
            assignment.push((info.shard_index, chosen));
        }

        for (shard_index, device_id) in assignment {
            self.inner.shards_mut()[shard_index].device_id = device_id;
        }
    }

    /// `EntangleInCurrentBasis`: merges the shards touching `qubits`, then
    /// redistributes. If the merged engine wouldn't fit the first touched
    /// shard's current device, that shard is migrated to the default device
    /// before merging (§4.3), rather than discovered only after the fact.
    pub fn entangle_in_current_basis(&mut self, qubits: &[usize]) -> Result<()> {
        if qubits.is_empty() {
            return Ok(());
        }
        let mut touched: Vec<usize> = qubits.iter().map(|&q| self.inner.shard_index_of(q)).collect();
        touched.sort_unstable();
        touched.dedup();
        if touched.len() > 1 {
            let merged_size: usize = touched.iter().map(|&i| self.inner.shards()[i].qubit_count()).sum();
            let first = &mut self.inner.shards_mut()[touched[0]];
            let current_cap = device::registry().get(first.device_id).map(|d| d.max_qubits).unwrap_or(0);
            if merged_size > current_cap {
                first.device_id = device::registry().default_device().id;
            }
        }
        self.inner.entangle_in_current_basis(qubits);
        self.redistribute_q_engines();
        Ok(())
    }

    pub fn mtrx(&mut self, u: &Mtrx2x2, target: usize) -> Result<()> {
        self.inner.mtrx(u, target)
    }

    pub fn mc_mtrx(&mut self, controls: &[usize], u: &Mtrx2x2, target: usize) -> Result<()> {
        let touched: Vec<usize> = controls.iter().copied().chain(std::iter::once(target)).collect();
        self.entangle_in_current_basis(&touched)?;
        self.inner.mc_mtrx(controls, u, target)
    }

    pub fn prob(&self, qubit: usize) -> Result<f64> {
        self.inner.prob(qubit)
    }

    pub fn get_amplitude(&self, perm: u64) -> Complex64 {
        self.inner.get_amplitude(perm)
    }

    /// `GetQuantumState`/`GetProbs` (§4.3): forces full entanglement of
    /// every qubit into one engine before reading out.
    pub fn get_quantum_state(&mut self) -> Vec<Complex64> {
        let all: Vec<usize> = (0..self.qubit_count()).collect();
        let _ = self.entangle_in_current_basis(&all);
        self.inner.get_quantum_state()
    }

    pub fn get_probs(&mut self) -> Vec<f64> {
        self.get_quantum_state().iter().map(|a| a.norm_sqr()).collect()
    }

    pub fn force_m(&mut self, qubit: usize, result: Option<bool>) -> Result<bool> {
        self.inner.force_m(qubit, result)
    }

    pub fn m_all(&mut self) -> u64 {
        self.inner.m_all()
    }

    pub fn try_separate_bit(&self, qubit: usize) -> Option<bool> {
        self.inner.try_separate_bit(qubit)
    }

    /// `Detach` (§4.3): if `qubits` forms (after entangling them together)
    /// an exactly self-contained shard, removes it and returns it as its
    /// own `QUnitMulti`. Fails with `NotSeparable` if entangling pulled in
    /// qubits outside the requested set.
    pub fn detach(&mut self, qubits: &[usize]) -> Result<QUnitMulti> {
        if qubits.is_empty() {
            return Err(QbdtError::InvalidQubitIndex {
                index: 0,
                qubit_count: self.qubit_count(),
            });
        }
        self.entangle_in_current_basis(qubits)?;
        let shard_idx = self.inner.shard_index_of(qubits[0]);
        let shard_qubits: std::collections::BTreeSet<usize> = self.inner.shards()[shard_idx].qubits.iter().copied().collect();
        let requested: std::collections::BTreeSet<usize> = qubits.iter().copied().collect();
        if shard_qubits != requested {
            return Err(QbdtError::NotSeparable {
                start: *qubits.iter().min().unwrap(),
                end: *qubits.iter().max().unwrap() + 1,
            });
        }
        let shard = self.inner.remove_shard(shard_idx);
        let detached = QUnitMulti::from_single_shard(shard);
        self.redistribute_q_engines();
        Ok(detached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::Device;

    #[test]
    fn fresh_register_has_one_shard_per_qubit() {
        let q = QUnitMulti::new(4, Config::default());
        assert_eq!(q.get_q_infos().len(), 4);
    }

    #[test]
    fn entangling_merges_shards_and_redistributes() {
        let mut q = QUnitMulti::new(3, Config::default());
        q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
        q.mc_mtrx(&[0], &Mtrx2x2::pauli_x(), 1).unwrap();
        assert_eq!(q.get_q_infos().len(), 2);
    }

    #[test]
    fn detach_returns_a_standalone_register() {
        let mut q = QUnitMulti::new(2, Config::default());
        q.mtrx(&Mtrx2x2::pauli_x(), 1).unwrap();
        let mut detached = q.detach(&[1]).unwrap();
        assert_eq!(q.get_q_infos().len(), 1);
        assert!((detached.prob(1).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn detach_entangled_qubit_without_its_partner_fails() {
        let mut q = QUnitMulti::new(2, Config::default());
        q.mtrx(&Mtrx2x2::hadamard(), 0).unwrap();
        q.mc_mtrx(&[0], &Mtrx2x2::pauli_x(), 1).unwrap();
        assert!(matches!(q.detach(&[0]), Err(QbdtError::NotSeparable { .. })));
    }

    #[test]
    fn redistribute_places_every_shard_within_its_devices_capacity() {
        device::registry().register(Device { id: 11, max_qubits: 1 });
        device::registry().register(Device { id: 12, max_qubits: 1 });
        let mut q = QUnitMulti::new(2, Config::default());
        q.redistribute_q_engines();
        for info in q.get_q_infos() {
            let cap = device::registry().get(info.device_id).unwrap().max_qubits;
            assert!(info.qubit_count <= cap);
        }
    }

    #[test]
    fn entangling_eleven_qubits_lands_on_one_engine() {
        let mut q = QUnitMulti::new(11, Config::default());
        let all: Vec<usize> = (0..11).collect();
        q.entangle_in_current_basis(&all).unwrap();
        assert_eq!(q.get_q_infos().len(), 1);
        assert_eq!(q.get_q_infos()[0].qubit_count, 11);
    }
}
