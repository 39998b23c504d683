//! Error kinds surfaced by the register and shard-orchestration layers (§7).
//!
//! Structural errors (`NotSeparable`, `InvalidQubitIndex`) are always
//! returned to the caller. `DeviceCapacityExceeded` is always recovered
//! locally (`QUnitMulti` falls back to the default device) and never
//! actually constructed. `NumericalDrift` is recovered locally when
//! [`crate::config::Config::normalization_on`] allows it, and surfaced
//! otherwise. Nothing here is retried.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QbdtError {
    /// `Decompose`/`RemoveSeparableAtDepth` requested a range of qubits that
    /// is not separable within the configured tolerance. State is left
    /// unchanged.
    #[error("qubit range [{start}, {end}) is not separable within tolerance")]
    NotSeparable { start: usize, end: usize },

    /// Entangling the requested qubits would produce an engine larger than
    /// any known device's `maxSize`. Named for completeness of the error
    /// surface (§7); `QUnitMulti::redistribute_q_engines` recovers from this
    /// by falling back to the default device rather than ever returning it —
    /// the default device is always registered with an effectively
    /// unbounded capacity, so the fallback always succeeds in practice.
    #[error("entangled engine of {required_qubits} qubits exceeds every device's capacity")]
    DeviceCapacityExceeded { required_qubits: usize },

    /// A qubit index was out of range for the register it was applied to.
    #[error("qubit index {index} is out of range for a register of {qubit_count} qubits")]
    InvalidQubitIndex { index: usize, qubit_count: usize },

    /// Post-gate norm deviated from 1 by more than the configured
    /// tolerance, and normalization-on-drift was not configured.
    #[error("state norm drifted to {norm}, exceeding tolerance {tolerance}")]
    NumericalDrift { norm: f64, tolerance: f64 },
}

pub type Result<T> = std::result::Result<T, QbdtError>;
