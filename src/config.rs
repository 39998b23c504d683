//! Construction-time configuration (§6 "Configuration recognized at
//! construction"), following the teacher's parameter-struct convention
//! (`QuadTreeConfig` in `src/domain/quadtree.rs`): a plain, `Deserialize`-able
//! struct with a `Default` impl supplying the values implied by the rest of
//! the spec.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// Initial basis state used by `SetPermutation` at construction.
    pub init_state: u64,
    /// Apply a uniformly random global phase on `SetPermutation` (§4.2).
    pub use_random_global_phase: bool,
    /// Auto-renormalize on detected `NumericalDrift` rather than surfacing
    /// the error (§7).
    pub normalization_on: bool,
    /// Prefer a hardware RNG source over the software PRNG when sampling
    /// measurement outcomes.
    pub use_hardware_rng: bool,
    /// Device id new engines are created on by default.
    pub device_id: usize,
    /// Amplitudes with magnitude below this are treated as zero for pruning
    /// purposes (§4.2 "Failure / edge policy").
    pub amplitude_floor: f64,
    /// Tolerance `EPS` used for structural equivalence during `Prune` and
    /// for `RemoveSeparableAtDepth`'s separability check.
    pub separability_threshold: f64,
    /// Below this qubit count, an engine is left on its current device by
    /// `RedistributeQEngines` regardless of load ("hybrid threshold", §4.3).
    pub concurrency_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            init_state: 0,
            use_random_global_phase: false,
            normalization_on: true,
            use_hardware_rng: false,
            device_id: 0,
            amplitude_floor: 1e-16,
            separability_threshold: 1e-9,
            concurrency_threshold: 1,
        }
    }
}

impl Config {
    /// Default phase normalization tolerance used when checking
    /// `sum(ProbAll) == 1 ± eps` (§8 invariant 1).
    pub const NORM_TOLERANCE: f64 = 1e-6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_sane() {
        let config = Config::default();
        assert_eq!(config.init_state, 0);
        assert!(config.normalization_on);
        assert!(config.amplitude_floor < config.separability_threshold);
    }
}
