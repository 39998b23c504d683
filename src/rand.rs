//! Process/instance RNG access (§5 "Random number generator is a
//! process-wide logical resource; access must be serialized or per-thread").
//!
//! Mirrors the teacher's `src/rand.rs`, which wraps `rand::Rng` for
//! domain-specific sampling; here the wrapped operations are measurement
//! sampling and optional global-phase generation instead of spatial
//! coordinate sampling.

use ::rand::rngs::ThreadRng;
use ::rand::Rng;
use std::f64::consts::PI;

/// A thread-confined RNG source. `ThreadRng` is `!Send`, so each worker
/// thread a `rayon::join` gate traversal fans out onto obtains its own via
/// [`RandSource::thread_local`] rather than sharing one across threads —
/// this is the "per-thread" half of §5's serialization requirement.
pub struct RandSource {
    rng: ThreadRng,
}

impl RandSource {
    pub fn thread_local() -> Self {
        Self {
            rng: ::rand::thread_rng(),
        }
    }

    /// Samples a measurement outcome given the probability of observing `1`.
    pub fn sample_bit(&mut self, one_chance: f64) -> bool {
        self.rng.gen::<f64>() < one_chance
    }

    /// A uniformly random global phase in `[0, 2*pi)`, used by
    /// `SetPermutation` when `Config::use_random_global_phase` is set.
    pub fn random_phase(&mut self) -> f64 {
        self.rng.gen::<f64>() * 2.0 * PI
    }

    pub fn gen_range(&mut self, range: std::ops::Range<f64>) -> f64 {
        self.rng.gen_range(range)
    }
}
