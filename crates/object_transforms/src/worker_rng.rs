//! Thread-local randomness for transforms.
//!
//! Every stochastic transform draws from the worker RNG so that a loader
//! running transforms on several threads can reproduce a run by seeding each
//! worker. Threads that were never seeded fall back to `rand::rng()`.

use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::rngs::StdRng;
use rand::Rng as _;
use rand::SeedableRng;
use std::cell::RefCell;

thread_local! {
    /// Thread-local worker ID, used in log messages.
    pub static WORKER_ID: RefCell<usize> = const { RefCell::new(0) };

    /// Thread-local RNG for deterministic randomness in workers
    pub static WORKER_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Initialize worker's RNG based on worker_id, epoch, and base seed.
/// Seed formula: base_seed + (epoch << 32) + worker_id
/// This ensures each worker has unique but deterministic randomness.
pub fn init_worker_rng(worker_id: usize, epoch: usize, base_seed: u64) {
    WORKER_ID.with(|id| *id.borrow_mut() = worker_id);
    WORKER_RNG.with(|rng| {
        let seed = base_seed
            .wrapping_add((epoch as u64) << 32)
            .wrapping_add(worker_id as u64);
        *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed));
    })
}

/// ID passed to the last `init_worker_rng` on this thread (0 if never seeded).
pub fn worker_id() -> usize {
    WORKER_ID.with(|id| *id.borrow())
}

/// Drops the seeded RNG so later draws come from the thread RNG again.
pub fn reset_worker_rng() {
    WORKER_RNG.with(|rng| *rng.borrow_mut() = None);
}

/// Get a random bool from worker RNG, or thread_rng if not in worker context.
pub fn worker_gen_bool(p: f64) -> bool {
    WORKER_RNG.with(|rng| {
        let mut rng_ref = rng.borrow_mut();
        match rng_ref.as_mut() {
            Some(rng) => rng.random_bool(p),
            None => rand::rng().random_bool(p),
        }
    })
}

/// Uniform draw from `range` using the worker RNG.
/// Used for angles, scales, point perturbation and zoom sampling.
pub fn worker_gen_range<T, R>(range: R) -> T
where
    T: SampleUniform,
    R: SampleRange<T>,
{
    WORKER_RNG.with(|rng| {
        let mut rng_ref = rng.borrow_mut();
        match rng_ref.as_mut() {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    })
}

/// Uniform index in `0..len`. `len` must be non-zero.
pub fn worker_choose_index(len: usize) -> usize {
    worker_gen_range(0..len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_draws() {
        init_worker_rng(3, 0, 42);
        assert_eq!(worker_id(), 3);

        init_worker_rng(1, 0, 42);
        let first: Vec<i64> = (0..8).map(|_| worker_gen_range(-5..=5)).collect();

        init_worker_rng(1, 0, 42);
        let second: Vec<i64> = (0..8).map(|_| worker_gen_range(-5..=5)).collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|v| (-5..=5).contains(v)));
        reset_worker_rng();
    }

    #[test]
    fn test_epoch_changes_stream() {
        init_worker_rng(0, 0, 7);
        let epoch0: Vec<f64> = (0..4).map(|_| worker_gen_range(0.0..1.0)).collect();

        init_worker_rng(0, 1, 7);
        let epoch1: Vec<f64> = (0..4).map(|_| worker_gen_range(0.0..1.0)).collect();

        assert_ne!(epoch0, epoch1);
        reset_worker_rng();
    }

    #[test]
    fn test_unseeded_fallback() {
        reset_worker_rng();
        assert!(worker_gen_bool(1.0));
        assert!(!worker_gen_bool(0.0));
        assert!(worker_choose_index(3) < 3);
    }
}
