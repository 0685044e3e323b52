use rand::SeedableRng;
use rand_pcg::Pcg64;

/// Generator used by the viewer and the tests. The core itself accepts any
/// `rand::Rng`.
pub type TreeRng = Pcg64;

/// Create a deterministic RNG from a seed.
pub fn create_rng(seed: u64) -> TreeRng {
    Pcg64::seed_from_u64(seed)
}
