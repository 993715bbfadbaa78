//! Deterministic seeding for every pseudo-random source in a run.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;

/// Fans a root seed out into stable per-component seeds.
///
/// Constructed exactly once per run, before dataset, model, or optimizer
/// construction, so every collaborator draws its randomness from a seed
/// derived here. The same component name always maps to the same seed for a
/// given root, and distinct names land on distinct streams.
#[derive(Debug, Clone)]
pub struct SeedManager {
    root_seed: u64,
    component_seeds: BTreeMap<String, u64>,
}

impl SeedManager {
    pub fn new(root_seed: u64) -> Self {
        Self {
            root_seed,
            component_seeds: BTreeMap::new(),
        }
    }

    pub fn root_seed(&self) -> u64 {
        self.root_seed
    }

    /// Stable seed for a named component.
    pub fn component_seed(&mut self, component: &str) -> u64 {
        let root = self.root_seed;
        *self
            .component_seeds
            .entry(component.to_string())
            .or_insert_with(|| root ^ fnv1a(component))
    }

    /// Seeded RNG for a named component.
    pub fn component_rng(&mut self, component: &str) -> StdRng {
        StdRng::seed_from_u64(self.component_seed(component))
    }
}

/// FNV-1a over the component name; keeps same-length names apart.
fn fnv1a(s: &str) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for b in s.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}
