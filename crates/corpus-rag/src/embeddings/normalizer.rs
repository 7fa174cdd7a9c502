//! Fixed-dimension embedding normalizer
//!
//! The embedding backend may change models between runs. Every vector that
//! enters the index is coerced to the process-wide dimension `D`: longer
//! vectors are truncated, shorter ones zero-padded, and missing or malformed
//! ones replaced by a pseudo-random unit vector seeded from the input text.
//! The result stays dimensionally consistent but loses semantic meaning, so
//! callers log every repair.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// What the normalizer had to do to an input vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    /// Input already had dimension `D`
    None,
    /// Input was longer and got cut
    Truncated { from: usize },
    /// Input was shorter and got zero-padded
    Padded { from: usize },
    /// Input was missing or malformed and got replaced
    Substituted,
}

impl Repair {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Repair::None)
    }
}

/// A vector of exactly `D` elements plus the repair applied to get there
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub vector: Vec<f32>,
    pub repair: Repair,
}

/// Coerces embeddings to a fixed dimension
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingNormalizer {
    dimensions: usize,
}

impl EmbeddingNormalizer {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Normalize `input` to exactly `D` elements.
    ///
    /// `seed_text` feeds the substitute vector so the same text always maps to
    /// the same fallback.
    pub fn normalize(&self, input: Option<Vec<f32>>, seed_text: &str) -> Normalized {
        let mut vector = match input {
            Some(v) if !v.is_empty() && v.iter().all(|x| x.is_finite()) => v,
            _ => {
                return Normalized {
                    vector: self.substitute(seed_text),
                    repair: Repair::Substituted,
                }
            }
        };

        let len = vector.len();
        let repair = if len > self.dimensions {
            vector.truncate(self.dimensions);
            Repair::Truncated { from: len }
        } else if len < self.dimensions {
            vector.resize(self.dimensions, 0.0);
            Repair::Padded { from: len }
        } else {
            Repair::None
        };

        Normalized { vector, repair }
    }

    /// Deterministic pseudo-random unit vector
    pub fn substitute(&self, seed_text: &str) -> Vec<f32> {
        let digest = Sha256::digest(seed_text.as_bytes());
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));

        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| rng.gen_range(-1.0f32..1.0))
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncate_and_pad() {
        let normalizer = EmbeddingNormalizer::new(4);

        let out = normalizer.normalize(Some(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), "x");
        assert_eq!(out.vector, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out.repair, Repair::Truncated { from: 6 });

        let out = normalizer.normalize(Some(vec![1.0, 2.0]), "x");
        assert_eq!(out.vector, vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(out.repair, Repair::Padded { from: 2 });

        let out = normalizer.normalize(Some(vec![1.0; 4]), "x");
        assert_eq!(out.repair, Repair::None);
        assert!(!out.repair.is_degraded());
    }

    #[test]
    fn test_missing_and_malformed_substituted() {
        let normalizer = EmbeddingNormalizer::new(8);

        for input in [None, Some(vec![]), Some(vec![1.0, f32::NAN])] {
            let out = normalizer.normalize(input, "hello");
            assert_eq!(out.vector.len(), 8);
            assert_eq!(out.repair, Repair::Substituted);
        }
    }

    #[test]
    fn test_substitute_is_deterministic() {
        let normalizer = EmbeddingNormalizer::new(16);
        assert_eq!(normalizer.substitute("query"), normalizer.substitute("query"));
        assert_ne!(normalizer.substitute("query"), normalizer.substitute("other"));

        let norm: f32 = normalizer.substitute("query").iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    proptest! {
        #[test]
        fn prop_output_has_dimension(
            dims in 1usize..64,
            input in proptest::option::of(proptest::collection::vec(-10.0f32..10.0, 0..128)),
        ) {
            let normalizer = EmbeddingNormalizer::new(dims);
            prop_assert_eq!(normalizer.normalize(input, "seed").vector.len(), dims);
        }
    }
}
