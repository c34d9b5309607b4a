//! Embedding producer seam.
//!
//! The substrate does not ship a model; the embedding producer is an
//! injected collaborator behind the [`Embedder`] trait. The bundled
//! [`HashEmbedder`] is a deterministic feature-hashing fallback: good
//! enough for tests, demos, and lexically-close retrieval, and entirely
//! dependency-free. A real deployment injects a model-backed
//! implementation.

use crate::search::types::Vector;

/// Produces a fixed-dimension embedding for a piece of text.
///
/// Implementations must be pure: the same text always maps to the same
/// vector, and the dimension never changes for a given instance.
pub trait Embedder: Send + Sync {
    /// The dimension of produced vectors.
    fn dim(&self) -> usize;

    /// Write the embedding of `text` into `out`.
    ///
    /// `out.len()` equals [`dim`](Self::dim); the engine hands in blocks
    /// leased from the aligned embedding pool, so implementations should
    /// fill in place rather than allocate.
    fn embed_into(&self, text: &str, out: &mut [f32]);

    /// Embed one text into a fresh standalone vector.
    fn embed(&self, text: &str) -> Vector {
        let mut data = vec![0.0f32; self.dim()];
        self.embed_into(text, &mut data);
        Vector::new(data)
    }
}

/// Deterministic feature-hashing embedder.
///
/// Tokens are hashed (FNV-1a) into `dim` buckets with a sign derived
/// from a second hash, then the vector is L2-normalized. Texts sharing
/// vocabulary land near each other, which is what the test suite and
/// local demos need.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    /// Create an embedder producing `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "embedding dimension must be non-zero");
        Self { dim }
    }

    fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
        let mut hash = 0xcbf29ce484222325u64 ^ seed;
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_into(&self, text: &str, out: &mut [f32]) {
        out.fill(0.0);
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lower = token.to_lowercase();
            let bucket = (Self::fnv1a(lower.as_bytes(), 0) as usize) % self.dim;
            let sign = if Self::fnv1a(lower.as_bytes(), 0x9e3779b9) & 1 == 0 {
                1.0
            } else {
                -1.0
            };
            out[bucket] += sign;
        }

        let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in out.iter_mut() {
                *x /= norm;
            }
        } else {
            // Empty text still needs a valid vector
            out[0] = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("temporal knowledge graph");
        let b = embedder.embed("temporal knowledge graph");
        assert_eq!(a, b);
    }

    #[test]
    fn test_embedding_is_normalized() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("some text with several tokens");
        assert!((v.magnitude() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("rust memory allocator performance");
        let b = embedder.embed("rust allocator performance tuning");
        let c = embedder.embed("gardening tips for spring tulips");

        let close = a.cosine_similarity(&b).unwrap();
        let far = a.cosine_similarity(&c).unwrap();
        assert!(close > far);
    }

    #[test]
    fn test_embed_into_matches_embed() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed("pooled path parity");
        let mut out = vec![0.5f32; 32];
        embedder.embed_into("pooled path parity", &mut out);
        assert_eq!(v.as_slice(), out.as_slice());
    }

    #[test]
    fn test_empty_text_is_valid() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("");
        assert_eq!(v.dimensions(), 16);
        assert!(v.magnitude() > 0.0);
    }
}
