//! Vector types and similarity math.
//!
//! The [`Vector`] type backs the semantic index. Data lives in a
//! 32-byte-aligned [`AlignedBlock`] behind an `Arc`, so index nodes and
//! results share one allocation, the similarity kernels see aligned
//! storage, and blocks leased from the embedding pool recycle when the
//! last reference drops. Any contiguous prefix is itself a valid
//! lower-precision Matryoshka embedding.

use crate::pool::AlignedBlock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A dense f32 embedding.
///
/// # Matryoshka prefixes
///
/// Models trained with Matryoshka representation learning pack the most
/// informative components first, so cosine similarity over a prefix of
/// the vector approximates full-precision similarity at a fraction of
/// the cost. [`Vector::prefix_similarity`] exploits this without
/// copying: a prefix is just a shorter view of the same data.
///
/// # Example
///
/// ```ignore
/// let v1 = Vector::new(vec![0.1, 0.2, 0.3, 0.4]);
/// let v2 = Vector::new(vec![0.2, 0.3, 0.4, 0.5]);
/// let full = v1.cosine_similarity(&v2);
/// let coarse = v1.prefix_similarity(&v2, 2);
/// ```
#[derive(Debug, Clone)]
pub struct Vector {
    /// The vector data: 32-byte-aligned, shared, pooled when leased
    data: Arc<AlignedBlock>,
    /// Pre-computed magnitude for cosine similarity (cached)
    magnitude: f32,
}

impl Serialize for Vector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Vector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let data = Vec::<f32>::deserialize(deserializer)?;
        Ok(Vector::new(data))
    }
}

impl Vector {
    /// Create a new vector on a standalone aligned block.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty.
    pub fn new(data: Vec<f32>) -> Self {
        assert!(!data.is_empty(), "Vector data cannot be empty");
        Self::from_block(AlignedBlock::unpooled(&data))
    }

    /// Wrap an aligned block, typically one leased from the embedding
    /// pool. The block (and through it the pool lease) is released when
    /// the last clone of the vector drops.
    ///
    /// # Panics
    ///
    /// Panics if the block is empty.
    pub fn from_block(block: AlignedBlock) -> Self {
        assert!(!block.is_empty(), "Vector data cannot be empty");
        let magnitude = block.as_slice().iter().map(|&x| x * x).sum::<f32>().sqrt();
        Self {
            data: Arc::new(block),
            magnitude,
        }
    }

    /// Get the vector data as a slice.
    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice()
    }

    /// Get the number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.data.len()
    }

    /// Get the cached L2 norm.
    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    /// Zero-copy view of the first `dim` components.
    ///
    /// `dim` is clamped to the full dimension.
    pub fn prefix(&self, dim: usize) -> &[f32] {
        let data = self.as_slice();
        &data[..dim.min(data.len())]
    }

    /// Compute cosine similarity with another vector.
    ///
    /// Ranges from -1.0 (opposite) to 1.0 (identical); zero vectors
    /// compare as 0.0. Returns `None` if dimensions don't match.
    pub fn cosine_similarity(&self, other: &Vector) -> Option<f32> {
        if self.dimensions() != other.dimensions() {
            return None;
        }

        let dot: f32 = self
            .as_slice()
            .iter()
            .zip(other.as_slice().iter())
            .map(|(a, b)| a * b)
            .sum();

        if self.magnitude == 0.0 || other.magnitude == 0.0 {
            return Some(0.0);
        }
        Some(dot / (self.magnitude * other.magnitude))
    }

    /// Cosine similarity over the first `dim` components of both vectors.
    ///
    /// This is the Matryoshka coarse pass: a cheap approximation whose
    /// error shrinks as `dim` approaches the full dimension. Prefix
    /// magnitudes are computed on the fly (they depend on `dim`).
    pub fn prefix_similarity(&self, other: &Vector, dim: usize) -> Option<f32> {
        if self.dimensions() != other.dimensions() {
            return None;
        }
        let dim = dim.min(self.dimensions());
        let a = &self.as_slice()[..dim];
        let b = &other.as_slice()[..dim];

        let mut dot = 0.0f32;
        let mut mag_a = 0.0f32;
        let mut mag_b = 0.0f32;
        for (&x, &y) in a.iter().zip(b.iter()) {
            dot += x * y;
            mag_a += x * x;
            mag_b += y * y;
        }
        if mag_a == 0.0 || mag_b == 0.0 {
            return Some(0.0);
        }
        Some(dot / (mag_a.sqrt() * mag_b.sqrt()))
    }

    /// Compute dot product with another vector.
    ///
    /// Returns None if dimensions don't match.
    pub fn dot_product(&self, other: &Vector) -> Option<f32> {
        if self.dimensions() != other.dimensions() {
            return None;
        }
        Some(
            self.as_slice()
                .iter()
                .zip(other.as_slice().iter())
                .map(|(a, b)| a * b)
                .sum(),
        )
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector(dims={})", self.dimensions())
    }
}

/// A semantic-index hit.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticMatch {
    /// The matched document key
    pub doc_key: String,
    /// Cosine similarity (higher = more similar)
    pub score: f32,
}

/// A fused triple-hybrid result.
///
/// Sub-scores are zero where the corresponding sub-query did not apply;
/// `combined_score = α·lexical + β·semantic + γ·graph`.
#[derive(Debug, Clone, Serialize)]
pub struct HybridResult {
    /// The matched document key
    pub doc_key: String,
    /// Cosine similarity from the semantic index
    pub semantic_score: f32,
    /// BM25 score from the lexical index
    pub lexical_score: f32,
    /// Reachability score from the graph index
    pub graph_score: f32,
    /// Weighted fusion of the three sub-scores
    pub combined_score: f32,
    /// Query terms the document matched lexically
    pub matching_terms: Vec<String>,
    /// Hop distance from the nearest starting node, when graph applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_distance: Option<usize>,
}
