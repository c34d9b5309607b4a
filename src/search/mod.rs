//! Triple-hybrid search layer.
//!
//! Three indices, one fused query surface:
//!
//! - [`HnswIndex`] — hierarchical navigable small-world graph over
//!   embeddings, with Matryoshka multi-precision prefiltering
//! - [`LexicalIndex`] — BM25 inverted index over document text
//! - [`GraphIndex`] — bounded-frontier reachability over link edges
//!
//! [`HybridSearchEngine`] evaluates any weighted combination of the
//! three and ranks candidates by `α·lexical + β·semantic + γ·graph`.

pub mod graph;
pub mod hnsw;
pub mod hybrid;
pub mod lexical;
pub mod types;

pub use graph::GraphIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use hybrid::{HybridQuery, HybridSearchEngine, HybridWeights};
pub use lexical::{LexicalConfig, LexicalIndex, LexicalMatch};
pub use types::{HybridResult, SemanticMatch, Vector};
