//! # Agrama — Temporal Knowledge Graph Substrate
//!
//! Agrama lets cooperating agents store, relate, search, and transform
//! artifacts (code, notes, decisions) with full provenance:
//!
//! - **Five primitives** — store, retrieve, search, link, transform —
//!   validated, session-tracked, arena-scoped, and observed
//! - **Temporal store** — content-addressed key→value storage with an
//!   append-only change history per key and time-travel reads
//! - **Triple-hybrid search** — HNSW semantic index (with Matryoshka
//!   multi-precision embeddings), BM25 lexical index, and frontier graph
//!   reachability, fused under configurable weights
//! - **Memory-pool substrate** — fixed object pools, scoped arenas, and
//!   SIMD-aligned embedding blocks for the hot paths
//! - **MCP surface** — a line-delimited JSON-RPC 2.0 loop exposing the
//!   primitives as tools
//!
//! ## Quick Start
//!
//! ```ignore
//! use agrama::{AgramaConfig, PrimitiveEngine};
//! use serde_json::json;
//!
//! let engine = PrimitiveEngine::new(AgramaConfig::default())?;
//!
//! engine.execute("agent-1", "store", &json!({
//!     "key": "decision:42",
//!     "value": "Use BM25 for lexical scoring",
//! }))?;
//!
//! let result = engine.execute("agent-1", "retrieve", &json!({
//!     "key": "decision:42",
//!     "include_history": true,
//! }))?;
//! ```
//!
//! ## Architecture
//!
//! Leaves first: the pool substrate underpins the temporal store, the
//! store feeds the three indices, the primitive engine orchestrates all
//! of them per call, and the MCP loop is a thin wire adapter on top. The
//! performance monitor observes every layer without being able to fail
//! any of them.
//!
//! ## Thread Safety
//!
//! Engine handles are cheap to clone and share one substrate. Primitive
//! calls are the unit of concurrency: store and indices use sharded or
//! reader-writer locking internally, and each call gets a
//! thread-exclusive scratch arena.

// Internal modules
mod config;
mod error;
mod types;

// Core substrate
pub mod embedding;
pub mod engine;
pub mod monitor;
pub mod pool;
pub mod primitives;
pub mod search;
pub mod session;
pub mod store;
pub mod transform;

// Wire surface
pub mod mcp;

// Public API exports
pub use config::{AgramaConfig, AlertThresholds};
pub use embedding::{Embedder, HashEmbedder};
pub use engine::{ExecContext, PrimitiveEngine};
pub use error::{AgramaError, AgramaResult};
pub use monitor::{Alert, AlertKind, LatencySummary, PerformanceMonitor};
pub use primitives::{PrimitiveCall, PrimitiveKind, SearchType};
pub use search::{
    GraphIndex, HnswConfig, HnswIndex, HybridQuery, HybridResult, HybridSearchEngine,
    HybridWeights, LexicalConfig, LexicalIndex, Vector,
};
pub use session::{AgentSession, SessionTracker};
pub use store::{StoreSnapshot, TemporalStore};
pub use transform::TransformOp;
pub use types::{
    content_hash, link_key, meta_key, ops_key, parse_link_key, ChangeRecord, LinkRecord,
    ProvenanceRecord, VectorClock,
};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};
pub use serde_json::{json, Value as JsonValue};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use agrama::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::AgramaConfig;
    pub use crate::engine::PrimitiveEngine;
    pub use crate::error::{AgramaError, AgramaResult};
    pub use crate::primitives::{PrimitiveKind, SearchType};
    pub use crate::search::{HybridQuery, HybridWeights, Vector};
    pub use crate::store::TemporalStore;
    pub use crate::types::ChangeRecord;
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Value as JsonValue};
}

// ============================================================================
// Logging and Observability
// ============================================================================

/// Initialize the logging system.
///
/// Call once at startup. Configures the tracing subscriber with an
/// environment filter; the MCP loop owns stdout, so log output goes to
/// stderr.
///
/// The log level is controlled via the `AGRAMA_LOG` environment variable:
/// - `AGRAMA_LOG=error` - Only errors
/// - `AGRAMA_LOG=warn` - Errors and warnings
/// - `AGRAMA_LOG=info` - General information (default)
/// - `AGRAMA_LOG=debug` - Debug information
/// - `AGRAMA_LOG=trace` - Verbose tracing
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("AGRAMA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Initialize logging with a specific level.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
