//! Configuration for the Agrama substrate.
//!
//! All knobs are optional: `AgramaConfig::default()` yields a working
//! single-process setup. Configuration is plain data and can be
//! deserialized from an injected JSON value, so an embedding host can
//! supply it without a file-loading layer.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgramaConfig {
    /// Embedding dimension for the semantic index
    pub vector_dimensions: usize,
    /// HNSW max connections per non-zero layer (M); layer 0 uses 2M
    pub max_connections: usize,
    /// HNSW construction-time candidate list size
    pub ef_construction: usize,
    /// Matryoshka truncation ladder, coarsest first; empty disables prefiltering
    pub matryoshka_dims: Vec<usize>,
    /// BM25 term-frequency saturation
    pub bm25_k1: f32,
    /// BM25 length normalization
    pub bm25_b: f32,
    /// Ceiling on simultaneously tracked agent sessions (0 = unlimited)
    pub max_concurrent_agents: usize,
    /// Whether the result cache is enabled
    pub cache_enabled: bool,
    /// Maximum cached entries before oldest-entry eviction
    pub cache_max_size: usize,
    /// Sessions idle longer than this are swept (seconds)
    pub session_idle_seconds: u64,
    /// Per-key history cap (0 = unbounded retention)
    pub history_retention: usize,
    /// Monitor alert thresholds
    pub alert_thresholds: AlertThresholds,
}

impl Default for AgramaConfig {
    fn default() -> Self {
        Self {
            vector_dimensions: 768,
            max_connections: 16,
            ef_construction: 200,
            matryoshka_dims: vec![64, 256, 768],
            bm25_k1: 1.2,
            bm25_b: 0.75,
            max_concurrent_agents: 100,
            cache_enabled: false,
            cache_max_size: 1024,
            session_idle_seconds: 3600,
            history_retention: 0,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

impl AgramaConfig {
    /// Set the embedding dimension.
    pub fn vector_dimensions(mut self, dims: usize) -> Self {
        self.vector_dimensions = dims;
        self
    }

    /// Set HNSW max connections (M).
    pub fn max_connections(mut self, m: usize) -> Self {
        self.max_connections = m;
        self
    }

    /// Set the Matryoshka dimension ladder (coarsest first).
    pub fn matryoshka_dims(mut self, dims: Vec<usize>) -> Self {
        self.matryoshka_dims = dims;
        self
    }

    /// Enable the result cache with the given bound.
    pub fn with_cache(mut self, max_size: usize) -> Self {
        self.cache_enabled = true;
        self.cache_max_size = max_size;
        self
    }

    /// Set the session idle window in seconds.
    pub fn session_idle_seconds(mut self, seconds: u64) -> Self {
        self.session_idle_seconds = seconds;
        self
    }

    /// Cap per-key history at `n` records (0 = unbounded).
    pub fn history_retention(mut self, n: usize) -> Self {
        self.history_retention = n;
        self
    }

    /// Validate cross-field constraints.
    ///
    /// The Matryoshka ladder must be ascending and bounded by the full
    /// dimension; BM25 parameters must be non-negative (`b` in [0, 1]).
    pub fn validate(&self) -> Result<(), String> {
        if self.vector_dimensions == 0 {
            return Err("vector_dimensions must be non-zero".into());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be non-zero".into());
        }
        let mut prev = 0usize;
        for &d in &self.matryoshka_dims {
            if d <= prev {
                return Err("matryoshka_dims must be strictly ascending".into());
            }
            if d > self.vector_dimensions {
                return Err(format!(
                    "matryoshka dim {} exceeds vector_dimensions {}",
                    d, self.vector_dimensions
                ));
            }
            prev = d;
        }
        if self.bm25_k1 < 0.0 {
            return Err("bm25_k1 must be non-negative".into());
        }
        if !(0.0..=1.0).contains(&self.bm25_b) {
            return Err("bm25_b must be in [0, 1]".into());
        }
        Ok(())
    }
}

/// Thresholds for monitor alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Alert when a primitive's p99 latency exceeds this (milliseconds)
    pub p99_ms: f64,
    /// Alert when the sliding-window throughput drops below this (queries/sec)
    pub min_qps: f64,
    /// Alert when tracked memory exceeds this ceiling (megabytes)
    pub max_memory_mb: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            p99_ms: 10.0,
            min_qps: 0.0,
            max_memory_mb: 512,
        }
    }
}
