/// Error types for Agrama operations.
///
/// This module provides a single error hierarchy covering every failure
/// mode in the substrate. All errors are well-typed and can be
/// pattern-matched for precise handling; the wire layer maps each variant
/// onto its JSON-RPC error code via [`AgramaError::jsonrpc_code`].
use thiserror::Error;

/// The main error type for Agrama operations.
///
/// All fallible operations return `Result<T, AgramaError>`. Validation
/// variants are raised before any store mutation; execution variants
/// unwind the call's arena and are recorded by the performance monitor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgramaError {
    /// A required parameter was absent from the call.
    #[error("Missing required field '{field}'")]
    MissingField {
        /// The parameter that was not supplied
        field: String,
    },

    /// A parameter that must be non-empty was empty (keys, queries, relations).
    #[error("Field '{field}' must not be empty")]
    EmptyString {
        /// The parameter that was empty
        field: String,
    },

    /// A parameter had the wrong JSON type.
    #[error("Field '{field}' has invalid type (expected {expected})")]
    InvalidType {
        /// The parameter with the wrong type
        field: String,
        /// The type the parameter must have
        expected: String,
    },

    /// The search primitive received an unrecognized search type.
    #[error("Invalid search type '{search_type}' (expected semantic, lexical, graph, temporal, or hybrid)")]
    InvalidSearchType {
        /// The rejected type string
        search_type: String,
    },

    /// The transform primitive received an operation outside the whitelist.
    #[error("Unsupported transform operation '{operation}'")]
    UnsupportedOperation {
        /// The rejected operation name
        operation: String,
    },

    /// Hybrid search weights were negative or summed to zero.
    #[error("Invalid hybrid weights: {reason}")]
    InvalidWeights {
        /// Why the weight combination was rejected
        reason: String,
    },

    /// Key not found in the store.
    ///
    /// Retrieve maps this onto `exists: false` rather than surfacing it;
    /// history and time-travel queries surface it directly.
    #[error("Key '{key}' not found")]
    KeyNotFound {
        /// The key that was not found
        key: String,
    },

    /// No change record exists at or before the requested timestamp.
    #[error("No value for key '{key}' at timestamp {timestamp}")]
    NoValueAtTimestamp {
        /// The key that was queried
        key: String,
        /// The timestamp that was queried (epoch millis)
        timestamp: i64,
    },

    /// The configured agent-session ceiling was reached.
    #[error("Too many concurrent agents (limit {limit})")]
    TooManyConnections {
        /// The configured ceiling
        limit: usize,
    },

    /// A pool reached its hard capacity cap.
    #[error("Pool '{pool}' exhausted (cap {cap})")]
    PoolExhausted {
        /// The pool that ran out
        pool: String,
        /// The hard cap that was hit
        cap: usize,
    },

    /// A vector's dimension did not match the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The index's configured dimension
        expected: usize,
        /// The dimension that was supplied
        actual: usize,
    },

    /// A stored record failed to decode into its expected shape.
    #[error("Corrupt record at '{key}': {reason}")]
    CorruptRecord {
        /// The key holding the record
        key: String,
        /// What failed to decode
        reason: String,
    },

    /// The transport received bytes that are not valid JSON.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The transport received JSON that is not a valid JSON-RPC 2.0 request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AgramaError {
    /// JSON-RPC 2.0 error code for this variant.
    ///
    /// Validation failures map to `-32602`, transport failures to
    /// `-32700`/`-32600`, and everything that fails during execution to
    /// the server-error code `-32000`.
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            AgramaError::MissingField { .. }
            | AgramaError::EmptyString { .. }
            | AgramaError::InvalidType { .. }
            | AgramaError::InvalidSearchType { .. }
            | AgramaError::UnsupportedOperation { .. }
            | AgramaError::InvalidWeights { .. } => -32602,
            AgramaError::ParseError(_) => -32700,
            AgramaError::InvalidRequest(_) => -32600,
            AgramaError::KeyNotFound { .. }
            | AgramaError::NoValueAtTimestamp { .. }
            | AgramaError::TooManyConnections { .. }
            | AgramaError::PoolExhausted { .. }
            | AgramaError::DimensionMismatch { .. }
            | AgramaError::CorruptRecord { .. } => -32000,
        }
    }

    /// Short kind name used in wire error payloads and monitor records.
    pub fn kind(&self) -> &'static str {
        match self {
            AgramaError::MissingField { .. } => "MissingField",
            AgramaError::EmptyString { .. } => "EmptyString",
            AgramaError::InvalidType { .. } => "InvalidType",
            AgramaError::InvalidSearchType { .. } => "InvalidSearchType",
            AgramaError::UnsupportedOperation { .. } => "UnsupportedOperation",
            AgramaError::InvalidWeights { .. } => "InvalidWeights",
            AgramaError::KeyNotFound { .. } => "KeyNotFound",
            AgramaError::NoValueAtTimestamp { .. } => "NoValueAtTimestamp",
            AgramaError::TooManyConnections { .. } => "TooManyConnections",
            AgramaError::PoolExhausted { .. } => "PoolExhausted",
            AgramaError::DimensionMismatch { .. } => "DimensionMismatch",
            AgramaError::CorruptRecord { .. } => "CorruptRecord",
            AgramaError::ParseError(_) => "ParseError",
            AgramaError::InvalidRequest(_) => "InvalidRequest",
        }
    }

    /// Whether this variant is a validation failure (rejected before the
    /// primitive body ran, so no state was touched).
    pub fn is_validation(&self) -> bool {
        self.jsonrpc_code() == -32602
    }
}

/// Result type alias for Agrama operations.
pub type AgramaResult<T> = Result<T, AgramaError>;
