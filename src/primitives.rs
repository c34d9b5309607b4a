//! The five core primitives and their wire-facing metadata.
//!
//! Primitives are a closed, tagged set: the engine resolves a wire name
//! into [`PrimitiveKind`] once and dispatches by exhaustive match, so a
//! new primitive cannot be added without the compiler pointing at every
//! site that must handle it.
//!
//! Each primitive's parameters are a typed struct parsed (and validated)
//! from the wire JSON before execution: a call that fails validation
//! never reaches the store.

use crate::error::{AgramaError, AgramaResult};
use serde_json::{json, Value as JsonValue};
use std::sync::OnceLock;

/// The closed set of primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Persist a value with provenance
    Store,
    /// Fetch a value, optionally with history
    Retrieve,
    /// Query one of the five search modes
    Search,
    /// Create a directed, labeled edge
    Link,
    /// Run a whitelisted pure transform
    Transform,
}

impl PrimitiveKind {
    /// All primitives, in registry order.
    pub const ALL: [PrimitiveKind; 5] = [
        PrimitiveKind::Store,
        PrimitiveKind::Retrieve,
        PrimitiveKind::Search,
        PrimitiveKind::Link,
        PrimitiveKind::Transform,
    ];

    /// Resolve a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "store" => Some(PrimitiveKind::Store),
            "retrieve" => Some(PrimitiveKind::Retrieve),
            "search" => Some(PrimitiveKind::Search),
            "link" => Some(PrimitiveKind::Link),
            "transform" => Some(PrimitiveKind::Transform),
            _ => None,
        }
    }

    /// The primitive's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Store => "store",
            PrimitiveKind::Retrieve => "retrieve",
            PrimitiveKind::Search => "search",
            PrimitiveKind::Link => "link",
            PrimitiveKind::Transform => "transform",
        }
    }

    /// Whether results of this primitive may enter the result cache.
    ///
    /// Store and link mutate state; caching them would replay stale
    /// side effects, so the cacheable set is fixed here rather than left
    /// to configuration.
    pub fn cacheable(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Retrieve | PrimitiveKind::Search | PrimitiveKind::Transform
        )
    }
}

/// Search modes accepted by the search primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    /// HNSW cosine search over embeddings
    Semantic,
    /// BM25 keyword search
    Lexical,
    /// Bounded-frontier reachability from starting nodes
    Graph,
    /// Time-range scan over change records
    Temporal,
    /// Weighted fusion of lexical, semantic, and graph
    Hybrid,
}

impl SearchType {
    /// Resolve a wire name.
    ///
    /// # Errors
    ///
    /// `InvalidSearchType` for anything outside the recognized set.
    pub fn from_name(name: &str) -> AgramaResult<Self> {
        match name {
            "semantic" => Ok(SearchType::Semantic),
            "lexical" => Ok(SearchType::Lexical),
            "graph" => Ok(SearchType::Graph),
            "temporal" => Ok(SearchType::Temporal),
            "hybrid" => Ok(SearchType::Hybrid),
            other => Err(AgramaError::InvalidSearchType {
                search_type: other.to_string(),
            }),
        }
    }

    /// The mode's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            SearchType::Semantic => "semantic",
            SearchType::Lexical => "lexical",
            SearchType::Graph => "graph",
            SearchType::Temporal => "temporal",
            SearchType::Hybrid => "hybrid",
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter parsing helpers
// ---------------------------------------------------------------------------

fn require_string(params: &JsonValue, field: &str) -> AgramaResult<String> {
    match params.get(field) {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(_) => Err(AgramaError::InvalidType {
            field: field.to_string(),
            expected: "string".to_string(),
        }),
        None => Err(AgramaError::MissingField {
            field: field.to_string(),
        }),
    }
}

fn require_nonempty(params: &JsonValue, field: &str) -> AgramaResult<String> {
    let value = require_string(params, field)?;
    if value.is_empty() {
        return Err(AgramaError::EmptyString {
            field: field.to_string(),
        });
    }
    Ok(value)
}

fn optional_object(params: &JsonValue, field: &str) -> AgramaResult<Option<JsonValue>> {
    match params.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value @ JsonValue::Object(_)) => Ok(Some(value.clone())),
        Some(_) => Err(AgramaError::InvalidType {
            field: field.to_string(),
            expected: "object".to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Typed parameters
// ---------------------------------------------------------------------------

/// Parameters for the store primitive.
#[derive(Debug, Clone)]
pub struct StoreParams {
    /// Destination key
    pub key: String,
    /// Content to persist
    pub value: String,
    /// User metadata merged into the provenance sidecar
    pub metadata: Option<JsonValue>,
}

impl StoreParams {
    /// Parse and validate wire parameters.
    pub fn parse(params: &JsonValue) -> AgramaResult<Self> {
        let key = require_nonempty(params, "key")?;
        if crate::types::is_reserved(&key) {
            return Err(AgramaError::InvalidType {
                field: "key".to_string(),
                expected: "non-reserved key (no _meta:/_link:/_ops: prefix)".to_string(),
            });
        }
        Ok(Self {
            key,
            value: require_string(params, "value")?,
            metadata: optional_object(params, "metadata")?,
        })
    }
}

/// Parameters for the retrieve primitive.
#[derive(Debug, Clone)]
pub struct RetrieveParams {
    /// Key to fetch
    pub key: String,
    /// Whether to include the change history
    pub include_history: bool,
    /// Maximum history records when requested
    pub history_limit: usize,
}

impl RetrieveParams {
    /// Parse and validate wire parameters.
    pub fn parse(params: &JsonValue) -> AgramaResult<Self> {
        let include_history = match params.get("include_history") {
            None | Some(JsonValue::Null) => false,
            Some(JsonValue::Bool(b)) => *b,
            Some(_) => {
                return Err(AgramaError::InvalidType {
                    field: "include_history".to_string(),
                    expected: "boolean".to_string(),
                })
            }
        };
        let history_limit = match params.get("history_limit") {
            None | Some(JsonValue::Null) => 10,
            Some(JsonValue::Number(n)) => n.as_u64().unwrap_or(10) as usize,
            Some(_) => {
                return Err(AgramaError::InvalidType {
                    field: "history_limit".to_string(),
                    expected: "number".to_string(),
                })
            }
        };
        Ok(Self {
            key: require_nonempty(params, "key")?,
            include_history,
            history_limit,
        })
    }
}

/// Parameters for the search primitive.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Query text (or key prefix for temporal scans)
    pub query: String,
    /// Which index to dispatch to
    pub search_type: SearchType,
    /// Mode-specific options (weights, embedding, starting nodes, range)
    pub options: JsonValue,
}

impl SearchParams {
    /// Parse and validate wire parameters.
    pub fn parse(params: &JsonValue) -> AgramaResult<Self> {
        let search_type = SearchType::from_name(&require_string(params, "type")?)?;
        let options = match params.get("options") {
            None | Some(JsonValue::Null) => json!({}),
            Some(value @ JsonValue::Object(_)) => value.clone(),
            Some(_) => {
                return Err(AgramaError::InvalidType {
                    field: "options".to_string(),
                    expected: "object".to_string(),
                })
            }
        };
        Ok(Self {
            query: require_string(params, "query")?,
            search_type,
            options,
        })
    }
}

/// Parameters for the link primitive.
#[derive(Debug, Clone)]
pub struct LinkParams {
    /// Edge source
    pub from: String,
    /// Edge target
    pub to: String,
    /// Edge label
    pub relation: String,
    /// User metadata merged into the link record
    pub metadata: Option<JsonValue>,
}

impl LinkParams {
    /// Parse and validate wire parameters.
    ///
    /// `from` and `relation` must not contain `:` — the link key encodes
    /// its segments with that separator.
    pub fn parse(params: &JsonValue) -> AgramaResult<Self> {
        let from = require_nonempty(params, "from")?;
        let to = require_nonempty(params, "to")?;
        let relation = require_nonempty(params, "relation")?;
        for (field, value) in [("from", &from), ("relation", &relation)] {
            if value.contains(':') {
                return Err(AgramaError::InvalidType {
                    field: field.to_string(),
                    expected: "string without ':'".to_string(),
                });
            }
        }
        Ok(Self {
            from,
            to,
            relation,
            metadata: optional_object(params, "metadata")?,
        })
    }
}

/// Parameters for the transform primitive.
#[derive(Debug, Clone)]
pub struct TransformParams {
    /// Whitelisted operation name
    pub operation: String,
    /// Input text
    pub data: String,
    /// Operation-specific options
    pub options: JsonValue,
}

impl TransformParams {
    /// Parse and validate wire parameters.
    ///
    /// The operation name is resolved against the whitelist here, so an
    /// unknown operation is rejected before execution.
    pub fn parse(params: &JsonValue) -> AgramaResult<Self> {
        let operation = require_nonempty(params, "operation")?;
        crate::transform::TransformOp::from_name(&operation)?;
        let options = match params.get("options") {
            None | Some(JsonValue::Null) => JsonValue::Null,
            Some(value @ JsonValue::Object(_)) => value.clone(),
            // The wire historically passed "" for no options
            Some(JsonValue::String(s)) if s.is_empty() => JsonValue::Null,
            Some(_) => {
                return Err(AgramaError::InvalidType {
                    field: "options".to_string(),
                    expected: "object".to_string(),
                })
            }
        };
        Ok(Self {
            operation,
            data: require_string(params, "data")?,
            options,
        })
    }
}

/// A fully parsed, validated primitive call.
#[derive(Debug, Clone)]
pub enum PrimitiveCall {
    /// A validated store call
    Store(StoreParams),
    /// A validated retrieve call
    Retrieve(RetrieveParams),
    /// A validated search call
    Search(SearchParams),
    /// A validated link call
    Link(LinkParams),
    /// A validated transform call
    Transform(TransformParams),
}

impl PrimitiveCall {
    /// Parse wire parameters for the given primitive.
    pub fn parse(kind: PrimitiveKind, params: &JsonValue) -> AgramaResult<Self> {
        match kind {
            PrimitiveKind::Store => Ok(PrimitiveCall::Store(StoreParams::parse(params)?)),
            PrimitiveKind::Retrieve => Ok(PrimitiveCall::Retrieve(RetrieveParams::parse(params)?)),
            PrimitiveKind::Search => Ok(PrimitiveCall::Search(SearchParams::parse(params)?)),
            PrimitiveKind::Link => Ok(PrimitiveCall::Link(LinkParams::parse(params)?)),
            PrimitiveKind::Transform => {
                Ok(PrimitiveCall::Transform(TransformParams::parse(params)?))
            }
        }
    }

    /// The call's primitive kind.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveCall::Store(_) => PrimitiveKind::Store,
            PrimitiveCall::Retrieve(_) => PrimitiveKind::Retrieve,
            PrimitiveCall::Search(_) => PrimitiveKind::Search,
            PrimitiveCall::Link(_) => PrimitiveKind::Link,
            PrimitiveCall::Transform(_) => PrimitiveKind::Transform,
        }
    }
}

// ---------------------------------------------------------------------------
// Tool registry (wire metadata)
// ---------------------------------------------------------------------------

/// Wire-facing description of one primitive as an MCP tool.
#[derive(Debug)]
pub struct ToolSpec {
    /// Tool name (the primitive's wire name)
    pub name: &'static str,
    /// Human-readable title
    pub title: &'static str,
    /// One-paragraph description
    pub description: &'static str,
    /// JSON Schema for the tool's arguments
    pub input_schema: JsonValue,
    /// JSON Schema for the tool's result payload
    pub output_schema: JsonValue,
    /// Advisory latency target
    pub performance: &'static str,
    /// Example compositions with other primitives
    pub composition_examples: Vec<JsonValue>,
}

/// The tool registry: static immutable data, built once and shared by
/// reference. `tools/list` serializes these specs directly.
pub fn tool_registry() -> &'static [ToolSpec] {
    static REGISTRY: OnceLock<Vec<ToolSpec>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry).as_slice()
}

fn build_registry() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "store",
            title: "Store content",
            description: "Persist a value under a key with full provenance. Values over 50 characters are also indexed for search.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "minLength": 1},
                    "value": {"type": "string"},
                    "metadata": {"type": "object"}
                },
                "required": ["key", "value"]
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "key": {"type": "string"},
                    "timestamp": {"type": "string"},
                    "indexed": {"type": "boolean"},
                    "execution_time_ms": {"type": "number"}
                }
            }),
            performance: "p50 < 1ms",
            composition_examples: vec![json!({
                "description": "Store a decision, then link it to the code it affects",
                "calls": [
                    {"tool": "store", "arguments": {"key": "decision:42", "value": "Use BM25 for lexical scoring"}},
                    {"tool": "link", "arguments": {"from": "decision:42", "to": "src/search.rs", "relation": "affects"}}
                ]
            })],
        },
        ToolSpec {
            name: "retrieve",
            title: "Retrieve content",
            description: "Fetch the current value of a key, optionally with its change history. A missing key is not an error.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "minLength": 1},
                    "include_history": {"type": "boolean"},
                    "history_limit": {"type": "integer", "minimum": 1}
                },
                "required": ["key"]
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "exists": {"type": "boolean"},
                    "key": {"type": "string"},
                    "value": {"type": "string"},
                    "metadata": {"type": "object"},
                    "history": {"type": "array"},
                    "execution_time_ms": {"type": "number"}
                }
            }),
            performance: "p50 < 1ms",
            composition_examples: vec![json!({
                "description": "Check what an agent knew before a change",
                "calls": [
                    {"tool": "retrieve", "arguments": {"key": "decision:42", "include_history": true}}
                ]
            })],
        },
        ToolSpec {
            name: "search",
            title: "Search the graph",
            description: "Query stored artifacts. Modes: semantic (embeddings), lexical (BM25), graph (reachability), temporal (time range), hybrid (weighted fusion).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "type": {"type": "string", "enum": ["semantic", "lexical", "graph", "temporal", "hybrid"]},
                    "options": {
                        "type": "object",
                        "properties": {
                            "max_results": {"type": "integer", "minimum": 1},
                            "alpha": {"type": "number", "minimum": 0},
                            "beta": {"type": "number", "minimum": 0},
                            "gamma": {"type": "number", "minimum": 0},
                            "embedding": {"type": "array", "items": {"type": "number"}},
                            "starting_nodes": {"type": "array", "items": {"type": "string"}},
                            "max_hops": {"type": "integer", "minimum": 1},
                            "start": {"type": "string"},
                            "end": {"type": "string"}
                        }
                    }
                },
                "required": ["query", "type"]
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "type": {"type": "string"},
                    "results": {"type": "array"},
                    "count": {"type": "integer"},
                    "execution_time_ms": {"type": "number"}
                }
            }),
            performance: "p50 < 5ms",
            composition_examples: vec![json!({
                "description": "Hybrid search seeded from a known artifact",
                "calls": [
                    {"tool": "search", "arguments": {"query": "allocator regression", "type": "hybrid", "options": {"alpha": 0.3, "beta": 0.4, "gamma": 0.3, "starting_nodes": ["src/pool.rs"]}}}
                ]
            })],
        },
        ToolSpec {
            name: "link",
            title: "Link artifacts",
            description: "Create a directed, labeled edge between two keys. Links are monotonic: repeating an identical link refreshes its metadata.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from": {"type": "string", "minLength": 1},
                    "to": {"type": "string", "minLength": 1},
                    "relation": {"type": "string", "minLength": 1},
                    "metadata": {"type": "object"}
                },
                "required": ["from", "to", "relation"]
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "from": {"type": "string"},
                    "to": {"type": "string"},
                    "relation": {"type": "string"},
                    "timestamp": {"type": "string"},
                    "execution_time_ms": {"type": "number"}
                }
            }),
            performance: "p50 < 1ms",
            composition_examples: vec![json!({
                "description": "Build a dependency chain, then search along it",
                "calls": [
                    {"tool": "link", "arguments": {"from": "A", "to": "B", "relation": "uses"}},
                    {"tool": "search", "arguments": {"query": "", "type": "graph", "options": {"starting_nodes": ["A"]}}}
                ]
            })],
        },
        ToolSpec {
            name: "transform",
            title: "Transform content",
            description: "Run a pure, whitelisted transform over input text: parse_functions, extract_imports, generate_summary, compress_text, diff_content, merge_content, analyze_complexity, extract_dependencies, validate_syntax.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "operation": {"type": "string", "enum": [
                        "parse_functions", "extract_imports", "generate_summary",
                        "compress_text", "diff_content", "merge_content",
                        "analyze_complexity", "extract_dependencies", "validate_syntax"
                    ]},
                    "data": {"type": "string"},
                    "options": {"type": "object"}
                },
                "required": ["operation", "data"]
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "success": {"type": "boolean"},
                    "operation": {"type": "string"},
                    "input_size": {"type": "integer"},
                    "output_size": {"type": "integer"},
                    "output": {},
                    "execution_time_ms": {"type": "number"}
                }
            }),
            performance: "p50 < 5ms",
            composition_examples: vec![json!({
                "description": "Summarize a document and store the summary",
                "calls": [
                    {"tool": "transform", "arguments": {"operation": "generate_summary", "data": "..."}},
                    {"tool": "store", "arguments": {"key": "summary:doc1", "value": "..."}}
                ]
            })],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_name("drop_table"), None);
    }

    #[test]
    fn test_cacheable_set_excludes_mutators() {
        assert!(!PrimitiveKind::Store.cacheable());
        assert!(!PrimitiveKind::Link.cacheable());
        assert!(PrimitiveKind::Retrieve.cacheable());
        assert!(PrimitiveKind::Search.cacheable());
        assert!(PrimitiveKind::Transform.cacheable());
    }

    #[test]
    fn test_search_type_parsing() {
        assert_eq!(SearchType::from_name("hybrid").unwrap(), SearchType::Hybrid);
        assert!(matches!(
            SearchType::from_name("fuzzy"),
            Err(AgramaError::InvalidSearchType { .. })
        ));
    }

    #[test]
    fn test_store_params_validation() {
        let ok = StoreParams::parse(&json!({"key": "k", "value": "v"})).unwrap();
        assert_eq!(ok.key, "k");
        assert!(ok.metadata.is_none());

        assert!(matches!(
            StoreParams::parse(&json!({"value": "v"})),
            Err(AgramaError::MissingField { .. })
        ));
        assert!(matches!(
            StoreParams::parse(&json!({"key": "", "value": "v"})),
            Err(AgramaError::EmptyString { .. })
        ));
        assert!(matches!(
            StoreParams::parse(&json!({"key": "k", "value": 42})),
            Err(AgramaError::InvalidType { .. })
        ));
        // Reserved prefixes are sidecar-only
        assert!(StoreParams::parse(&json!({"key": "_meta:x", "value": "v"})).is_err());
    }

    #[test]
    fn test_retrieve_params_defaults() {
        let params = RetrieveParams::parse(&json!({"key": "k"})).unwrap();
        assert!(!params.include_history);
        assert_eq!(params.history_limit, 10);

        let params =
            RetrieveParams::parse(&json!({"key": "k", "include_history": true, "history_limit": 3}))
                .unwrap();
        assert!(params.include_history);
        assert_eq!(params.history_limit, 3);
    }

    #[test]
    fn test_search_params_validation() {
        let params = SearchParams::parse(&json!({"query": "q", "type": "lexical"})).unwrap();
        assert_eq!(params.search_type, SearchType::Lexical);

        assert!(matches!(
            SearchParams::parse(&json!({"query": "q", "type": "nope"})),
            Err(AgramaError::InvalidSearchType { .. })
        ));
        assert!(matches!(
            SearchParams::parse(&json!({"query": "q"})),
            Err(AgramaError::MissingField { .. })
        ));
    }

    #[test]
    fn test_link_params_rejects_separator() {
        assert!(LinkParams::parse(&json!({"from": "a", "to": "b", "relation": "uses"})).is_ok());
        assert!(matches!(
            LinkParams::parse(&json!({"from": "a:b", "to": "c", "relation": "uses"})),
            Err(AgramaError::InvalidType { .. })
        ));
        assert!(matches!(
            LinkParams::parse(&json!({"from": "a", "to": "c", "relation": ""})),
            Err(AgramaError::EmptyString { .. })
        ));
    }

    #[test]
    fn test_transform_params_whitelist_checked_at_parse() {
        assert!(TransformParams::parse(
            &json!({"operation": "parse_functions", "data": "fn x() {}"})
        )
        .is_ok());
        assert!(matches!(
            TransformParams::parse(&json!({"operation": "evil_op", "data": "x"})),
            Err(AgramaError::UnsupportedOperation { .. })
        ));
        // Empty-string options are tolerated
        assert!(TransformParams::parse(
            &json!({"operation": "compress_text", "data": "x", "options": ""})
        )
        .is_ok());
    }

    #[test]
    fn test_registry_covers_all_primitives() {
        let registry = tool_registry();
        assert_eq!(registry.len(), PrimitiveKind::ALL.len());
        for (spec, kind) in registry.iter().zip(PrimitiveKind::ALL) {
            assert_eq!(spec.name, kind.name());
            assert!(spec.input_schema.get("type").is_some());
            assert!(!spec.composition_examples.is_empty());
        }
    }

    #[test]
    fn test_registry_is_shared_static() {
        let a = tool_registry().as_ptr();
        let b = tool_registry().as_ptr();
        assert_eq!(a, b);
    }
}
