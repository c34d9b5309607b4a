/// Common types used throughout Agrama.
///
/// This module defines the core data structures of the substrate's data
/// model: change records, provenance sidecars, link records, and the
/// reserved key prefixes that carry them. These types are designed to be
/// simple, immutable, and content-addressable where possible.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved prefix for provenance sidecar records.
pub const META_PREFIX: &str = "_meta:";
/// Reserved prefix for link (directed edge) records.
pub const LINK_PREFIX: &str = "_link:";
/// Reserved prefix for operation log records.
pub const OPS_PREFIX: &str = "_ops:";

/// Build the provenance sidecar key for a stored key.
///
/// Format: `_meta:<key>`
pub fn meta_key(key: &str) -> String {
    format!("{META_PREFIX}{key}")
}

/// Build the link record key for a directed, labeled edge.
///
/// Format: `_link:<from>:<rel>:<to>`. The existence of this key *is* the
/// edge `from --rel--> to`.
pub fn link_key(from: &str, relation: &str, to: &str) -> String {
    format!("{LINK_PREFIX}{from}:{relation}:{to}")
}

/// Build an operation log key.
///
/// Format: `_ops:<epoch_millis>:<op>:<agent>`
pub fn ops_key(timestamp: DateTime<Utc>, op: &str, agent_id: &str) -> String {
    format!("{OPS_PREFIX}{}:{}:{}", timestamp.timestamp_millis(), op, agent_id)
}

/// Parse a link key back into `(from, relation, to)`.
///
/// Returns `None` for keys outside the `_link:` prefix or with fewer than
/// three segments. Segments themselves must not contain `:`; the store
/// rejects such inputs at link time.
pub fn parse_link_key(key: &str) -> Option<(&str, &str, &str)> {
    let rest = key.strip_prefix(LINK_PREFIX)?;
    let mut parts = rest.splitn(3, ':');
    let from = parts.next()?;
    let relation = parts.next()?;
    let to = parts.next()?;
    if from.is_empty() || relation.is_empty() || to.is_empty() {
        return None;
    }
    Some((from, relation, to))
}

/// Whether a key lives in one of the reserved sidecar namespaces.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(META_PREFIX) || key.starts_with(LINK_PREFIX) || key.starts_with(OPS_PREFIX)
}

/// Vector clock for causal ordering across agents.
///
/// Each agent maintains a monotonic counter; the clock is ticked on every
/// link write so that replicated links can be causally ordered if
/// replication is ever enabled. Comparison follows the usual
/// happens-before partial order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    /// Agent ID -> logical timestamp mapping
    pub clocks: HashMap<String, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    pub fn new() -> Self {
        Self {
            clocks: HashMap::new(),
        }
    }

    /// Increment the clock for a specific agent.
    pub fn increment(&mut self, agent_id: &str) {
        let entry = self.clocks.entry(agent_id.to_string()).or_insert(0);
        *entry += 1;
    }

    /// Merge another vector clock into this one (taking max of each clock).
    pub fn merge(&mut self, other: &VectorClock) {
        for (agent_id, timestamp) in &other.clocks {
            let entry = self.clocks.entry(agent_id.clone()).or_insert(0);
            *entry = (*entry).max(*timestamp);
        }
    }

    /// Compare two vector clocks.
    ///
    /// Returns:
    /// - `Some(Ordering::Less)` if self happened before other
    /// - `Some(Ordering::Greater)` if self happened after other
    /// - `Some(Ordering::Equal)` if they're the same
    /// - `None` if they're concurrent (conflict)
    pub fn compare(&self, other: &VectorClock) -> Option<std::cmp::Ordering> {
        let all_agents: std::collections::HashSet<_> =
            self.clocks.keys().chain(other.clocks.keys()).collect();

        let mut has_less = false;
        let mut has_greater = false;

        for agent_id in all_agents {
            let self_val = self.clocks.get(agent_id).copied().unwrap_or(0);
            let other_val = other.clocks.get(agent_id).copied().unwrap_or(0);

            match self_val.cmp(&other_val) {
                std::cmp::Ordering::Less => has_less = true,
                std::cmp::Ordering::Greater => has_greater = true,
                std::cmp::Ordering::Equal => {}
            }
        }

        match (has_less, has_greater) {
            (true, true) => None, // Concurrent (conflict)
            (true, false) => Some(std::cmp::Ordering::Less),
            (false, true) => Some(std::cmp::Ordering::Greater),
            (false, false) => Some(std::cmp::Ordering::Equal),
        }
    }

    /// Check if clocks are concurrent (conflict).
    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other).is_none()
    }
}

/// An immutable change record in a key's append-only history.
///
/// Every save creates a new record. The value is stored in an `Arc` so
/// identical contents share one allocation: the store deduplicates by
/// content hash, which doubles as the record's version identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The stored content (Arc-wrapped for deduplication)
    #[serde(
        serialize_with = "serialize_arc_json",
        deserialize_with = "deserialize_arc_json"
    )]
    pub content: Arc<JsonValue>,
    /// When this record was appended
    pub timestamp: DateTime<Utc>,
    /// Content-addressed version ID (blake3 of the canonical serialization)
    pub content_hash: String,
    /// Content hash of the previous record for this key, if any
    pub previous: Option<String>,
}

/// Serialize Arc<JsonValue> as plain JsonValue
fn serialize_arc_json<S>(value: &Arc<JsonValue>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    value.as_ref().serialize(serializer)
}

/// Deserialize JsonValue into Arc<JsonValue>
fn deserialize_arc_json<'de, D>(deserializer: D) -> Result<Arc<JsonValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(Arc::new(value))
}

impl ChangeRecord {
    /// Create a new change record.
    pub fn new(
        content: Arc<JsonValue>,
        timestamp: DateTime<Utc>,
        content_hash: String,
        previous: Option<String>,
    ) -> Self {
        Self {
            content,
            timestamp,
            content_hash,
            previous,
        }
    }

    /// Get the content as a reference.
    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    /// Get the record's timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the content-addressed version ID.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the previous record's hash if this is not the first record.
    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }
}

/// Content-address a JSON value.
///
/// The hash is computed over the canonical `serde_json` serialization, so
/// structurally identical values always map to the same ID.
pub fn content_hash(value: &JsonValue) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Provenance sidecar stored at `_meta:<key>`.
///
/// Records who wrote a key, under which session, when, and how large the
/// content was. User-supplied metadata keys are merged alongside the
/// recognized fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Agent that performed the write
    pub agent_id: String,
    /// Session the write belonged to
    pub session_id: String,
    /// When the write happened
    pub timestamp: DateTime<Utc>,
    /// Content size in bytes at write time
    pub size: usize,
    /// User-supplied metadata, merged in
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl ProvenanceRecord {
    /// Build a provenance record, merging user metadata.
    ///
    /// Recognized fields win over user-supplied keys of the same name.
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        size: usize,
        user_metadata: Option<&JsonValue>,
    ) -> Self {
        let mut extra = Map::new();
        if let Some(JsonValue::Object(map)) = user_metadata {
            for (k, v) in map {
                if !matches!(k.as_str(), "agent_id" | "session_id" | "timestamp" | "size") {
                    extra.insert(k.clone(), v.clone());
                }
            }
        }
        Self {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            timestamp,
            size,
            extra,
        }
    }

    /// Serialize to the JSON object stored as the sidecar value.
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Link record stored at `_link:<from>:<rel>:<to>`.
///
/// The key's existence is the directed edge; the value carries the edge's
/// provenance and metadata. Links are monotonic: once created they
/// persist, and re-linking the same `(from, rel, to)` refreshes metadata
/// without creating a second edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Agent that created the edge
    pub agent_id: String,
    /// Session the edge was created under
    pub session_id: String,
    /// When the edge was created (or last refreshed)
    pub timestamp: DateTime<Utc>,
    /// The edge label
    pub relation: String,
    /// Causal clock, ticked by the writing agent
    pub vector_clock: VectorClock,
    /// User-supplied metadata, merged in
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl LinkRecord {
    /// Build a link record, merging user metadata.
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        relation: impl Into<String>,
        user_metadata: Option<&JsonValue>,
    ) -> Self {
        let agent_id = agent_id.into();
        let mut vector_clock = VectorClock::new();
        vector_clock.increment(&agent_id);

        let mut extra = Map::new();
        if let Some(JsonValue::Object(map)) = user_metadata {
            for (k, v) in map {
                if !matches!(
                    k.as_str(),
                    "agent_id" | "session_id" | "timestamp" | "relation" | "vector_clock"
                ) {
                    extra.insert(k.clone(), v.clone());
                }
            }
        }
        Self {
            agent_id,
            session_id: session_id.into(),
            timestamp,
            relation: relation.into(),
            vector_clock,
            extra,
        }
    }

    /// Serialize to the JSON object stored as the link value.
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}
