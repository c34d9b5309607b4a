//! The primitive engine.
//!
//! One engine type wires the whole substrate: temporal store, the three
//! indices behind the hybrid search engine, agent sessions, memory
//! pools, the optional result cache, and the performance monitor.
//! Optimizations (caching, pooling) are configuration, not a parallel
//! engine variant.
//!
//! Every call runs the same path: resolve the primitive kind once,
//! parse-and-validate the typed parameters (a failed validation never
//! touches the store), touch the agent's session, borrow a scoped arena,
//! execute, record latency into the monitor, and release the arena. The
//! monitor can observe but never fail a call.

use crate::config::AgramaConfig;
use crate::embedding::Embedder;
use crate::error::{AgramaError, AgramaResult};
use crate::monitor::PerformanceMonitor;
use crate::pool::{ArenaClass, MemoryPools, ScopedArena};
use crate::primitives::{
    LinkParams, PrimitiveCall, PrimitiveKind, RetrieveParams, SearchParams, SearchType,
    StoreParams, TransformParams,
};
use crate::search::{
    GraphIndex, HnswConfig, HnswIndex, HybridQuery, HybridSearchEngine, HybridWeights,
    LexicalConfig, LexicalIndex, Vector,
};
use crate::session::SessionTracker;
use crate::store::TemporalStore;
use crate::transform::TransformOp;
use crate::types::{link_key, meta_key, ops_key, LinkRecord, ProvenanceRecord, OPS_PREFIX};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Values longer than this trigger semantic indexing on store.
const SEMANTIC_INDEX_THRESHOLD: usize = 50;
/// Result-cache entries older than this are pruned on maintenance.
const CACHE_TTL_SECS: i64 = 300;
/// `_ops:` records beyond this count are rotated out, oldest first.
const OPS_LOG_CAP: usize = 10_000;

/// Execution context handed to a primitive body.
///
/// Carries the call's scoped arena plus the identity and timestamp the
/// primitive stamps into provenance. Index and store handles live on the
/// engine itself.
pub struct ExecContext<'a> {
    /// Scratch arena scoped to this call
    pub arena: &'a mut ScopedArena,
    /// The calling agent
    pub agent_id: &'a str,
    /// The agent's session
    pub session_id: &'a str,
    /// Wall-clock timestamp of the call
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: JsonValue,
    inserted: DateTime<Utc>,
}

#[derive(Debug)]
struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    order: Mutex<VecDeque<String>>,
    max_size: usize,
}

impl ResultCache {
    fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    fn get(&self, fingerprint: &str) -> Option<JsonValue> {
        self.entries.get(fingerprint).map(|e| e.value.clone())
    }

    fn insert(&self, fingerprint: String, value: JsonValue) {
        let mut order = self.order.lock().expect("cache order poisoned");
        if self.entries.len() >= self.max_size {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        if self
            .entries
            .insert(
                fingerprint.clone(),
                CacheEntry {
                    value,
                    inserted: Utc::now(),
                },
            )
            .is_none()
        {
            order.push_back(fingerprint);
        }
    }

    fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::seconds(CACHE_TTL_SECS);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.inserted >= cutoff);
        let mut order = self.order.lock().expect("cache order poisoned");
        order.retain(|k| self.entries.contains_key(k));
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The engine executing the five primitives.
///
/// Cheap to clone; all clones share the same substrate.
#[derive(Clone)]
pub struct PrimitiveEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: AgramaConfig,
    store: TemporalStore,
    hybrid: HybridSearchEngine,
    sessions: SessionTracker,
    pools: MemoryPools,
    monitor: PerformanceMonitor,
    cache: Option<ResultCache>,
    embedder: Option<Arc<dyn Embedder>>,
    /// Bumped by every successful store/link; read-side cache
    /// fingerprints include it, so a write fences out everything cached
    /// before it (stale entries age out via TTL and size eviction).
    write_generation: AtomicU64,
}

impl PrimitiveEngine {
    /// Build an engine from configuration.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if the configuration fails cross-field checks.
    pub fn new(config: AgramaConfig) -> AgramaResult<Self> {
        Self::with_parts(config, None, true)
    }

    /// Build an engine with an injected embedding producer.
    pub fn with_embedder(config: AgramaConfig, embedder: Arc<dyn Embedder>) -> AgramaResult<Self> {
        Self::with_parts(config, Some(embedder), true)
    }

    /// Build an engine with the monitor disabled (observation off,
    /// results unchanged).
    pub fn without_monitor(config: AgramaConfig) -> AgramaResult<Self> {
        Self::with_parts(config, None, false)
    }

    fn with_parts(
        config: AgramaConfig,
        embedder: Option<Arc<dyn Embedder>>,
        monitor_enabled: bool,
    ) -> AgramaResult<Self> {
        config
            .validate()
            .map_err(AgramaError::InvalidRequest)?;

        let hnsw_config = HnswConfig::new(config.vector_dimensions)
            .max_connections(config.max_connections)
            .ef_construction(config.ef_construction)
            .matryoshka_dims(config.matryoshka_dims.clone());
        let lexical_config = LexicalConfig::default().params(config.bm25_k1, config.bm25_b);

        let hybrid = HybridSearchEngine::new(
            Arc::new(HnswIndex::new(hnsw_config)),
            Arc::new(LexicalIndex::new(lexical_config)),
            Arc::new(GraphIndex::new()),
        );

        let monitor = if monitor_enabled {
            PerformanceMonitor::new(config.alert_thresholds.clone())
        } else {
            PerformanceMonitor::disabled()
        };

        let cache = config.cache_enabled.then(|| ResultCache::new(config.cache_max_size));
        let sessions = SessionTracker::new(config.session_idle_seconds, config.max_concurrent_agents);
        let store = TemporalStore::with_retention(config.history_retention);
        let pools = MemoryPools::new(config.vector_dimensions);

        info!(
            dims = config.vector_dimensions,
            cache = config.cache_enabled,
            "primitive engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                hybrid,
                sessions,
                pools,
                monitor,
                cache,
                embedder,
                write_generation: AtomicU64::new(0),
            }),
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &AgramaConfig {
        &self.inner.config
    }

    /// The temporal store.
    pub fn store(&self) -> &TemporalStore {
        &self.inner.store
    }

    /// The hybrid search engine (and through it, the three indices).
    pub fn hybrid(&self) -> &HybridSearchEngine {
        &self.inner.hybrid
    }

    /// The session tracker.
    pub fn sessions(&self) -> &SessionTracker {
        &self.inner.sessions
    }

    /// The pool substrate.
    pub fn pools(&self) -> &MemoryPools {
        &self.inner.pools
    }

    /// The performance monitor.
    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.inner.monitor
    }

    /// Execute one primitive call for `agent_id`.
    ///
    /// Resolves the primitive, validates parameters, tracks the session,
    /// runs the body inside a scoped arena, and records the outcome in
    /// the monitor. Unknown names are rejected as `UnsupportedOperation`.
    pub fn execute(&self, agent_id: &str, name: &str, params: &JsonValue) -> AgramaResult<JsonValue> {
        let kind = PrimitiveKind::from_name(name).ok_or_else(|| {
            AgramaError::UnsupportedOperation {
                operation: name.to_string(),
            }
        })?;

        // Validation happens before any state is touched
        let call = PrimitiveCall::parse(kind, params)?;
        let session_id = match self.inner.sessions.touch(agent_id, kind) {
            Ok(id) => id,
            Err(err) => {
                self.inner.monitor.record_exhaustion(&err.to_string());
                return Err(err);
            }
        };

        let start = Instant::now();
        let timestamp = Utc::now();
        let mut arena = self.inner.pools.arenas().scope(Self::arena_class(kind));

        // Result cache: referentially transparent primitives only
        let fingerprint = match (&self.inner.cache, kind.cacheable()) {
            (Some(_), true) => Some(self.fingerprint(&mut arena, kind, params, agent_id)),
            _ => None,
        };
        if let (Some(cache), Some(fp)) = (&self.inner.cache, fingerprint.as_deref()) {
            if let Some(hit) = cache.get(fp) {
                debug!(primitive = kind.name(), "cache hit");
                self.inner
                    .monitor
                    .record_call(kind, start.elapsed().as_secs_f64() * 1000.0, true);
                return Ok(hit);
            }
        }

        let ctx = ExecContext {
            arena: &mut arena,
            agent_id,
            session_id: &session_id,
            timestamp,
        };

        let result = match call {
            PrimitiveCall::Store(p) => self.exec_store(ctx, p),
            PrimitiveCall::Retrieve(p) => self.exec_retrieve(ctx, p),
            PrimitiveCall::Search(p) => self.exec_search(ctx, p),
            PrimitiveCall::Link(p) => self.exec_link(ctx, p),
            PrimitiveCall::Transform(p) => self.exec_transform(ctx, p),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.inner
            .monitor
            .record_call(kind, elapsed_ms, result.is_ok());
        if let Err(AgramaError::PoolExhausted { .. }) = &result {
            self.inner
                .monitor
                .record_exhaustion(&format!("{} pool exhausted", kind.name()));
        }
        if result.is_ok() && matches!(kind, PrimitiveKind::Store | PrimitiveKind::Link) {
            // Fence out read results cached before this write
            self.inner.write_generation.fetch_add(1, Ordering::Relaxed);
        }

        // Arena (and everything it vended) is reclaimed here
        drop(arena);

        let mut value = result?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("execution_time_ms".into(), json!(elapsed_ms));
        }

        if let (Some(cache), Some(fp)) = (&self.inner.cache, fingerprint) {
            cache.insert(fp, value.clone());
        }
        Ok(value)
    }

    /// Execute a batch sequentially. Per-item failures do not abort the
    /// batch; each slot carries its own result.
    pub fn execute_batch(
        &self,
        agent_id: &str,
        calls: &[(String, JsonValue)],
    ) -> Vec<AgramaResult<JsonValue>> {
        calls
            .iter()
            .map(|(name, params)| self.execute(agent_id, name, params))
            .collect()
    }

    fn arena_class(kind: PrimitiveKind) -> ArenaClass {
        match kind {
            PrimitiveKind::Search => ArenaClass::Search,
            PrimitiveKind::Transform => ArenaClass::Json,
            _ => ArenaClass::Primitive,
        }
    }

    /// Cache fingerprint: blake3 over primitive name, agent, the current
    /// write generation, and the canonical parameter serialization
    /// (serde_json object keys are ordered, so structurally equal params
    /// fingerprint identically).
    ///
    /// Retrieve and search fingerprints bind the write generation, so
    /// any store or link makes previously cached read results
    /// unreachable instead of stale. Transform is write-independent and
    /// skips the fence.
    fn fingerprint(
        &self,
        arena: &mut ScopedArena,
        kind: PrimitiveKind,
        params: &JsonValue,
        agent_id: &str,
    ) -> String {
        let generation = match kind {
            PrimitiveKind::Retrieve | PrimitiveKind::Search => {
                self.inner.write_generation.load(Ordering::Relaxed)
            }
            _ => 0,
        };
        let mut buf = arena.byte_buffer();
        buf.extend_from_slice(kind.name().as_bytes());
        buf.push(0);
        buf.extend_from_slice(agent_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&generation.to_le_bytes());
        buf.push(0);
        serde_json::to_writer(&mut buf, params).ok();
        let hash = blake3::hash(&buf).to_hex().to_string();
        arena.recycle_bytes(buf);
        hash
    }

    // -----------------------------------------------------------------------
    // Primitive bodies
    // -----------------------------------------------------------------------

    fn exec_store(&self, ctx: ExecContext<'_>, params: StoreParams) -> AgramaResult<JsonValue> {
        let size = params.value.len();
        self.inner
            .store
            .save(params.key.as_str(), JsonValue::String(params.value.clone()))?;
        self.inner.monitor.record_alloc(size as u64);

        // Provenance sidecar (recognized fields + user metadata)
        let provenance = ProvenanceRecord::new(
            ctx.agent_id,
            ctx.session_id,
            ctx.timestamp,
            size,
            params.metadata.as_ref(),
        );
        self.inner
            .store
            .save(meta_key(&params.key), provenance.to_value())?;

        // Operation log
        self.inner.store.save(
            ops_key(ctx.timestamp, "store", ctx.agent_id),
            json!({"key": params.key, "size": size}),
        )?;

        // Lexical indexing always; semantic indexing for substantial
        // values when an embedding source exists
        self.inner
            .hybrid
            .lexical_index()
            .index(params.key.as_str(), &params.value);

        let mut embedding =
            Self::embedding_from_metadata(params.metadata.as_ref()).map(|data| self.pooled_vector(data));
        if embedding.is_none() && size > SEMANTIC_INDEX_THRESHOLD {
            if let Some(embedder) = &self.inner.embedder {
                embedding = Some(self.pooled_embed(embedder.as_ref(), &params.value));
            }
        }

        let indexed = match embedding {
            Some(vector) => {
                self.inner
                    .hybrid
                    .semantic_index()
                    .insert(params.key.clone(), vector)?;
                true
            }
            None => false,
        };

        Ok(json!({
            "success": true,
            "key": params.key,
            "timestamp": ctx.timestamp.to_rfc3339(),
            "indexed": indexed,
        }))
    }

    fn embedding_from_metadata(metadata: Option<&JsonValue>) -> Option<Vec<f32>> {
        let array = metadata?.get("embedding")?.as_array()?;
        let data: Option<Vec<f32>> = array.iter().map(|v| v.as_f64().map(|f| f as f32)).collect();
        data.filter(|data| !data.is_empty())
    }

    /// Embed `text` onto a block leased from the aligned embedding pool.
    ///
    /// Falls back to a standalone allocation when the pool is exhausted
    /// or the embedder's dimension differs from the pool's. The lease is
    /// released when the vector's last clone drops (for queries, at the
    /// end of the call; for indexed documents, on re-index or engine
    /// teardown).
    fn pooled_embed(&self, embedder: &dyn Embedder, text: &str) -> Vector {
        let pool = self.inner.pools.embeddings();
        if embedder.dim() == pool.dim() {
            if let Ok(mut block) = pool.acquire() {
                embedder.embed_into(text, block.as_mut_slice());
                return Vector::from_block(block);
            }
        }
        embedder.embed(text)
    }

    /// Re-home caller-supplied embedding data onto a pooled block.
    fn pooled_vector(&self, data: Vec<f32>) -> Vector {
        let pool = self.inner.pools.embeddings();
        if data.len() == pool.dim() {
            if let Ok(mut block) = pool.acquire() {
                block.copy_from(&data);
                return Vector::from_block(block);
            }
        }
        Vector::new(data)
    }

    fn exec_retrieve(&self, _ctx: ExecContext<'_>, params: RetrieveParams) -> AgramaResult<JsonValue> {
        let record = match self.inner.store.get(&params.key) {
            Ok(record) => record,
            // A missing key is a negative answer, not an error
            Err(AgramaError::KeyNotFound { .. }) => {
                return Ok(json!({"exists": false, "key": params.key}));
            }
            Err(other) => return Err(other),
        };

        let metadata = self
            .inner
            .store
            .get(&meta_key(&params.key))
            .map(|m| m.content().clone())
            .unwrap_or(JsonValue::Null);

        let mut result = json!({
            "exists": true,
            "key": params.key,
            "value": record.content().clone(),
            "metadata": metadata,
        });

        if params.include_history {
            let history: Vec<JsonValue> = self
                .inner
                .store
                .history(&params.key, params.history_limit)?
                .into_iter()
                .map(|r| {
                    json!({
                        "content": r.content().clone(),
                        "timestamp": r.timestamp().to_rfc3339(),
                        "version": r.content_hash(),
                    })
                })
                .collect();
            result["history"] = json!(history);
        }

        Ok(result)
    }

    fn exec_search(&self, ctx: ExecContext<'_>, params: SearchParams) -> AgramaResult<JsonValue> {
        let k = params.options.get("max_results").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

        let results: Vec<JsonValue> = match params.search_type {
            SearchType::Lexical => self
                .inner
                .hybrid
                .lexical_index()
                .search(&params.query, k)
                .into_iter()
                .map(|hit| {
                    json!({
                        "key": hit.doc_key,
                        "score": hit.score,
                        "matching_terms": hit.matching_terms,
                    })
                })
                .collect(),

            SearchType::Semantic => {
                let embedding = self.query_embedding(&params)?;
                self.inner
                    .hybrid
                    .semantic_index()
                    .search(&embedding, k, self.ef_for(&params, k))?
                    .into_iter()
                    .map(|hit| json!({"key": hit.doc_key, "score": hit.score}))
                    .collect()
            }

            SearchType::Graph => {
                let starting = Self::starting_nodes(&params.options);
                if starting.is_empty() {
                    return Err(AgramaError::MissingField {
                        field: "starting_nodes".into(),
                    });
                }
                let max_hops = params
                    .options
                    .get("max_hops")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(3) as usize;
                let mut hits: Vec<(String, usize)> = self
                    .inner
                    .hybrid
                    .graph_index()
                    .reachability(&starting, max_hops)
                    .into_iter()
                    .collect();
                hits.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                hits.truncate(k);
                hits.into_iter()
                    .map(|(node, distance)| {
                        json!({
                            "key": node,
                            "distance": distance,
                            "score": GraphIndex::score(distance),
                        })
                    })
                    .collect()
            }

            SearchType::Temporal => {
                let start = Self::parse_time(&params.options, "start")?
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                let end = Self::parse_time(&params.options, "end")?.unwrap_or(ctx.timestamp);
                self.inner
                    .store
                    .scan_range(start, end, false, k)
                    .into_iter()
                    .filter(|(key, _)| params.query.is_empty() || key.starts_with(&params.query))
                    .map(|(key, record)| {
                        json!({
                            "key": key,
                            "content": record.content().clone(),
                            "timestamp": record.timestamp().to_rfc3339(),
                            "version": record.content_hash(),
                        })
                    })
                    .collect()
            }

            SearchType::Hybrid => {
                let weights = Self::weights(&params.options)?;
                let embedding = match params.options.get("embedding") {
                    Some(_) => Some(self.query_embedding(&params)?),
                    None if weights.beta > 0.0 => self
                        .inner
                        .embedder
                        .clone()
                        .map(|e| self.pooled_embed(e.as_ref(), &params.query)),
                    None => None,
                };

                let mut query = HybridQuery::new(params.query.clone())
                    .k(k)
                    .weights(weights)
                    .starting_nodes(Self::starting_nodes(&params.options));
                if let Some(embedding) = embedding {
                    query = query.embedding(embedding);
                }
                if let Some(max_hops) =
                    params.options.get("max_hops").and_then(|v| v.as_u64())
                {
                    query.max_hops = max_hops as usize;
                }

                self.inner
                    .hybrid
                    .search(&query)?
                    .into_iter()
                    .map(|r| serde_json::to_value(r).unwrap_or_default())
                    .collect()
            }
        };

        let count = results.len();
        Ok(json!({
            "query": params.query,
            "type": params.search_type.name(),
            "results": results,
            "count": count,
        }))
    }

    fn exec_link(&self, ctx: ExecContext<'_>, params: LinkParams) -> AgramaResult<JsonValue> {
        let record = LinkRecord::new(
            ctx.agent_id,
            ctx.session_id,
            ctx.timestamp,
            &params.relation,
            params.metadata.as_ref(),
        );

        let key = link_key(&params.from, &params.relation, &params.to);
        self.inner.store.save(key, record.to_value())?;
        self.inner
            .hybrid
            .graph_index()
            .add_edge(params.from.as_str(), params.to.as_str());

        self.inner.store.save(
            ops_key(ctx.timestamp, "link", ctx.agent_id),
            json!({"from": params.from, "to": params.to, "relation": params.relation}),
        )?;

        Ok(json!({
            "success": true,
            "from": params.from,
            "to": params.to,
            "relation": params.relation,
            "timestamp": ctx.timestamp.to_rfc3339(),
        }))
    }

    fn exec_transform(&self, _ctx: ExecContext<'_>, params: TransformParams) -> AgramaResult<JsonValue> {
        let op = TransformOp::from_name(&params.operation)?;
        let output = op.apply(&params.data, &params.options)?;
        let output_size = output.to_string().len();

        Ok(json!({
            "success": true,
            "operation": params.operation,
            "input_size": params.data.len(),
            "output_size": output_size,
            "output": output,
        }))
    }

    // -----------------------------------------------------------------------
    // Search helpers
    // -----------------------------------------------------------------------

    fn query_embedding(&self, params: &SearchParams) -> AgramaResult<Vector> {
        if let Some(value) = params.options.get("embedding") {
            let array = value.as_array().ok_or_else(|| AgramaError::InvalidType {
                field: "embedding".into(),
                expected: "array of numbers".into(),
            })?;
            let data: Option<Vec<f32>> =
                array.iter().map(|v| v.as_f64().map(|f| f as f32)).collect();
            let data = data.ok_or_else(|| AgramaError::InvalidType {
                field: "embedding".into(),
                expected: "array of numbers".into(),
            })?;
            if data.is_empty() {
                return Err(AgramaError::EmptyString {
                    field: "embedding".into(),
                });
            }
            return Ok(self.pooled_vector(data));
        }
        match &self.inner.embedder {
            Some(embedder) => Ok(self.pooled_embed(embedder.as_ref(), &params.query)),
            None => Err(AgramaError::MissingField {
                field: "embedding".into(),
            }),
        }
    }

    fn ef_for(&self, params: &SearchParams, k: usize) -> usize {
        params
            .options
            .get("ef")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(50)
            .max(k)
    }

    fn starting_nodes(options: &JsonValue) -> Vec<String> {
        options
            .get("starting_nodes")
            .and_then(|v| v.as_array())
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn weights(options: &JsonValue) -> AgramaResult<HybridWeights> {
        let get = |name: &str| options.get(name).and_then(|v| v.as_f64()).map(|v| v as f32);
        match (get("alpha"), get("beta"), get("gamma")) {
            (None, None, None) => Ok(HybridWeights::balanced()),
            (alpha, beta, gamma) => HybridWeights::new(
                alpha.unwrap_or(0.0),
                beta.unwrap_or(0.0),
                gamma.unwrap_or(0.0),
            ),
        }
    }

    fn parse_time(options: &JsonValue, field: &str) -> AgramaResult<Option<DateTime<Utc>>> {
        match options.get(field) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|_| AgramaError::InvalidType {
                    field: field.to_string(),
                    expected: "RFC 3339 timestamp".to_string(),
                }),
            Some(_) => Err(AgramaError::InvalidType {
                field: field.to_string(),
                expected: "RFC 3339 timestamp".to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance and stats
    // -----------------------------------------------------------------------

    /// Periodic maintenance: sweep idle sessions, prune expired cache
    /// entries, rotate operation logs, and evaluate monitor thresholds.
    pub fn maintenance_tick(&self) {
        let now = Utc::now();
        let swept = self.inner.sessions.sweep_idle(now);
        let pruned = self
            .inner
            .cache
            .as_ref()
            .map(|c| c.prune_expired(now))
            .unwrap_or(0);

        // Rotate the ops log, oldest first
        let ops_keys = self.inner.store.list_keys(OPS_PREFIX);
        let mut rotated = 0;
        if ops_keys.len() > OPS_LOG_CAP {
            // Keys embed epoch millis, so lexicographic order is close
            // enough to chronological for rotation
            for key in ops_keys.iter().take(ops_keys.len() - OPS_LOG_CAP) {
                self.inner.store.purge(key);
                rotated += 1;
            }
        }

        self.inner.monitor.check_thresholds();
        if swept + pruned + rotated > 0 {
            debug!(swept, pruned, rotated, "maintenance tick");
        }
    }

    /// Engine-wide statistics snapshot.
    pub fn stats(&self) -> JsonValue {
        json!({
            "store": {
                "keys": self.inner.store.key_count(),
                "versions": self.inner.store.version_count(),
                "unique_values": self.inner.store.unique_value_count(),
            },
            "indices": {
                "semantic": self.inner.hybrid.semantic_index().len(),
                "lexical": self.inner.hybrid.lexical_index().len(),
                "graph_edges": self.inner.hybrid.graph_index().edge_count(),
            },
            "sessions": self.inner.sessions.len(),
            "cache": self.inner.cache.as_ref().map(|c| c.len()),
            "pools": self.inner.pools.stats(),
            "search_scratch": self.inner.hybrid.semantic_index().scratch_stats(),
            "monitor": self.inner.monitor.report(),
        })
    }
}
