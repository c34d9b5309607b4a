//! HNSW (Hierarchical Navigable Small World) index for approximate
//! nearest neighbor search.
//!
//! A multi-layer graph where each node appears in layers `0..=max_layer`
//! and layer membership follows an exponentially decaying random
//! assignment, giving expected O(log n) search. This implementation adds
//! Matryoshka multi-precision search: when a dimension ladder is
//! configured, the layer-0 sweep scores candidates on a coarse prefix of
//! the vectors and only the surviving candidates are re-ranked at full
//! precision.
//!
//! Invariants maintained by every mutation:
//!
//! - a node has connection lists for exactly layers `0..=max_layer`
//! - every edge is bidirectional within its layer
//! - per-layer degree never exceeds M (M₀ at layer 0)
//! - equal similarity ties resolve to the lower node id

use super::types::{SemanticMatch, Vector};
use crate::error::{AgramaError, AgramaResult};
use crate::pool::{FixedPool, PoolStats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

/// Configuration for the HNSW index.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (immutable after construction)
    pub dim: usize,
    /// Maximum connections per node on non-zero layers
    pub m: usize,
    /// Maximum connections on layer 0 (2M by convention)
    pub m0: usize,
    /// Candidate list size during construction
    pub ef_construction: usize,
    /// Default candidate list size during search
    pub ef_search: usize,
    /// Seed for the level-assignment RNG (reproducible builds)
    pub seed: u64,
    /// Matryoshka truncation ladder, coarsest first; empty disables
    /// multi-precision search
    pub matryoshka_dims: Vec<usize>,
    /// Level decay factor (1/ln 2 gives P(level ≥ l) = 2^-l)
    pub m_l: f64,
}

impl HnswConfig {
    /// Create a config for the given dimension with default parameters.
    pub fn new(dim: usize) -> Self {
        let m = 16;
        Self {
            dim,
            m,
            m0: 2 * m,
            ef_construction: 200,
            ef_search: 50,
            seed: 42,
            matryoshka_dims: Vec::new(),
            m_l: 1.0 / std::f64::consts::LN_2,
        }
    }

    /// Set M (layer 0 gets 2M).
    pub fn max_connections(mut self, m: usize) -> Self {
        self.m = m;
        self.m0 = 2 * m;
        self
    }

    /// Set ef_construction.
    pub fn ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set the default search ef.
    pub fn ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set the RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the Matryoshka ladder (coarsest first).
    pub fn matryoshka_dims(mut self, dims: Vec<usize>) -> Self {
        self.matryoshka_dims = dims;
        self
    }

    /// Cap for the given layer.
    fn cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }

    /// Coarsest prefilter dimension, if multi-precision is enabled and
    /// actually coarser than the full vector.
    fn prefilter_dim(&self) -> Option<usize> {
        self.matryoshka_dims
            .first()
            .copied()
            .filter(|&d| d < self.dim)
    }
}

/// A node in the HNSW graph.
#[derive(Debug, Clone)]
struct Node {
    /// The document key this node indexes
    key: String,
    /// Deep copy of the inserted vector (the index owns it)
    vector: Vector,
    /// Highest layer this node appears in (stored, never scanned for)
    max_layer: usize,
    /// Neighbor ids per layer, index 0..=max_layer
    connections: Vec<Vec<u64>>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<u64, Node>,
    key_to_id: HashMap<String, u64>,
    entry_point: Option<u64>,
    top_layer: usize,
    next_id: u64,
}

/// Search candidate ordered by distance, ties to the lower id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f32,
    id: u64,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed on distance for a min-heap; lower id wins ties
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// HNSW index over document embeddings.
///
/// Single-writer, multi-reader: inserts take an exclusive lock over the
/// graph and entry point; searches take a shared lock. Candidate lists
/// for the layer sweeps come from a fixed scratch pool, so steady-state
/// inserts and searches reuse the same buffers instead of allocating.
#[derive(Debug)]
pub struct HnswIndex {
    config: HnswConfig,
    inner: RwLock<Inner>,
    rng: Mutex<StdRng>,
    /// Reusable candidate buffers for insert/search layer sweeps
    scratch: FixedPool<Vec<(u64, f32)>>,
}

impl HnswIndex {
    /// Create a new index with the given configuration.
    pub fn new(config: HnswConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            inner: RwLock::new(Inner::default()),
            rng: Mutex::new(rng),
            scratch: FixedPool::new("hnsw-candidates", 4, 64),
        }
    }

    /// Counters for the candidate scratch pool.
    pub fn scratch_stats(&self) -> PoolStats {
        self.scratch.stats()
    }

    /// Borrow a candidate buffer, falling back to a fresh allocation when
    /// the pool is at its cap. The flag records whether the buffer must
    /// be returned.
    fn lease_scratch(&self) -> (Vec<(u64, f32)>, bool) {
        match self.scratch.acquire() {
            Ok(buf) => (buf, true),
            Err(_) => (Vec::new(), false),
        }
    }

    fn release_scratch(&self, buf: Vec<(u64, f32)>, leased: bool) {
        if leased {
            self.scratch.release(buf);
        }
    }

    /// The configured embedding dimension.
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().nodes.is_empty()
    }

    /// Draw a level from the exponential-decay distribution.
    fn random_level(&self) -> usize {
        let mut rng = self.rng.lock().unwrap();
        let u: f64 = rng.gen_range(f64::EPSILON..1.0);
        (-u.ln() * self.config.m_l).floor() as usize
    }

    /// Insert a vector under `key`, replacing any previous vector for the
    /// same key.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the vector's dimension differs from the
    /// index's.
    pub fn insert(&self, key: impl Into<String>, vector: Vector) -> AgramaResult<u64> {
        let key = key.into();
        self.check_dims(&vector)?;
        let level = self.random_level();
        let (mut scratch, leased) = self.lease_scratch();

        let mut inner = self.inner.write().unwrap();
        if let Some(&old) = inner.key_to_id.get(&key) {
            Self::remove_locked(&mut inner, old);
        }
        let id = Self::insert_locked(&self.config, &mut inner, key, vector, level, &mut scratch);
        drop(inner);

        self.release_scratch(scratch, leased);
        Ok(id)
    }

    /// Bulk construction for a batch known upfront.
    ///
    /// Levels are drawn for the whole batch, then nodes are inserted
    /// highest level first so each insert navigates the partial graph
    /// already built instead of scanning naïvely. The resulting graph
    /// satisfies the same adjacency invariants as incremental inserts.
    pub fn insert_batch(&self, items: Vec<(String, Vector)>) -> AgramaResult<Vec<u64>> {
        for (_, vector) in &items {
            self.check_dims(vector)?;
        }

        let mut leveled: Vec<(usize, String, Vector)> = items
            .into_iter()
            .map(|(key, vector)| (self.random_level(), key, vector))
            .collect();
        // Highest level first; equal levels keep batch order
        leveled.sort_by(|a, b| b.0.cmp(&a.0));

        let (mut scratch, leased) = self.lease_scratch();
        let mut inner = self.inner.write().unwrap();
        let mut ids = Vec::with_capacity(leveled.len());
        for (level, key, vector) in leveled {
            if let Some(&old) = inner.key_to_id.get(&key) {
                Self::remove_locked(&mut inner, old);
            }
            ids.push(Self::insert_locked(
                &self.config,
                &mut inner,
                key,
                vector,
                level,
                &mut scratch,
            ));
        }
        drop(inner);

        self.release_scratch(scratch, leased);
        Ok(ids)
    }

    fn check_dims(&self, vector: &Vector) -> AgramaResult<()> {
        if vector.dimensions() != self.config.dim {
            return Err(AgramaError::DimensionMismatch {
                expected: self.config.dim,
                actual: vector.dimensions(),
            });
        }
        Ok(())
    }

    fn insert_locked(
        config: &HnswConfig,
        inner: &mut Inner,
        key: String,
        vector: Vector,
        level: usize,
        scratch: &mut Vec<(u64, f32)>,
    ) -> u64 {
        let id = inner.next_id;
        inner.next_id += 1;

        let node = Node {
            key: key.clone(),
            vector: vector.clone(),
            max_layer: level,
            connections: vec![Vec::new(); level + 1],
        };
        inner.nodes.insert(id, node);
        inner.key_to_id.insert(key, id);

        let Some(ep) = inner.entry_point else {
            inner.entry_point = Some(id);
            inner.top_layer = level;
            return id;
        };

        let ep_layer = inner.nodes[&ep].max_layer;
        let mut cur = ep;
        let mut cur_dist = Self::distance(&inner.nodes[&ep].vector, &vector, None);

        // Greedy descent through the layers above the new node's level
        for lc in ((level + 1)..=ep_layer).rev() {
            Self::search_layer(inner, cur, &vector, 1, lc, None, scratch);
            let (best, best_dist) = scratch
                .iter()
                .copied()
                .min_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                })
                .unwrap_or((cur, cur_dist));
            if best_dist < cur_dist {
                cur = best;
                cur_dist = best_dist;
            }
        }

        // Connect on each layer at or below the node's level
        for lc in (0..=level.min(ep_layer)).rev() {
            Self::search_layer(inner, cur, &vector, config.ef_construction, lc, None, scratch);
            scratch.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            let cap = config.cap(lc);
            let selected: Vec<u64> = scratch.iter().take(cap).map(|&(id, _)| id).collect();

            for &neighbor in &selected {
                Self::add_edge(inner, lc, id, neighbor);
                Self::add_edge(inner, lc, neighbor, id);
                Self::prune_connections(config, inner, lc, neighbor);
            }

            if let Some(&(closest, _)) = scratch.first() {
                cur = closest;
            }
        }

        if level > inner.top_layer {
            inner.top_layer = level;
            inner.entry_point = Some(id);
        }
        id
    }

    fn add_edge(inner: &mut Inner, layer: usize, from: u64, to: u64) {
        if from == to {
            return;
        }
        if let Some(node) = inner.nodes.get_mut(&from) {
            if !node.connections[layer].contains(&to) {
                node.connections[layer].push(to);
            }
        }
    }

    /// Drop the lowest-similarity edges of `node_id` at `layer` until its
    /// degree fits the cap, removing each dropped backlink so edges stay
    /// bidirectional.
    fn prune_connections(config: &HnswConfig, inner: &mut Inner, layer: usize, node_id: u64) {
        let cap = config.cap(layer);
        let (vector, neighbors) = {
            let node = &inner.nodes[&node_id];
            if node.connections[layer].len() <= cap {
                return;
            }
            (node.vector.clone(), node.connections[layer].clone())
        };

        let mut ranked: Vec<(u64, f32)> = neighbors
            .iter()
            .map(|&nid| {
                let dist = Self::distance(&vector, &inner.nodes[&nid].vector, None);
                (nid, dist)
            })
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let keep: Vec<u64> = ranked.iter().take(cap).map(|&(id, _)| id).collect();
        let dropped: Vec<u64> = ranked.iter().skip(cap).map(|&(id, _)| id).collect();

        if let Some(node) = inner.nodes.get_mut(&node_id) {
            node.connections[layer] = keep;
        }
        for nid in dropped {
            if let Some(other) = inner.nodes.get_mut(&nid) {
                other.connections[layer].retain(|&x| x != node_id);
            }
        }
    }

    /// Remove a node and every edge referencing it, promoting a new entry
    /// point if needed. Used when a key is re-indexed.
    fn remove_locked(inner: &mut Inner, id: u64) {
        let Some(node) = inner.nodes.remove(&id) else {
            return;
        };
        inner.key_to_id.remove(&node.key);

        for layer in 0..=node.max_layer {
            for &nid in &node.connections[layer] {
                if let Some(other) = inner.nodes.get_mut(&nid) {
                    other.connections[layer].retain(|&x| x != id);
                }
            }
        }

        if inner.entry_point == Some(id) {
            let mut top = 0;
            let mut new_ep = None;
            for (&nid, n) in inner.nodes.iter() {
                if new_ep.is_none() || n.max_layer > top {
                    top = n.max_layer;
                    new_ep = Some(nid);
                }
            }
            inner.entry_point = new_ep;
            inner.top_layer = top;
        }
    }

    /// Distance in similarity space: `1 - cosine`, optionally over a
    /// Matryoshka prefix.
    fn distance(a: &Vector, b: &Vector, prefix_dim: Option<usize>) -> f32 {
        let sim = match prefix_dim {
            Some(dim) => a.prefix_similarity(b, dim),
            None => a.cosine_similarity(b),
        };
        sim.map(|s| 1.0 - s).unwrap_or(f32::MAX)
    }

    /// Best-first sweep of one layer, filling `out` with up to `ef`
    /// candidates as `(id, distance)` pairs. When `prefix_dim` is set,
    /// distances are computed over that Matryoshka prefix. `out` is a
    /// pooled scratch buffer; it is cleared on entry so capacity carries
    /// over between sweeps.
    fn search_layer(
        inner: &Inner,
        entry: u64,
        query: &Vector,
        ef: usize,
        layer: usize,
        prefix_dim: Option<usize>,
        out: &mut Vec<(u64, f32)>,
    ) {
        out.clear();
        let Some(entry_node) = inner.nodes.get(&entry) else {
            return;
        };

        let mut visited = HashSet::new();
        let mut candidates = BinaryHeap::new(); // min-heap by distance
        let mut best: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new(); // max-heap

        let entry_dist = Self::distance(&entry_node.vector, query, prefix_dim);
        visited.insert(entry);
        candidates.push(Candidate {
            distance: entry_dist,
            id: entry,
        });
        best.push(std::cmp::Reverse(Candidate {
            distance: entry_dist,
            id: entry,
        }));

        while let Some(curr) = candidates.pop() {
            let worst_best = best.peek().map(|c| c.0.distance).unwrap_or(f32::MAX);
            if curr.distance > worst_best && best.len() >= ef {
                break;
            }

            let Some(node) = inner.nodes.get(&curr.id) else {
                continue;
            };
            if layer > node.max_layer {
                continue;
            }

            for &nid in &node.connections[layer] {
                if !visited.insert(nid) {
                    continue;
                }
                let Some(neighbor) = inner.nodes.get(&nid) else {
                    continue;
                };
                let dist = Self::distance(&neighbor.vector, query, prefix_dim);
                let worst_best = best.peek().map(|c| c.0.distance).unwrap_or(f32::MAX);

                if dist < worst_best || best.len() < ef {
                    candidates.push(Candidate { distance: dist, id: nid });
                    best.push(std::cmp::Reverse(Candidate { distance: dist, id: nid }));
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        out.extend(best.into_iter().map(|c| (c.0.id, c.0.distance)));
    }

    /// Search for the `k` nearest neighbors of `query`.
    ///
    /// Greedy-descends every layer above 0 with ef=1, then sweeps layer 0
    /// with `ef` (clamped to at least `k`). With a Matryoshka ladder
    /// configured, the layer-0 sweep scores on the coarsest prefix and
    /// the surviving candidates are re-ranked at full precision.
    ///
    /// An empty index returns an empty vec; a dimension mismatch is an
    /// error.
    pub fn search(&self, query: &Vector, k: usize, ef: usize) -> AgramaResult<Vec<SemanticMatch>> {
        self.check_dims(query)?;
        let inner = self.inner.read().unwrap();
        let Some(ep) = inner.entry_point else {
            return Ok(Vec::new());
        };

        let ef = ef.max(k).max(1);
        let ep_layer = inner.nodes[&ep].max_layer;
        let mut cur = ep;
        let mut cur_dist = Self::distance(&inner.nodes[&ep].vector, query, None);
        let (mut scratch, leased) = self.lease_scratch();

        for lc in (1..=ep_layer).rev() {
            Self::search_layer(&inner, cur, query, 1, lc, None, &mut scratch);
            let (best, best_dist) = scratch
                .iter()
                .copied()
                .min_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                })
                .unwrap_or((cur, cur_dist));
            if best_dist < cur_dist {
                cur = best;
                cur_dist = best_dist;
            }
        }

        let prefilter = self.config.prefilter_dim();
        Self::search_layer(&inner, cur, query, ef, 0, prefilter, &mut scratch);

        // Re-rank at full precision, in place (a no-op when prefiltering
        // is off)
        if prefilter.is_some() {
            for (id, dist) in scratch.iter_mut() {
                *dist = Self::distance(&inner.nodes[id].vector, query, None);
            }
        }
        scratch.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let results = scratch
            .iter()
            .take(k)
            .map(|&(id, dist)| SemanticMatch {
                doc_key: inner.nodes[&id].key.clone(),
                score: 1.0 - dist,
            })
            .collect();
        drop(inner);

        self.release_scratch(scratch, leased);
        Ok(results)
    }

    /// Full-precision cosine similarity between an indexed document and
    /// `query`, or `None` if the key is not indexed.
    ///
    /// Used by the hybrid engine to fill in missing semantic sub-scores
    /// for candidates surfaced by the other indices.
    pub fn similarity_to(&self, key: &str, query: &Vector) -> Option<f32> {
        let inner = self.inner.read().unwrap();
        let id = inner.key_to_id.get(key)?;
        inner.nodes[id].vector.cosine_similarity(query)
    }

    /// Walk every node and edge, checking the structural invariants.
    ///
    /// Used by the test suite; returns the first violation found.
    pub fn validate_invariants(&self) -> Result<(), String> {
        let inner = self.inner.read().unwrap();

        for (&id, node) in &inner.nodes {
            if node.connections.len() != node.max_layer + 1 {
                return Err(format!(
                    "node {id} has {} connection lists for max_layer {}",
                    node.connections.len(),
                    node.max_layer
                ));
            }
            for (layer, neighbors) in node.connections.iter().enumerate() {
                let cap = self.config.cap(layer);
                if neighbors.len() > cap {
                    return Err(format!(
                        "node {id} has degree {} at layer {layer} (cap {cap})",
                        neighbors.len()
                    ));
                }
                for &nid in neighbors {
                    let Some(other) = inner.nodes.get(&nid) else {
                        return Err(format!("node {id} links to missing node {nid}"));
                    };
                    if layer > other.max_layer || !other.connections[layer].contains(&id) {
                        return Err(format!(
                            "edge {id}->{nid} at layer {layer} is not bidirectional"
                        ));
                    }
                }
            }
        }

        // Every node reachable from the entry point via layer-0 edges
        if let Some(ep) = inner.entry_point {
            let mut seen = HashSet::new();
            let mut stack = vec![ep];
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(node) = inner.nodes.get(&id) {
                    stack.extend(node.connections[0].iter().copied());
                }
            }
            if seen.len() != inner.nodes.len() {
                return Err(format!(
                    "{} of {} nodes reachable from entry point",
                    seen.len(),
                    inner.nodes.len()
                ));
            }
        } else if !inner.nodes.is_empty() {
            return Err("non-empty index with no entry point".into());
        }

        Ok(())
    }
}
