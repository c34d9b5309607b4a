//! BM25 lexical index.
//!
//! A classic inverted index: term → postings with term frequencies, plus
//! a document-length table for BM25 normalization. Tokenization is
//! identical at index and query time: Unicode-aware alphanumeric runs,
//! lowercased, with an optional stop-word table.
//!
//! Scoring uses standard BM25 with tunable `k1` (term-frequency
//! saturation, default 1.2) and `b` (length normalization, default 0.75).

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// BM25 parameters and the optional stop-word table.
#[derive(Debug, Clone)]
pub struct LexicalConfig {
    /// Term-frequency saturation (default 1.2)
    pub k1: f32,
    /// Length normalization strength, 0..=1 (default 0.75)
    pub b: f32,
    /// Terms excluded at both index and query time
    pub stop_words: HashSet<String>,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            stop_words: HashSet::new(),
        }
    }
}

impl LexicalConfig {
    /// Set k1 and b.
    pub fn params(mut self, k1: f32, b: f32) -> Self {
        self.k1 = k1;
        self.b = b;
        self
    }

    /// Install a stop-word table.
    pub fn stop_words(mut self, words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stop_words = words.into_iter().map(|w| w.into().to_lowercase()).collect();
        self
    }
}

/// A lexical-index hit.
#[derive(Debug, Clone, Serialize)]
pub struct LexicalMatch {
    /// The matched document key
    pub doc_key: String,
    /// BM25 score (always > 0 for a match)
    pub score: f32,
    /// Query terms present in the document
    pub matching_terms: Vec<String>,
}

#[derive(Debug, Default)]
struct InnerLex {
    /// term → (doc_key → term frequency)
    postings: HashMap<String, HashMap<String, u32>>,
    /// doc_key → token count
    doc_lengths: HashMap<String, usize>,
    /// Sum of all document lengths (for the incremental average)
    total_tokens: usize,
}

/// BM25 inverted index over stored documents.
///
/// Same locking discipline as the semantic index: writers exclusive,
/// readers shared.
#[derive(Debug)]
pub struct LexicalIndex {
    config: LexicalConfig,
    inner: RwLock<InnerLex>,
}

impl LexicalIndex {
    /// Create an index with the given configuration.
    pub fn new(config: LexicalConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(InnerLex::default()),
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().doc_lengths.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().doc_lengths.is_empty()
    }

    /// Split text into lowercase alphanumeric tokens, dropping stop words.
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !self.config.stop_words.contains(t))
            .collect()
    }

    /// Index (or re-index) a document.
    ///
    /// A repeated key replaces the previous postings for that key.
    pub fn index(&self, doc_key: impl Into<String>, text: &str) {
        let doc_key = doc_key.into();
        let tokens = self.tokenize(text);

        let mut inner = self.inner.write().unwrap();
        Self::remove_locked(&mut inner, &doc_key);

        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.clone()).or_insert(0) += 1;
        }
        for (term, count) in tf {
            inner
                .postings
                .entry(term)
                .or_default()
                .insert(doc_key.clone(), count);
        }
        inner.total_tokens += tokens.len();
        inner.doc_lengths.insert(doc_key, tokens.len());
    }

    /// Drop a document from the index.
    pub fn remove(&self, doc_key: &str) {
        let mut inner = self.inner.write().unwrap();
        Self::remove_locked(&mut inner, doc_key);
    }

    fn remove_locked(inner: &mut InnerLex, doc_key: &str) {
        let Some(len) = inner.doc_lengths.remove(doc_key) else {
            return;
        };
        inner.total_tokens -= len;
        inner.postings.retain(|_, docs| {
            docs.remove(doc_key);
            !docs.is_empty()
        });
    }

    /// BM25 score of one document against `query`, with the terms it
    /// matched. Returns `None` for unknown documents and 0-score matches.
    ///
    /// Used by the hybrid engine to fill in missing sub-scores for
    /// candidates surfaced by the other indices.
    pub fn score_doc(&self, doc_key: &str, query: &str) -> Option<(f32, Vec<String>)> {
        let terms = self.tokenize(query);
        let mut seen = HashSet::new();
        let terms: Vec<String> = terms.into_iter().filter(|t| seen.insert(t.clone())).collect();

        let inner = self.inner.read().unwrap();
        let doc_len = *inner.doc_lengths.get(doc_key)? as f32;
        let n_docs = inner.doc_lengths.len();
        let avg_len = inner.total_tokens as f32 / n_docs as f32;

        let mut score = 0.0f32;
        let mut matched = Vec::new();
        for term in terms {
            let Some(docs) = inner.postings.get(&term) else {
                continue;
            };
            let Some(&tf) = docs.get(doc_key) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = (1.0 + (n_docs as f32 - df + 0.5) / (df + 0.5)).ln();
            let tf = tf as f32;
            let norm = self.config.k1 * (1.0 - self.config.b + self.config.b * doc_len / avg_len);
            score += idf * (tf * (self.config.k1 + 1.0)) / (tf + norm);
            matched.push(term);
        }

        if matched.is_empty() {
            None
        } else {
            Some((score, matched))
        }
    }

    /// Score documents against `query`, returning up to `k` matches
    /// ordered by descending BM25 score (ties to the lower key).
    pub fn search(&self, query: &str, k: usize) -> Vec<LexicalMatch> {
        let terms = self.tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        // Deduplicate while keeping query order for matching_terms output
        let mut seen = HashSet::new();
        let terms: Vec<String> = terms.into_iter().filter(|t| seen.insert(t.clone())).collect();

        let inner = self.inner.read().unwrap();
        let n_docs = inner.doc_lengths.len();
        if n_docs == 0 {
            return Vec::new();
        }
        let avg_len = inner.total_tokens as f32 / n_docs as f32;

        let mut scores: HashMap<&str, f32> = HashMap::new();
        let mut matched: HashMap<&str, Vec<String>> = HashMap::new();

        for term in &terms {
            let Some(docs) = inner.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = (1.0 + (n_docs as f32 - df + 0.5) / (df + 0.5)).ln();

            for (doc_key, &tf) in docs {
                let doc_len = inner.doc_lengths[doc_key] as f32;
                let tf = tf as f32;
                let norm = self.config.k1 * (1.0 - self.config.b + self.config.b * doc_len / avg_len);
                let contribution = idf * (tf * (self.config.k1 + 1.0)) / (tf + norm);

                *scores.entry(doc_key.as_str()).or_insert(0.0) += contribution;
                matched
                    .entry(doc_key.as_str())
                    .or_default()
                    .push(term.clone());
            }
        }

        let mut results: Vec<LexicalMatch> = scores
            .into_iter()
            .map(|(doc_key, score)| LexicalMatch {
                doc_key: doc_key.to_string(),
                score,
                matching_terms: matched.remove(doc_key).unwrap_or_default(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.doc_key.cmp(&b.doc_key))
        });
        results.truncate(k);
        results
    }
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new(LexicalConfig::default())
    }
}
