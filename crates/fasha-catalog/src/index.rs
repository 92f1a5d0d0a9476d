//! In-memory vector index with brute-force cosine similarity search.
//!
//! Catalogs are small (hundreds to a few thousand products), so an O(n)
//! scan per query is fine and keeps ranking exact.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fasha_core::error::FashaError;
use fasha_core::types::CatalogEntry;

#[derive(Debug, Clone)]
struct IndexedEntry {
    embedding: Vec<f32>,
    entry: CatalogEntry,
}

/// In-memory vector index keyed by product id.
///
/// Thread-safe via interior RwLock; clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Arc<RwLock<HashMap<String, IndexedEntry>>>,
}

impl VectorIndex {
    /// Create a new empty vector index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a catalog entry with its document embedding.
    ///
    /// Overwrites any existing entry with the same product id.
    pub fn insert(&self, embedding: Vec<f32>, entry: CatalogEntry) -> Result<(), FashaError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| FashaError::Catalog(format!("Lock poisoned: {}", e)))?;
        entries.insert(entry.product_id.clone(), IndexedEntry { embedding, entry });
        Ok(())
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Each returned entry carries its similarity in `score`. Ties are broken
    /// by product id so results are stable across runs.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<CatalogEntry>, FashaError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| FashaError::Catalog(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<CatalogEntry> = entries
            .values()
            .map(|indexed| {
                let mut entry = indexed.entry.clone();
                entry.score = cosine_similarity(query, &indexed.embedding);
                entry
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), FashaError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| FashaError::Catalog(format!("Lock poisoned: {}", e)))?;
        entries.clear();
        Ok(())
    }

    /// Return the number of products currently indexed.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Return true if the index contains no products.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
