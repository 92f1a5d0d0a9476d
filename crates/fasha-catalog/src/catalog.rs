//! Catalog lookup service.
//!
//! `VectorCatalog` embeds product documents into a [`VectorIndex`] at
//! startup and answers similarity queries against it. The dialogue core
//! only sees the [`CatalogService`] trait.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use fasha_core::error::FashaError;
use fasha_core::types::CatalogEntry;

use crate::embedding::DynEmbeddingService;
use crate::index::VectorIndex;
use crate::product::CatalogProduct;

/// Ranked product retrieval.
///
/// Implementations must be safe to call concurrently from many sessions.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Return up to `top_k` entries for `query`, best first.
    ///
    /// An empty result means no product matched; it is not an error.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<CatalogEntry>, FashaError>;

    /// Number of products available for lookup.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embedding-backed catalog over an in-memory index.
pub struct VectorCatalog {
    embedder: Box<dyn DynEmbeddingService>,
    index: VectorIndex,
    min_score: f64,
}

impl VectorCatalog {
    /// Create an empty catalog. Hits scoring at or below `min_score` are
    /// dropped from every result.
    pub fn new(embedder: Box<dyn DynEmbeddingService>, min_score: f64) -> Self {
        Self {
            embedder,
            index: VectorIndex::new(),
            min_score,
        }
    }

    /// Embed and index every product. Returns the number indexed.
    ///
    /// A product whose document fails to embed is skipped with a warning so
    /// one bad record does not block startup.
    pub async fn index_products(&self, products: &[CatalogProduct]) -> Result<usize, FashaError> {
        let mut indexed = 0;
        for product in products {
            let entry = product.to_entry();
            match self.embedder.embed_boxed(&entry.text).await {
                Ok(embedding) => {
                    self.index.insert(embedding, entry)?;
                    indexed += 1;
                }
                Err(e) => {
                    warn!(product_id = %product.id, error = %e, "Skipping product, embedding failed");
                }
            }
        }
        info!(indexed, total = products.len(), "Catalog index built");
        Ok(indexed)
    }
}

#[async_trait]
impl CatalogService for VectorCatalog {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<CatalogEntry>, FashaError> {
        let query = query.trim();
        if query.is_empty() || top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed_boxed(query).await?;
        let hits: Vec<CatalogEntry> = self
            .index
            .search(&embedding, top_k)?
            .into_iter()
            .filter(|hit| hit.score > self.min_score)
            .collect();

        debug!(query, hits = hits.len(), "Catalog lookup");
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
