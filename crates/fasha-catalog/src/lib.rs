//! Fasha Catalog crate - product embeddings, vector index and catalog lookup.
//!
//! Provides an in-memory cosine-similarity index over product documents,
//! an embedding service trait with an offline token-hashing implementation
//! and an HTTP client for OpenAI-compatible embedding endpoints, and the
//! `CatalogService` seam the dialogue core uses for discovery and for
//! authoritative single-best lookups.

pub mod catalog;
pub mod embedding;
pub mod index;
pub mod product;

pub use catalog::{CatalogService, VectorCatalog};
pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding, HttpEmbeddingService};
pub use index::VectorIndex;
pub use product::{load_products, CatalogProduct};
