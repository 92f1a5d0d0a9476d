//! Product records and their indexed document text.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use fasha_core::error::FashaError;
use fasha_core::money::format_rupiah;
use fasha_core::types::{CatalogEntry, Tier};

/// One product as supplied in the catalog seed file.
///
/// Field aliases accept the store's original Indonesian column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    #[serde(alias = "nama_produk")]
    pub name: String,
    #[serde(default, alias = "kategori")]
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub occasion: String,
    #[serde(alias = "harga")]
    pub price: u64,
    #[serde(default, alias = "deskripsi")]
    pub description: String,
    #[serde(default, alias = "warna_tersedia")]
    pub colors: String,
    pub tier: Tier,
    #[serde(default)]
    pub product_link: Option<String>,
    #[serde(default)]
    pub affiliate_link: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl CatalogProduct {
    /// Text that gets embedded and returned as `CatalogEntry::text`.
    ///
    /// Always carries a `Harga: Rp <amount>` line so the price can be
    /// recovered from the text alone.
    pub fn document_text(&self) -> String {
        let mut lines = vec![format!("Nama Produk: {}", self.name)];
        if !self.category.is_empty() {
            if self.sub_category.is_empty() {
                lines.push(format!("Kategori: {}", self.category));
            } else {
                lines.push(format!("Kategori: {} - {}", self.category, self.sub_category));
            }
        }
        if !self.gender.is_empty() {
            lines.push(format!("Gender: {}", self.gender));
        }
        if !self.occasion.is_empty() {
            lines.push(format!("Occasion: {}", self.occasion));
        }
        lines.push(format!("Harga: {}", format_rupiah(self.price)));
        if !self.description.is_empty() {
            lines.push(format!("Deskripsi: {}", self.description));
        }
        if !self.colors.is_empty() {
            lines.push(format!("Warna: {}", self.colors));
        }
        lines.join("\n")
    }

    /// Build the catalog entry served for this product (score unset).
    pub fn to_entry(&self) -> CatalogEntry {
        CatalogEntry {
            product_id: self.id.clone(),
            name: self.name.clone(),
            text: self.document_text(),
            score: 0.0,
            tier: self.tier,
            price: Some(self.price),
            affiliate_link: non_empty(&self.affiliate_link),
            product_link: non_empty(&self.product_link),
            image_url: non_empty(&self.image_url),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read a JSON array of products from disk.
pub fn load_products(path: &Path) -> Result<Vec<CatalogProduct>, FashaError> {
    let content = std::fs::read_to_string(path)?;
    let products: Vec<CatalogProduct> = serde_json::from_str(&content)?;
    info!(count = products.len(), path = %path.display(), "Catalog products loaded");
    Ok(products)
}
