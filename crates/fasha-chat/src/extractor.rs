//! Order extraction and reconciliation.
//!
//! The extractor turns the latest message plus history into a partial
//! order. Its output is advisory: the price is backfilled from the
//! catalog, the quantity is clamped to at least one, the total is always
//! computed here, and completeness is decided by field presence.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use fasha_core::money::format_rupiah;
use fasha_core::types::{CatalogEntry, NewLedgerEntry};

use crate::error::ChatError;
use crate::llm::{extract_json, LanguageModel};
use crate::pricing::parse_price;
use crate::prompts::{self, EXTRACTION_PROMPT};

// =============================================================================
// Types
// =============================================================================

/// Extractor-reported order status. Only a phrasing hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Incomplete,
    Revision,
    Complete,
}

impl OrderStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "COMPLETE" => OrderStatus::Complete,
            "REVISION" => OrderStatus::Revision,
            _ => OrderStatus::Incomplete,
        }
    }
}

/// Raw, possibly partial extractor output. Absent fields are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedOrder {
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub shipping_address: Option<String>,
    pub item_description: Option<String>,
    pub size: Option<String>,
    pub quantity: Option<u32>,
    pub unit_price: Option<u64>,
}

impl ExtractedOrder {
    /// Parse model output leniently.
    ///
    /// Unparseable output degrades to the default (all fields absent,
    /// `INCOMPLETE`) instead of failing.
    pub fn from_model_output(text: &str) -> Self {
        let Some(json) = extract_json(text) else {
            warn!("Extractor output has no JSON object, using defaults");
            return Self::default();
        };
        let value: Value = match serde_json::from_str(json) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Extractor output is malformed, using defaults");
                return Self::default();
            }
        };

        Self {
            status: string_field(&value, &["status"])
                .map(|s| OrderStatus::from_label(&s))
                .unwrap_or_default(),
            customer_name: string_field(&value, &["name", "nama", "customer_name"]),
            shipping_address: string_field(&value, &["address", "alamat", "shipping_address"]),
            item_description: string_field(&value, &["item", "item_description", "product"]),
            size: string_field(&value, &["size", "ukuran"]),
            quantity: number_field(&value, &["qty", "quantity", "jumlah"])
                .and_then(|q| u32::try_from(q).ok())
                .filter(|q| *q >= 1),
            unit_price: number_field(&value, &["unit_price", "price", "harga"]).filter(|p| *p > 0),
        }
    }

    /// True when this message supplied a name or a shipping address.
    pub fn has_contact_details(&self) -> bool {
        [&self.customer_name, &self.shipping_address]
            .into_iter()
            .flatten()
            .any(|field| !field.trim().is_empty())
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let raw = match value.get(*key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if raw.is_empty() || raw == "-" || raw.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(raw)
        }
    })
}

/// Integer from a JSON number or from the digits of a string
/// ("Rp 150.000" -> 150000). Fractional numbers are truncated.
fn number_field(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    })
}

/// Fields that block completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingField {
    Name,
    Address,
    Price,
}

impl MissingField {
    pub fn label(self) -> &'static str {
        match self {
            MissingField::Name => "full name",
            MissingField::Address => "shipping address",
            MissingField::Price => "price",
        }
    }
}

/// The pending order accumulated across turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub customer_name: String,
    pub shipping_address: String,
    pub item_description: String,
    pub size: Option<String>,
    /// Always at least 1.
    pub quantity: u32,
    /// Whole rupiah; 0 means unknown.
    pub unit_price: u64,
    pub status: OrderStatus,
}

impl Default for OrderRecord {
    fn default() -> Self {
        Self {
            customer_name: String::new(),
            shipping_address: String::new(),
            item_description: String::new(),
            size: None,
            quantity: 1,
            unit_price: 0,
            status: OrderStatus::Incomplete,
        }
    }
}

impl OrderRecord {
    /// Fold extractor output into this record. Present fields overwrite;
    /// absent fields keep what earlier turns collected. Switching to a
    /// different item drops the size and price tied to the old one.
    pub fn merge(&mut self, extracted: &ExtractedOrder) {
        if let Some(item) = &extracted.item_description {
            if !self.item_description.is_empty()
                && !self.item_description.eq_ignore_ascii_case(item)
            {
                self.size = None;
                self.unit_price = 0;
            }
            self.item_description = item.clone();
        }
        if let Some(name) = &extracted.customer_name {
            self.customer_name = name.clone();
        }
        if let Some(address) = &extracted.shipping_address {
            self.shipping_address = address.clone();
        }
        if let Some(size) = &extracted.size {
            self.size = Some(size.clone());
        }
        if let Some(quantity) = extracted.quantity {
            self.quantity = quantity.max(1);
        }
        if let Some(price) = extracted.unit_price {
            self.unit_price = price;
        }
        self.quantity = self.quantity.max(1);
        self.status = extracted.status;
    }

    /// True when the item text is too short to look up.
    pub fn item_unresolved(&self, min_chars: usize) -> bool {
        self.item_description.trim().chars().count() < min_chars
    }

    /// `quantity * unit_price`, computed here and nowhere else.
    pub fn total(&self) -> u64 {
        u64::from(self.quantity).saturating_mul(self.unit_price)
    }

    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self.customer_name.trim().is_empty() {
            missing.push(MissingField::Name);
        }
        if self.shipping_address.trim().is_empty() {
            missing.push(MissingField::Address);
        }
        if self.unit_price == 0 {
            missing.push(MissingField::Price);
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Item and quantity as written to the ledger,
    /// e.g. "Classic Hoodie (Qty 2), Size M".
    pub fn item_line(&self) -> String {
        let mut line = format!("{} (Qty {})", self.item_description, self.quantity);
        if let Some(size) = &self.size {
            line.push_str(&format!(", Size {}", size));
        }
        line
    }

    /// Ledger row for a complete order.
    pub fn to_ledger_entry(&self) -> NewLedgerEntry {
        let total = self.total();
        NewLedgerEntry {
            customer_name: self.customer_name.clone(),
            item_line: self.item_line(),
            shipping_address: self.shipping_address.clone(),
            total_amount: total,
            total_display: format_rupiah(total),
        }
    }
}

/// Reconcile a merged record against the top catalog hit.
///
/// A zero price is backfilled from the hit's text. The status is then
/// overridden by field presence: `COMPLETE` exactly when name, address and
/// price are all present. A `REVISION` hint survives only while incomplete.
pub fn reconcile(record: &mut OrderRecord, entry: Option<&CatalogEntry>) {
    if record.unit_price == 0 {
        if let Some(price) = entry.and_then(|e| parse_price(&e.text)) {
            debug!(item = %record.item_description, price, "Unit price backfilled from catalog");
            record.unit_price = price;
        }
    }

    if record.is_complete() {
        record.status = OrderStatus::Complete;
    } else if record.status == OrderStatus::Complete {
        record.status = OrderStatus::Incomplete;
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Structured order extraction from conversation text.
#[async_trait]
pub trait OrderExtractor: Send + Sync {
    /// Errors mean the backend was unreachable; malformed output is not an
    /// error and degrades to an empty extraction.
    async fn extract(&self, message: &str, history: &str) -> Result<ExtractedOrder, ChatError>;
}

/// Extractor backed by the language model.
pub struct LlmOrderExtractor {
    model: Arc<dyn LanguageModel>,
}

impl LlmOrderExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl OrderExtractor for LlmOrderExtractor {
    async fn extract(&self, message: &str, history: &str) -> Result<ExtractedOrder, ChatError> {
        let prompt =
            prompts::render(EXTRACTION_PROMPT, &[("history", history), ("message", message)]);
        let output = self.model.complete(&prompt).await?;
        Ok(ExtractedOrder::from_model_output(&output))
    }
}
