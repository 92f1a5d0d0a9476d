use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Catalog
// =============================================================================

/// Fulfilment tier of a catalog product.
///
/// `premium` products are stocked and shipped by the store itself; every
/// other label is fulfilled by an external partner through an affiliate link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tier {
    /// Internally fulfilled ("employee" channel).
    Premium,
    /// Externally fulfilled ("affiliate" channel).
    Affiliate,
}

impl Tier {
    /// Interpret a raw tier label. Only `premium` (any case) is internal.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("premium") {
            Tier::Premium
        } else {
            Tier::Affiliate
        }
    }

    pub fn is_premium(self) -> bool {
        matches!(self, Tier::Premium)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Premium => "premium",
            Tier::Affiliate => "affiliate",
        }
    }
}

impl From<String> for Tier {
    fn from(label: String) -> Self {
        Tier::from_label(&label)
    }
}

impl From<Tier> for String {
    fn from(tier: Tier) -> Self {
        tier.as_str().to_string()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked hit returned by the catalog lookup service.
///
/// Read-only from the dialogue core's point of view. `text` is the indexed
/// document; the authoritative price is parsed back out of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: String,
    pub name: String,
    /// Display/context text, including a `Harga: Rp ...` price line.
    pub text: String,
    /// Similarity score (higher is closer).
    pub score: f64,
    pub tier: Tier,
    /// Price from the product record, informational only.
    pub price: Option<u64>,
    pub affiliate_link: Option<String>,
    pub product_link: Option<String>,
    pub image_url: Option<String>,
}

// =============================================================================
// Ledger
// =============================================================================

/// Status of a ledger row. Rows are only ever written as `Pending`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    #[default]
    Pending,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerStatus::Pending => "PENDING",
        }
    }
}

/// A completed order ready to be appended to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub customer_name: String,
    /// Item and quantity, e.g. "Classic Hoodie (Qty 2)".
    pub item_line: String,
    pub shipping_address: String,
    /// Core-computed total in whole rupiah.
    pub total_amount: u64,
    /// Localized total, e.g. "Rp 300.000".
    pub total_display: String,
}

/// An immutable ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub item_line: String,
    pub shipping_address: String,
    pub total_amount: u64,
    pub total_display: String,
    pub status: LedgerStatus,
}

impl LedgerEntry {
    /// Stamp a new entry with an id, the current time and `PENDING` status.
    pub fn from_new(entry: NewLedgerEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            customer_name: entry.customer_name,
            item_line: entry.item_line,
            shipping_address: entry.shipping_address,
            total_amount: entry.total_amount,
            total_display: entry.total_display,
            status: LedgerStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_label() {
        assert_eq!(Tier::from_label("premium"), Tier::Premium);
        assert_eq!(Tier::from_label(" PREMIUM "), Tier::Premium);
        assert_eq!(Tier::from_label("affiliate"), Tier::Affiliate);
        assert_eq!(Tier::from_label("basic"), Tier::Affiliate);
        assert_eq!(Tier::from_label(""), Tier::Affiliate);
    }

    #[test]
    fn test_tier_serde_accepts_any_label() {
        let tier: Tier = serde_json::from_str("\"premium\"").unwrap();
        assert!(tier.is_premium());
        let tier: Tier = serde_json::from_str("\"regular\"").unwrap();
        assert_eq!(tier, Tier::Affiliate);
        assert_eq!(serde_json::to_string(&Tier::Premium).unwrap(), "\"premium\"");
    }

    #[test]
    fn test_ledger_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&LedgerStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(LedgerStatus::Pending.as_str(), "PENDING");
    }

    #[test]
    fn test_ledger_entry_from_new_is_pending() {
        let entry = LedgerEntry::from_new(NewLedgerEntry {
            customer_name: "Dewi".to_string(),
            item_line: "Classic Hoodie (Qty 2)".to_string(),
            shipping_address: "Jl. Mawar 10".to_string(),
            total_amount: 300_000,
            total_display: "Rp 300.000".to_string(),
        });
        assert_eq!(entry.status, LedgerStatus::Pending);
        assert_eq!(entry.total_amount, 300_000);
        assert_ne!(entry.id, Uuid::nil());
    }
}
