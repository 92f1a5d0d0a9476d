//! Fixed response texts and product cards.
//!
//! Every currency figure shown here comes from [`OrderRecord::total`] or
//! the catalog, never from model output.

use serde::{Deserialize, Serialize};

use fasha_core::money::format_rupiah;
use fasha_core::types::{CatalogEntry, Tier};

use crate::extractor::{MissingField, OrderRecord, OrderStatus};

// =============================================================================
// ProductCard
// =============================================================================

/// A catalog hit as shown alongside a search reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    pub product_id: String,
    pub name: String,
    pub price: Option<u64>,
    pub price_display: Option<String>,
    pub tier: Tier,
    /// Store page for premium products, partner link otherwise.
    pub link: Option<String>,
    pub image_url: Option<String>,
}

impl ProductCard {
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let link = if entry.tier.is_premium() {
            entry.product_link.clone()
        } else {
            entry.affiliate_link.clone()
        };
        Self {
            product_id: entry.product_id.clone(),
            name: entry.name.clone(),
            price: entry.price,
            price_display: entry.price.map(format_rupiah),
            tier: entry.tier,
            link,
            image_url: entry.image_url.clone(),
        }
    }
}

// =============================================================================
// Texts
// =============================================================================

pub fn greeting() -> &'static str {
    "Hi! I'm Fasha, your fashion assistant. Tell me what you're looking for, \
     ask for outfit advice, or order a product by name."
}

pub fn ask_product() -> String {
    "Sure! Which product would you like?\n\
     Please tell me the **product name** so I get it right."
        .to_string()
}

pub fn affiliate(item: &str, link: Option<&str>) -> String {
    let link = link
        .filter(|l| !l.trim().is_empty())
        .unwrap_or("Sorry, the partner link is not available right now.");
    format!(
        "Sure!\n\n\
         **{item}** is available through our partner store.\n\n\
         🔗 {link}\n\n\
         I can also help you:\n\
         - find similar alternatives\n\
         - compare a few options\n\
         - pick a safe size or fit"
    )
}

pub fn ask_confirmation(item: &str) -> String {
    format!(
        "Sure!\n\n\
         Would you like to order **{item}**?\n\n\
         You can continue either way:\n\
         1. Type: **I order ...** with the quantity and size\n\
         2. Or send your order details right away"
    )
}

/// Ask for the fields still blocking completion.
///
/// A missing price is never shown as a zero total; the shopper is asked
/// to clarify the product instead.
pub fn ask_missing(record: &OrderRecord, missing: &[MissingField]) -> String {
    let mut out = String::new();
    if record.status == OrderStatus::Revision {
        out.push_str("Got it, I've updated your order.\n\n");
    } else {
        out.push_str("Sure!\n\n");
    }

    if missing.contains(&MissingField::Price) {
        out.push_str(&format!(
            "I couldn't confirm the price of **{}** in our catalog. \
             Could you tell me the exact product name?\n\n",
            record.item_description
        ));
    }

    let contact: Vec<&str> = missing
        .iter()
        .filter(|f| **f != MissingField::Price)
        .map(|f| f.label())
        .collect();
    if !contact.is_empty() {
        out.push_str(&format!(
            "Before we continue to payment, please send your {}.\n\n",
            contact.join(" and ")
        ));
    }

    out.push_str("📦 ORDER DETAILS\n");
    out.push_str(&format!("Product: {}\n", record.item_description));
    out.push_str(&format!("Quantity: {}\n", record.quantity));
    out.push_str(&format!("Size: {}\n\n", record.size.as_deref().unwrap_or("-")));
    out.push_str("👤 RECIPIENT\n");
    out.push_str(&format!("Full name: {}\n", dash_if_empty(&record.customer_name)));
    out.push_str(&format!("Address: {}", dash_if_empty(&record.shipping_address)));
    out
}

fn dash_if_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

pub fn order_summary(record: &OrderRecord) -> String {
    let mut out = format!(
        "Thank you, {}!\n\n\
         Your order has been received.\n\n\
         🧾 Order summary:\n\
         - Item    : {}\n\
         - Quantity: {}\n",
        record.customer_name, record.item_description, record.quantity
    );
    if let Some(size) = &record.size {
        out.push_str(&format!("- Size    : {}\n", size));
    }
    out.push_str(&format!(
        "- Price   : {} each\n\
         - Total   : {}\n\
         - Ship to : {}\n\n\
         💳 Please transfer the total above, then send the transfer receipt in this chat.\n\
         Your order ships once the payment is confirmed 📦",
        format_rupiah(record.unit_price),
        format_rupiah(record.total()),
        record.shipping_address
    ));
    out
}

pub fn payment_ack() -> String {
    "Thank you!\n\n\
     Your payment confirmation has been received.\n\
     We'll process and ship your order shortly 📦\n\n\
     Let me know if there's anything else I can help with."
        .to_string()
}

pub fn payment_reminder(record: Option<&OrderRecord>) -> String {
    let amount = record
        .map(|r| format!(" of {}", format_rupiah(r.total())))
        .unwrap_or_default();
    format!(
        "We're still waiting for your payment{amount}.\n\n\
         💳 Please transfer the order total.\n\
         Once done, send the transfer receipt in this chat."
    )
}

pub fn no_products() -> String {
    "I couldn't find a matching product in our catalog. \
     Could you describe what you're looking for in a bit more detail?"
        .to_string()
}

pub fn soft_failure() -> String {
    "Sorry, something went wrong on our side. Please try again in a moment.".to_string()
}
