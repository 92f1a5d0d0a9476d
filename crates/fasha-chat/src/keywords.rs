//! Keyword policy for commitment and payment detection.
//!
//! Matching is case-insensitive substring containment against explicit,
//! configurable phrase sets.

use fasha_core::config::KeywordConfig;

/// A set of lowercase phrases matched by containment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    phrases: Vec<String>,
}

impl KeywordSet {
    /// Build a set from raw phrases. Blank phrases are dropped.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// First phrase contained in `text`, if any.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.phrases
            .iter()
            .find(|p| lowered.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}

/// The phrase sets consulted by the dialogue state machine.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    pub commitment: KeywordSet,
    pub order_detail: KeywordSet,
    pub payment_confirmation: KeywordSet,
}

impl KeywordPolicy {
    pub fn from_config(config: &KeywordConfig) -> Self {
        Self {
            commitment: KeywordSet::new(&config.commitment),
            order_detail: KeywordSet::new(&config.order_detail),
            payment_confirmation: KeywordSet::new(&config.payment_confirmation),
        }
    }

    /// A message commits to buying if it contains a commitment phrase or
    /// an order-detail phrase.
    pub fn is_commitment(&self, text: &str) -> bool {
        self.commitment.matches(text) || self.order_detail.matches(text)
    }

    pub fn is_payment_confirmation(&self, text: &str) -> bool {
        self.payment_confirmation.matches(text)
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::from_config(&KeywordConfig::default())
    }
}
