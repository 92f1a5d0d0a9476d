//! Classification service: intent and search sub-mode labels.
//!
//! Classifiers return raw labels; [`Intent::from_label`] and
//! [`SearchMode::from_label`] normalise them into the closed sets.

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::llm::LanguageModel;
use crate::prompts::{self, INTENT_PROMPT, MODE_PROMPT};

// =============================================================================
// Labels
// =============================================================================

/// Conversational mode of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Search,
    Order,
    Chat,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Search, Intent::Order, Intent::Chat];

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Search => "SEARCH",
            Intent::Order => "ORDER",
            Intent::Chat => "CHAT",
        }
    }

    /// Normalise a classifier label. The earliest label named in the text
    /// wins; anything unrecognised is `Chat`.
    pub fn from_label(label: &str) -> Self {
        earliest_label(label, &Self::ALL, Self::as_str).unwrap_or(Intent::Chat)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-mode of a SEARCH turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    /// Store-stocked (premium) products only.
    Employee,
    /// Partner (non-premium) products only.
    Affiliate,
    /// Advice without catalog context.
    Advisor,
}

impl SearchMode {
    pub const ALL: [SearchMode; 3] = [SearchMode::Employee, SearchMode::Affiliate, SearchMode::Advisor];

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Employee => "EMPLOYEE",
            SearchMode::Affiliate => "AFFILIATE",
            SearchMode::Advisor => "ADVISOR",
        }
    }

    /// Normalise a mode label; unrecognised labels fall back to `Employee`.
    pub fn from_label(label: &str) -> Self {
        earliest_label(label, &Self::ALL, Self::as_str).unwrap_or(SearchMode::Employee)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn earliest_label<T: Copy>(raw: &str, all: &[T], name: fn(T) -> &'static str) -> Option<T> {
    let upper = raw.trim().to_uppercase();
    all.iter()
        .filter_map(|&label| upper.find(name(label)).map(|pos| (pos, label)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, label)| label)
}

// =============================================================================
// Classifier trait
// =============================================================================

/// Single-label text classification. No side effects.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Intent label for `text`; `context` is the recent conversation.
    async fn classify(&self, text: &str, context: &str) -> Result<String, ChatError>;

    /// Search sub-mode label for `text`.
    async fn classify_mode(&self, text: &str) -> Result<String, ChatError>;
}

// =============================================================================
// LlmIntentClassifier
// =============================================================================

/// Classifier backed by the language model.
pub struct LlmIntentClassifier {
    model: Arc<dyn LanguageModel>,
}

impl LlmIntentClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str, context: &str) -> Result<String, ChatError> {
        let prompt = prompts::render(INTENT_PROMPT, &[("history", context), ("message", text)]);
        self.model.complete(&prompt).await
    }

    async fn classify_mode(&self, text: &str) -> Result<String, ChatError> {
        let prompt = prompts::render(MODE_PROMPT, &[("message", text)]);
        self.model.complete(&prompt).await
    }
}

// =============================================================================
// KeywordIntentClassifier
// =============================================================================

struct IntentPatterns {
    order: Vec<Regex>,
    search: Vec<Regex>,
    advisor: Vec<Regex>,
}

static INTENT_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid intent regex"))
            .collect()
    };

    IntentPatterns {
        // Order patterns (checked first so "I want the hoodie size M" beats search)
        order: mk(&[
            r"(?i)\bsaya\s+(?:mau\s+)?(?:pesan|beli|order)\b",
            r"(?i)\bjadi\s+(?:pesan|beli)\b",
            r"(?i)\bcheckout\b",
            r"(?i)\border\s+(?:sekarang|now)\b",
            r"(?i)\bambil\s+yang\b",
            r"(?i)\bi'?(?:ll|\s+will)\s+(?:take|order|buy)\b",
            r"(?i)\bi\s+(?:want\s+to\s+)?order\b",
            r"(?i)\bi\s+want\s+(?:the|this|that)\b",
            r"(?i)\b(?:size|ukuran)\s+[a-z0-9]{1,4}\b",
            r"(?i)\b\d+\s*(?:pcs|buah)\b",
            r"(?i)\b(?:kirim\s+ke|ship\s+to)\b",
        ]),
        // Search patterns
        search: mk(&[
            r"(?i)\b(?:lagi\s+)?cari\b",
            r"(?i)\brekomendasi\b",
            r"(?i)\brecommend",
            r"(?i)\blooking\s+for\b",
            r"(?i)\bsearch\b",
            r"(?i)\bfind\b",
            r"(?i)\bsuggest",
            r"(?i)\bbudget\b",
            r"(?i)\bcocok\s+(?:buat|untuk)\b",
            r"(?i)\bdo\s+you\s+(?:have|sell)\b",
            r"(?i)\bada\s+(?:yang|baju|outfit|produk)\b",
            r"(?i)\bsomething\s+for\b",
        ]),
        // Advice-only phrasing within a search
        advisor: mk(&[
            r"(?i)\btips\b",
            r"(?i)\bhow\s+(?:to|should)\b",
            r"(?i)\bwhat\s+(?:should|kind\s+of)\b",
            r"(?i)\bseperti\s+apa\b",
            r"(?i)\bkriteria",
            r"(?i)\badvice\b",
            r"(?i)\bsaran\b",
        ]),
    }
});

/// Offline rule-based classifier. ORDER beats SEARCH; CHAT is the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn intent_of(&self, text: &str) -> Intent {
        let patterns = &*INTENT_PATTERNS;
        if patterns.order.iter().any(|re| re.is_match(text)) {
            Intent::Order
        } else if patterns.search.iter().any(|re| re.is_match(text)) {
            Intent::Search
        } else {
            Intent::Chat
        }
    }

    pub fn mode_of(&self, text: &str) -> SearchMode {
        if INTENT_PATTERNS.advisor.iter().any(|re| re.is_match(text)) {
            SearchMode::Advisor
        } else {
            SearchMode::Employee
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str, _context: &str) -> Result<String, ChatError> {
        Ok(self.intent_of(text).as_str().to_string())
    }

    async fn classify_mode(&self, text: &str) -> Result<String, ChatError> {
        Ok(self.mode_of(text).as_str().to_string())
    }
}
