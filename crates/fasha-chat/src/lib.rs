//! Fasha Chat crate - the dialogue core of the shopping assistant.
//!
//! Routes each shopper message into chat, product search or ordering,
//! drives the multi-turn order workflow (confirmation, data collection,
//! payment), reconciles extracted order data against the catalog, and
//! appends completed orders to the ledger. Session state is kept in a
//! keyed store with one writer per session.

pub mod classifier;
pub mod error;
pub mod extractor;
pub mod keywords;
pub mod llm;
pub mod orchestrator;
pub mod pricing;
pub mod prompts;
pub mod response;
pub mod session;

pub use classifier::{
    Intent, IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier, SearchMode,
};
pub use error::ChatError;
pub use extractor::{ExtractedOrder, LlmOrderExtractor, OrderExtractor, OrderRecord, OrderStatus};
pub use keywords::{KeywordPolicy, KeywordSet};
pub use llm::{HttpLanguageModel, LanguageModel, MockLanguageModel};
pub use orchestrator::{Collaborators, DialogueEngine, TurnReply};
pub use pricing::parse_price;
pub use response::ProductCard;
pub use session::{DialogueState, Role, Session, SessionSnapshot, SessionStore, Turn};
