//! Error types for the dialogue core.

use fasha_core::error::FashaError;

/// Errors from the dialogue engine and its collaborators.
///
/// Only input validation errors escape `DialogueEngine::handle_turn`;
/// everything else is turned into a soft-failure reply.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("extraction error: {0}")]
    Extraction(String),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("{0} timed out after {1}s")]
    Timeout(&'static str, u64),
}

impl ChatError {
    /// True for rejections of the inbound message itself.
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::EmptyMessage | ChatError::MessageTooLong(_))
    }
}

impl From<FashaError> for ChatError {
    fn from(err: FashaError) -> Self {
        match err {
            FashaError::Storage(msg) => ChatError::Ledger(msg),
            other => ChatError::Catalog(other.to_string()),
        }
    }
}
