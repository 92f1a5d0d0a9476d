//! Dialogue engine: the state machine wiring classifier, extractor,
//! catalog, language model and ledger.
//!
//! A turn runs against a working copy of its session while holding that
//! session's lock. The copy replaces the stored session only when the turn
//! succeeds; any collaborator failure or timeout leaves the session exactly
//! as it was and produces a soft-failure reply.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use fasha_catalog::CatalogService;
use fasha_core::config::{DialogueConfig, FashaConfig};
use fasha_core::types::{CatalogEntry, Tier};
use fasha_storage::OrderLedger;

use crate::classifier::{Intent, IntentClassifier, SearchMode};
use crate::error::ChatError;
use crate::extractor::{reconcile, OrderExtractor};
use crate::keywords::KeywordPolicy;
use crate::llm::LanguageModel;
use crate::prompts::{self, ADVISOR_PROMPT, AFFILIATE_PROMPT, EMPLOYEE_PROMPT, SEARCH_PROMPT};
use crate::response::{self, ProductCard};
use crate::session::{DialogueState, Role, Session, SessionSnapshot, SessionStore};

/// Result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub text: String,
    /// State after the turn.
    pub state: DialogueState,
    /// Product cards for search replies; empty otherwise.
    pub products: Vec<ProductCard>,
}

struct TurnOutcome {
    text: String,
    products: Vec<ProductCard>,
}

impl TurnOutcome {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            products: Vec::new(),
        }
    }
}

/// External services the engine depends on.
pub struct Collaborators {
    pub classifier: Arc<dyn IntentClassifier>,
    pub extractor: Arc<dyn OrderExtractor>,
    pub catalog: Arc<dyn CatalogService>,
    pub model: Arc<dyn LanguageModel>,
    pub ledger: Arc<dyn OrderLedger>,
}

/// The dialogue state machine.
pub struct DialogueEngine {
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn OrderExtractor>,
    catalog: Arc<dyn CatalogService>,
    model: Arc<dyn LanguageModel>,
    ledger: Arc<dyn OrderLedger>,
    keywords: KeywordPolicy,
    sessions: SessionStore,
    dialogue: DialogueConfig,
    search_top_k: usize,
}

impl DialogueEngine {
    pub fn new(collaborators: Collaborators, config: &FashaConfig) -> Self {
        Self {
            classifier: collaborators.classifier,
            extractor: collaborators.extractor,
            catalog: collaborators.catalog,
            model: collaborators.model,
            ledger: collaborators.ledger,
            keywords: KeywordPolicy::from_config(&config.keywords),
            sessions: SessionStore::new(
                config.dialogue.history_turns,
                config.dialogue.session_timeout_minutes,
            ),
            dialogue: config.dialogue.clone(),
            search_top_k: config.catalog.search_top_k.max(1),
        }
    }

    pub fn greeting(&self) -> &'static str {
        response::greeting()
    }

    /// Handle one inbound message for `session_id`.
    ///
    /// Only an empty or over-long message is an error. Every other failure
    /// yields a soft-failure reply with the session left untouched.
    pub async fn handle_turn(&self, session_id: &str, message: &str) -> Result<TurnReply, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.dialogue.max_message_chars {
            return Err(ChatError::MessageTooLong(self.dialogue.max_message_chars));
        }

        let handle = self.sessions.handle(session_id);
        let mut stored = handle.lock().await;
        stored.expire_if_idle(Utc::now(), self.sessions.idle_timeout());

        let mut working = stored.clone();
        match self.run_turn(&mut working, message).await {
            Ok(outcome) => {
                working.push_turn(Role::User, message);
                working.push_turn(Role::Assistant, outcome.text.clone());
                working.touch();
                let state = working.state;
                *stored = working;
                Ok(TurnReply {
                    text: outcome.text,
                    state,
                    products: outcome.products,
                })
            }
            Err(e) => {
                warn!(session = %session_id, state = %stored.state, error = %e, "Turn failed, session unchanged");
                Ok(TurnReply {
                    text: response::soft_failure(),
                    state: stored.state,
                    products: Vec::new(),
                })
            }
        }
    }

    pub async fn session_snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.snapshot(session_id).await
    }

    pub async fn reset_session(&self, session_id: &str) -> bool {
        self.sessions.reset(session_id).await
    }

    pub fn evict_idle(&self) -> usize {
        self.sessions.evict_idle()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    // -------------------------------------------------------------------------
    // Turn logic
    // -------------------------------------------------------------------------

    async fn run_turn(&self, session: &mut Session, message: &str) -> Result<TurnOutcome, ChatError> {
        let prior = session.state;

        if prior == DialogueState::WaitingPayment {
            info!(session = %session.id, intent = Intent::Order.as_str(), state = %prior, forced = true, "Dialogue turn");
            return Ok(self.payment_turn(session, message));
        }

        let forced = prior.is_order_locked();
        let intent = if forced {
            Intent::Order
        } else {
            let history = session.history_text();
            let label = self
                .bounded("intent classification", self.classifier.classify(message, &history))
                .await?;
            Intent::from_label(&label)
        };
        info!(session = %session.id, intent = %intent, state = %prior, forced, "Dialogue turn");

        match intent {
            Intent::Order => self.order_turn(session, message).await,
            Intent::Search => self.search_turn(message).await,
            Intent::Chat => self.chat_turn(message).await,
        }
    }

    fn payment_turn(&self, session: &mut Session, message: &str) -> TurnOutcome {
        if let Some(phrase) = self.keywords.payment_confirmation.first_match(message) {
            info!(session = %session.id, phrase, "Payment confirmation received");
            transition(session, DialogueState::Idle);
            TurnOutcome::text(response::payment_ack())
        } else {
            TurnOutcome::text(response::payment_reminder(session.pending_order.as_ref()))
        }
    }

    async fn order_turn(&self, session: &mut Session, message: &str) -> Result<TurnOutcome, ChatError> {
        let prior = session.state;
        let history = session.history_text();
        let extracted = self
            .bounded("order extraction", self.extractor.extract(message, &history))
            .await?;

        let mut record = session.pending_order.clone().unwrap_or_default();
        record.merge(&extracted);

        if record.item_unresolved(self.dialogue.min_item_chars) {
            session.pending_order = Some(record);
            transition(session, DialogueState::CollectingData);
            return Ok(TurnOutcome::text(response::ask_product()));
        }

        // One top-1 lookup decides the channel and supplies the backfill price.
        let top = self
            .bounded("catalog lookup", self.catalog.retrieve(&record.item_description, 1))
            .await?
            .into_iter()
            .next();

        let entry = match top {
            Some(entry) if entry.tier.is_premium() => entry,
            other => {
                // No match defaults to the affiliate channel.
                let link = other.and_then(|e| e.affiliate_link);
                info!(session = %session.id, item = %record.item_description, "Order routed to affiliate channel");
                return Ok(TurnOutcome::text(response::affiliate(
                    &record.item_description,
                    link.as_deref(),
                )));
            }
        };

        // Details already requested count as commitment; otherwise the
        // shopper must say so or start giving contact details.
        let committed = match prior {
            DialogueState::CollectingData => true,
            DialogueState::AwaitingConfirmation => {
                self.keywords.is_commitment(message) || extracted.has_contact_details()
            }
            _ => self.keywords.is_commitment(message),
        };
        if !committed {
            session.pending_order = Some(record.clone());
            transition(session, DialogueState::AwaitingConfirmation);
            return Ok(TurnOutcome::text(response::ask_confirmation(
                &record.item_description,
            )));
        }

        reconcile(&mut record, Some(&entry));
        let missing = record.missing_fields();
        if !missing.is_empty() {
            let text = response::ask_missing(&record, &missing);
            session.pending_order = Some(record);
            transition(session, DialogueState::CollectingData);
            return Ok(TurnOutcome::text(text));
        }

        // Not wrapped in the turn timeout: an abandoned append can still
        // commit, and the rolled-back session would then order twice.
        let stored = self.ledger.append_order(record.to_ledger_entry()).await?;
        info!(
            session = %session.id,
            ledger_id = %stored.id,
            total = stored.total_amount,
            "Order completed"
        );

        let text = response::order_summary(&record);
        session.pending_order = Some(record);
        transition(session, DialogueState::WaitingPayment);
        Ok(TurnOutcome::text(text))
    }

    async fn search_turn(&self, message: &str) -> Result<TurnOutcome, ChatError> {
        let mode = if self.dialogue.search_mode_routing {
            let label = self
                .bounded("mode classification", self.classifier.classify_mode(message))
                .await?;
            Some(SearchMode::from_label(&label))
        } else {
            None
        };

        if mode == Some(SearchMode::Advisor) {
            return self.chat_turn(message).await;
        }

        let hits: Vec<CatalogEntry> = self
            .bounded("catalog lookup", self.catalog.retrieve(message, self.search_top_k))
            .await?
            .into_iter()
            .filter(|e| match mode {
                Some(SearchMode::Employee) => e.tier.is_premium(),
                Some(SearchMode::Affiliate) => !e.tier.is_premium(),
                _ => true,
            })
            .collect();

        if hits.is_empty() {
            return Ok(TurnOutcome::text(response::no_products()));
        }

        let template = match mode {
            Some(SearchMode::Employee) => EMPLOYEE_PROMPT,
            Some(SearchMode::Affiliate) => AFFILIATE_PROMPT,
            _ => SEARCH_PROMPT,
        };
        let ctx = search_context(&hits);
        let prompt = prompts::render(template, &[("ctx", &ctx), ("question", message)]);
        let text = self.bounded("search reply", self.model.complete(&prompt)).await?;

        Ok(TurnOutcome {
            text,
            products: hits.iter().map(ProductCard::from_entry).collect(),
        })
    }

    async fn chat_turn(&self, message: &str) -> Result<TurnOutcome, ChatError> {
        let prompt = prompts::render(ADVISOR_PROMPT, &[("question", message)]);
        let text = self.bounded("chat reply", self.model.complete(&prompt)).await?;
        Ok(TurnOutcome::text(text))
    }

    /// Await a collaborator call under the per-call timeout.
    async fn bounded<T, E, F>(&self, what: &'static str, call: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ChatError>,
    {
        let secs = self.dialogue.turn_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(ChatError::Timeout(what, secs)),
        }
    }
}

fn transition(session: &mut Session, to: DialogueState) {
    let from = session.state;
    if from != to {
        info!(session = %session.id, from = %from, to = %to, "State transition");
    }
    session.state = to;
    if to == DialogueState::Idle {
        session.pending_order = None;
    }
}

fn search_context(hits: &[CatalogEntry]) -> String {
    hits.iter()
        .map(|e| {
            let mut block = e.text.clone();
            if e.tier == Tier::Affiliate {
                if let Some(link) = &e.affiliate_link {
                    block.push_str(&format!("\nLink: {}", link));
                }
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use fasha_core::error::FashaError;
    use fasha_storage::{Database, MemoryLedger, SqliteLedger};

    use crate::extractor::ExtractedOrder;
    use crate::llm::MockLanguageModel;

    const FULL_ORDER: &str = "I want the Classic Hoodie, size M, 2 pcs, name Dewi, address Jl. Mawar 10";

    // -------------------------------------------------------------------------
    // Doubles
    // -------------------------------------------------------------------------

    /// Returns a fixed label and counts calls.
    struct FixedClassifier {
        label: Mutex<String>,
        mode: String,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(label: &str) -> Self {
            Self {
                label: Mutex::new(label.to_string()),
                mode: "EMPLOYEE".to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        fn set(&self, label: &str) {
            *self.label.lock().unwrap() = label.to_string();
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IntentClassifier for FixedClassifier {
        async fn classify(&self, _text: &str, _context: &str) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.lock().unwrap().clone())
        }

        async fn classify_mode(&self, _text: &str) -> Result<String, ChatError> {
            Ok(self.mode.clone())
        }
    }

    /// Extraction keyed by exact message text; unknown messages extract nothing.
    #[derive(Default)]
    struct ScriptedExtractor {
        script: HashMap<String, ExtractedOrder>,
    }

    impl ScriptedExtractor {
        fn with(mut self, message: &str, extracted: ExtractedOrder) -> Self {
            self.script.insert(message.to_string(), extracted);
            self
        }
    }

    #[async_trait]
    impl OrderExtractor for ScriptedExtractor {
        async fn extract(&self, message: &str, _history: &str) -> Result<ExtractedOrder, ChatError> {
            Ok(self.script.get(message).cloned().unwrap_or_default())
        }
    }

    /// Matches entries whose name occurs in the query, case-insensitively.
    #[derive(Default)]
    struct StaticCatalog {
        entries: Vec<CatalogEntry>,
        delay: Option<Duration>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl CatalogService for StaticCatalog {
        async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<CatalogEntry>, FashaError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let query = query.to_lowercase();
            Ok(self
                .entries
                .iter()
                .filter(|e| query.contains(&e.name.to_lowercase()))
                .take(top_k)
                .cloned()
                .collect())
        }

        fn len(&self) -> usize {
            self.entries.len()
        }
    }

    fn entry(name: &str, tier: Tier, text: &str) -> CatalogEntry {
        CatalogEntry {
            product_id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            text: text.to_string(),
            score: 0.9,
            tier,
            price: crate::pricing::parse_price(text),
            affiliate_link: None,
            product_link: Some(format!("https://store.example/{}", name.to_lowercase())),
            image_url: None,
        }
    }

    fn hoodie() -> CatalogEntry {
        entry(
            "Classic Hoodie",
            Tier::Premium,
            "Nama Produk: Classic Hoodie\nKategori: Tops - Hoodie\nHarga: Rp 150.000",
        )
    }

    fn legging(link: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            affiliate_link: link.map(str::to_string),
            ..entry("Sport Legging", Tier::Affiliate, "Nama Produk: Sport Legging\nHarga: Rp 89.000")
        }
    }

    fn extracted(item: Option<&str>, name: Option<&str>, address: Option<&str>) -> ExtractedOrder {
        ExtractedOrder {
            item_description: item.map(str::to_string),
            customer_name: name.map(str::to_string),
            shipping_address: address.map(str::to_string),
            ..Default::default()
        }
    }

    fn full_order() -> ExtractedOrder {
        ExtractedOrder {
            size: Some("M".to_string()),
            quantity: Some(2),
            ..extracted(Some("Classic Hoodie"), Some("Dewi"), Some("Jl. Mawar 10"))
        }
    }

    struct Harness {
        engine: Arc<DialogueEngine>,
        classifier: Arc<FixedClassifier>,
        catalog: Arc<StaticCatalog>,
        ledger: Arc<MemoryLedger>,
    }

    fn harness_with(
        label: &str,
        extractor: ScriptedExtractor,
        catalog: StaticCatalog,
        config: FashaConfig,
    ) -> Harness {
        let classifier = Arc::new(FixedClassifier::new(label));
        let catalog = Arc::new(catalog);
        let ledger = Arc::new(MemoryLedger::new());
        let model = MockLanguageModel::new("Here is what I found for you.")
            .with_rule("fashion advisor", "Linen breathes better than cotton.");
        let engine = DialogueEngine::new(
            Collaborators {
                classifier: classifier.clone(),
                extractor: Arc::new(extractor),
                catalog: catalog.clone(),
                model: Arc::new(model),
                ledger: ledger.clone(),
            },
            &config,
        );
        Harness {
            engine: Arc::new(engine),
            classifier,
            catalog,
            ledger,
        }
    }

    fn harness(label: &str, extractor: ScriptedExtractor, entries: Vec<CatalogEntry>) -> Harness {
        harness_with(
            label,
            extractor,
            StaticCatalog {
                entries,
                ..Default::default()
            },
            FashaConfig::default(),
        )
    }

    // -------------------------------------------------------------------------
    // Order workflow
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_single_turn_order_reaches_waiting_payment() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(FULL_ORDER, full_order()),
            vec![hoodie()],
        );

        let reply = h.engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert!(reply.text.contains("300.000"));
        assert!(reply.text.contains("transfer"));

        let rows = h.ledger.entries();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_amount, 300_000);
        assert_eq!(rows[0].total_display, "Rp 300.000");
        assert_eq!(rows[0].item_line, "Classic Hoodie (Qty 2), Size M");
        assert_eq!(rows[0].customer_name, "Dewi");
        assert_eq!(h.catalog.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_affiliate_item_never_enters_order_workflow() {
        let msg = "saya pesan Sport Legging, nama Dewi, alamat Jl. Mawar 10";
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(
                msg,
                extracted(Some("Sport Legging"), Some("Dewi"), Some("Jl. Mawar 10")),
            ),
            vec![legging(Some("https://partner.example/legging"))],
        );

        let reply = h.engine.handle_turn("s1", msg).await.unwrap();
        assert_eq!(reply.state, DialogueState::Idle);
        assert!(reply.text.contains("https://partner.example/legging"));
        assert!(h.ledger.entries().is_empty());

        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert!(snap.pending_order.is_none());
    }

    #[tokio::test]
    async fn test_affiliate_without_link_uses_fallback() {
        let msg = "saya pesan Sport Legging";
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(msg, extracted(Some("Sport Legging"), None, None)),
            vec![legging(None)],
        );

        let reply = h.engine.handle_turn("s1", msg).await.unwrap();
        assert!(reply.text.contains("partner link is not available"));
        assert_eq!(reply.state, DialogueState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_item_routes_to_affiliate() {
        let msg = "saya pesan Batik Kebaya";
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(msg, extracted(Some("Batik Kebaya"), None, None)),
            vec![hoodie()],
        );

        let reply = h.engine.handle_turn("s1", msg).await.unwrap();
        assert_eq!(reply.state, DialogueState::Idle);
        assert!(reply.text.contains("Batik Kebaya"));
        assert!(reply.text.contains("partner link is not available"));
        assert!(h.ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_missing_address_collected_on_next_turn() {
        let first = "saya pesan Classic Hoodie 2 pcs, nama Dewi";
        let second = "Jl. Melati No. 5";
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with(
                    first,
                    ExtractedOrder {
                        quantity: Some(2),
                        ..extracted(Some("Classic Hoodie"), Some("Dewi"), None)
                    },
                )
                .with(second, extracted(None, None, Some("Jl. Melati No. 5"))),
            vec![hoodie()],
        );

        let reply = h.engine.handle_turn("s1", first).await.unwrap();
        assert_eq!(reply.state, DialogueState::CollectingData);
        assert!(reply.text.contains("shipping address"));
        assert!(h.ledger.entries().is_empty());

        let reply = h.engine.handle_turn("s1", second).await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert!(reply.text.contains("Rp 300.000"));

        let rows = h.ledger.entries();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shipping_address, "Jl. Melati No. 5");
        assert_eq!(h.classifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_then_details_without_reclassifying() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with("I want the Classic Hoodie", extracted(Some("Classic Hoodie"), None, None))
                .with("Dewi, Jl. Mawar 10", extracted(None, Some("Dewi"), Some("Jl. Mawar 10"))),
            vec![hoodie()],
        );

        let reply = h.engine.handle_turn("s1", "I want the Classic Hoodie").await.unwrap();
        assert_eq!(reply.state, DialogueState::AwaitingConfirmation);
        assert!(reply.text.contains("Would you like to order"));

        // A classifier that now says CHAT must not pull the shopper out.
        h.classifier.set("CHAT");

        let reply = h.engine.handle_turn("s1", "checkout").await.unwrap();
        assert_eq!(reply.state, DialogueState::CollectingData);
        assert!(reply.text.contains("full name and shipping address"));

        let reply = h.engine.handle_turn("s1", "Dewi, Jl. Mawar 10").await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert!(reply.text.contains("Rp 150.000"));
        assert_eq!(h.ledger.entries().len(), 1);
        assert_eq!(h.classifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_question_while_awaiting_confirmation_asks_again() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with("I want the Classic Hoodie", extracted(Some("Classic Hoodie"), None, None)),
            vec![hoodie()],
        );
        h.engine.handle_turn("s1", "I want the Classic Hoodie").await.unwrap();

        for message in ["hmm, bagus nggak bahannya?", "ok"] {
            let reply = h.engine.handle_turn("s1", message).await.unwrap();
            assert_eq!(reply.state, DialogueState::AwaitingConfirmation);
            assert!(reply.text.contains("Would you like to order"));
        }

        let reply = h.engine.handle_turn("s1", "checkout").await.unwrap();
        assert_eq!(reply.state, DialogueState::CollectingData);
        assert!(h.ledger.entries().is_empty());
        assert_eq!(h.classifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_contact_details_while_awaiting_confirmation_complete_order() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with("I want the Classic Hoodie", extracted(Some("Classic Hoodie"), None, None))
                .with("Dewi, Jl. Mawar 10", extracted(None, Some("Dewi"), Some("Jl. Mawar 10"))),
            vec![hoodie()],
        );
        h.engine.handle_turn("s1", "I want the Classic Hoodie").await.unwrap();

        let reply = h.engine.handle_turn("s1", "Dewi, Jl. Mawar 10").await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert!(reply.text.contains("Rp 150.000"));
        assert_eq!(h.ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_item_asks_for_product() {
        let h = harness("ORDER", ScriptedExtractor::default(), vec![hoodie()]);

        let reply = h.engine.handle_turn("s1", "mau pesan dong").await.unwrap();
        assert_eq!(reply.state, DialogueState::CollectingData);
        assert!(reply.text.contains("product name"));
        assert_eq!(h.catalog.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparseable_price_asks_to_clarify() {
        let plain = entry("Classic Hoodie", Tier::Premium, "Nama Produk: Classic Hoodie\nWarna: Black");
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(FULL_ORDER, full_order()),
            vec![plain],
        );

        let reply = h.engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        assert_eq!(reply.state, DialogueState::CollectingData);
        assert!(reply.text.contains("couldn't confirm the price"));
        assert!(!reply.text.contains("Rp 0"));
        assert!(h.ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_switching_to_affiliate_item_keeps_progress() {
        let switch = "actually the Sport Legging";
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with("I want the Classic Hoodie", extracted(Some("Classic Hoodie"), None, None))
                .with(switch, extracted(Some("Sport Legging"), None, None)),
            vec![hoodie(), legging(Some("https://partner.example/legging"))],
        );

        h.engine.handle_turn("s1", "I want the Classic Hoodie").await.unwrap();
        let reply = h.engine.handle_turn("s1", switch).await.unwrap();
        assert_eq!(reply.state, DialogueState::AwaitingConfirmation);
        assert!(reply.text.contains("https://partner.example/legging"));

        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert_eq!(snap.pending_order.unwrap().item_description, "Classic Hoodie");
    }

    // -------------------------------------------------------------------------
    // Payment
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_payment_confirmation_returns_to_idle() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(FULL_ORDER, full_order()),
            vec![hoodie()],
        );
        h.engine.handle_turn("s1", FULL_ORDER).await.unwrap();

        let reply = h.engine.handle_turn("s1", "kapan dikirim?").await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert!(reply.text.contains("Rp 300.000"));

        let reply = h.engine.handle_turn("s1", "sudah transfer ya").await.unwrap();
        assert_eq!(reply.state, DialogueState::Idle);
        assert!(reply.text.contains("payment confirmation has been received"));

        assert_eq!(h.ledger.entries().len(), 1);
        assert_eq!(h.classifier.calls(), 1);
        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert!(snap.pending_order.is_none());
        assert_eq!(snap.history.len(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_turns_write_one_ledger_row() {
        let first = "saya pesan Classic Hoodie, nama Dewi";
        let address = "Jl. Melati No. 5";
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with(first, extracted(Some("Classic Hoodie"), Some("Dewi"), None))
                .with(address, extracted(None, None, Some(address))),
            vec![hoodie()],
        );
        h.engine.handle_turn("s1", first).await.unwrap();

        let (a, b) = tokio::join!(
            h.engine.handle_turn("s1", address),
            h.engine.handle_turn("s1", address)
        );
        let states = [a.unwrap().state, b.unwrap().state];
        assert!(states.iter().all(|s| *s == DialogueState::WaitingPayment));
        assert_eq!(h.ledger.entries().len(), 1);
    }

    // -------------------------------------------------------------------------
    // Failures
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_ledger_failure_leaves_session_unchanged() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default().with(FULL_ORDER, full_order()),
            vec![hoodie()],
        );
        h.ledger.set_writable(false);

        let reply = h.engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        assert_eq!(reply.text, response::soft_failure());
        assert_eq!(reply.state, DialogueState::Idle);

        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert_eq!(snap.state, DialogueState::Idle);
        assert!(snap.history.is_empty());
        assert!(snap.pending_order.is_none());
        assert!(h.ledger.entries().is_empty());

        h.ledger.set_writable(true);
        let reply = h.engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert_eq!(h.ledger.entries().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_ledger_append_is_not_abandoned() {
        let mut config = FashaConfig::default();
        config.dialogue.turn_timeout_secs = 1;
        let db = Arc::new(Database::in_memory().unwrap());
        let ledger = Arc::new(SqliteLedger::new(Arc::clone(&db)));
        let engine = DialogueEngine::new(
            Collaborators {
                classifier: Arc::new(FixedClassifier::new("ORDER")),
                extractor: Arc::new(ScriptedExtractor::default().with(FULL_ORDER, full_order())),
                catalog: Arc::new(StaticCatalog {
                    entries: vec![hoodie()],
                    ..Default::default()
                }),
                model: Arc::new(MockLanguageModel::new("unused")),
                ledger: ledger.clone(),
            },
            &config,
        );

        // Hold the connection past the turn timeout.
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let holder = {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                db.with_conn(|_| {
                    held_tx.send(()).ok();
                    std::thread::sleep(Duration::from_millis(1500));
                    Ok(())
                })
            })
        };
        held_rx.recv().unwrap();

        let reply = engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        holder.join().unwrap().unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert_eq!(ledger.count().await.unwrap(), 1);

        // A retry of the same message cannot place a second order.
        let reply = engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        assert_eq!(reply.state, DialogueState::WaitingPayment);
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_timeout_rolls_back() {
        let mut config = FashaConfig::default();
        config.dialogue.turn_timeout_secs = 1;
        let h = harness_with(
            "ORDER",
            ScriptedExtractor::default().with(FULL_ORDER, full_order()),
            StaticCatalog {
                entries: vec![hoodie()],
                delay: Some(Duration::from_secs(10)),
                ..Default::default()
            },
            config,
        );

        let reply = h.engine.handle_turn("s1", FULL_ORDER).await.unwrap();
        assert_eq!(reply.text, response::soft_failure());
        assert_eq!(reply.state, DialogueState::Idle);
        assert!(h.ledger.entries().is_empty());

        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert!(snap.history.is_empty());
    }

    #[tokio::test]
    async fn test_message_validation() {
        let h = harness("CHAT", ScriptedExtractor::default(), vec![]);
        assert!(matches!(
            h.engine.handle_turn("s1", "   ").await,
            Err(ChatError::EmptyMessage)
        ));

        let long = "a".repeat(2001);
        assert!(matches!(
            h.engine.handle_turn("s1", &long).await,
            Err(ChatError::MessageTooLong(2000))
        ));
        assert_eq!(h.classifier.calls(), 0);
    }

    // -------------------------------------------------------------------------
    // Search and chat
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_search_returns_product_cards() {
        let h = harness(
            "SEARCH",
            ScriptedExtractor::default(),
            vec![hoodie(), legging(Some("https://partner.example/legging"))],
        );

        let reply = h
            .engine
            .handle_turn("s1", "looking for a classic hoodie or a sport legging")
            .await
            .unwrap();
        assert_eq!(reply.state, DialogueState::Idle);
        assert_eq!(reply.text, "Here is what I found for you.");
        assert_eq!(reply.products.len(), 2);
        assert_eq!(reply.products[0].price_display.as_deref(), Some("Rp 150.000"));
        assert_eq!(
            reply.products[1].link.as_deref(),
            Some("https://partner.example/legging")
        );
    }

    #[tokio::test]
    async fn test_search_mode_routing_filters_tier() {
        let mut config = FashaConfig::default();
        config.dialogue.search_mode_routing = true;
        let h = harness_with(
            "SEARCH",
            ScriptedExtractor::default(),
            StaticCatalog {
                entries: vec![hoodie(), legging(None)],
                ..Default::default()
            },
            config,
        );

        let reply = h
            .engine
            .handle_turn("s1", "classic hoodie or sport legging?")
            .await
            .unwrap();
        assert_eq!(reply.products.len(), 1);
        assert_eq!(reply.products[0].name, "Classic Hoodie");
    }

    #[tokio::test]
    async fn test_search_without_hits() {
        let h = harness("SEARCH", ScriptedExtractor::default(), vec![hoodie()]);
        let reply = h.engine.handle_turn("s1", "any swimwear?").await.unwrap();
        assert!(reply.products.is_empty());
        assert!(reply.text.contains("couldn't find a matching product"));
    }

    #[tokio::test]
    async fn test_unknown_label_falls_back_to_chat() {
        let h = harness("BROWSE", ScriptedExtractor::default(), vec![hoodie()]);
        let reply = h
            .engine
            .handle_turn("s1", "what's the difference between linen and cotton?")
            .await
            .unwrap();
        assert_eq!(reply.state, DialogueState::Idle);
        assert!(reply.products.is_empty());
        assert_eq!(h.catalog.lookups.load(Ordering::SeqCst), 0);
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_reset_session() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with("I want the Classic Hoodie", extracted(Some("Classic Hoodie"), None, None)),
            vec![hoodie()],
        );
        h.engine.handle_turn("s1", "I want the Classic Hoodie").await.unwrap();
        assert_eq!(h.engine.active_sessions(), 1);

        assert!(h.engine.reset_session("s1").await);
        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert_eq!(snap.state, DialogueState::Idle);
        assert!(snap.history.is_empty());
        assert!(!h.engine.reset_session("missing").await);
        assert!(h.engine.session_snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_idle_session_expires_before_turn() {
        let h = harness(
            "ORDER",
            ScriptedExtractor::default()
                .with("I want the Classic Hoodie", extracted(Some("Classic Hoodie"), None, None)),
            vec![hoodie()],
        );
        h.engine.handle_turn("s1", "I want the Classic Hoodie").await.unwrap();

        {
            let handle = h.engine.sessions.handle("s1");
            let mut session = handle.lock().await;
            session.last_active = Utc::now() - chrono::Duration::minutes(61);
        }

        h.classifier.set("CHAT");
        let reply = h.engine.handle_turn("s1", "hello again").await.unwrap();
        assert_eq!(reply.state, DialogueState::Idle);
        assert_eq!(h.classifier.calls(), 2);

        let snap = h.engine.session_snapshot("s1").await.unwrap();
        assert_eq!(snap.history.len(), 2);
        assert!(snap.pending_order.is_none());
    }
}
