// =====
// TESTS: 4
// =====
//
// Persistence integration tests.
// Finalized turns reach the history store and come back on restore.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::rc::Rc;
use tabchat::agent::transport::Transport;
use tabchat::agent::wire::ChunkEvent;
use tabchat::chat::{Collaborators, ConversationController, ConversationTurn};
use tabchat::config::ModelConfig;
use tabchat::error::ChatError;
use tabchat::history::{
    AccountingBaseline, FileHistoryStore, HistoryStore, MemoryHistoryStore, TabConversation,
    TabUsage,
};
use tabchat::tokenizer::HeuristicTokenizer;

use crate::helpers::{MockTransport, complete_exchange, harness_with_history, priced_model};

fn controller_with(history: Rc<dyn HistoryStore>) -> ConversationController {
    let collaborators = Collaborators {
        transport: Rc::new(MockTransport::default()) as Rc<dyn Transport>,
        history,
        tokenizer: Rc::new(HeuristicTokenizer),
    };
    ConversationController::new("tab-1", priced_model(), collaborators)
}

#[tokio::test]
async fn file_store_round_trips_a_conversation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Rc<dyn HistoryStore> =
        Rc::new(FileHistoryStore::open(dir.path().join("history")).expect("open"));

    let mut c = controller_with(Rc::clone(&store));
    c.queue_extracted_content("page");
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;

    let mut restored = controller_with(store);
    restored.restore().await.expect("restore");
    assert_eq!(restored.turns(), c.turns());
    assert_eq!(restored.usage(), c.usage());
}

#[tokio::test]
async fn turn_saved_mid_stream_is_frozen_on_restore() {
    let history = Rc::new(MemoryHistoryStore::new());
    let turns = vec![ConversationTurn::user("Hi"), ConversationTurn::placeholder(None)];
    history
        .save_history("tab-1", &turns, &ModelConfig::default(), None)
        .await
        .expect("seed");

    let h = harness_with_history(history);
    let mut c = ConversationController::new("tab-1", priced_model(), h.collaborators);
    c.restore().await.expect("restore");
    assert!(c.turns().iter().all(|t| !t.is_streaming));
    assert!(!c.is_processing());
    c.send("again").await.expect("send");
}

#[tokio::test]
async fn missing_history_restores_empty() {
    let mut c = controller_with(Rc::new(MemoryHistoryStore::new()));
    c.restore().await.expect("restore");
    assert!(c.turns().is_empty());
    assert_eq!(c.usage(), TabUsage::default());
}

struct FailingHistory;

#[async_trait(?Send)]
impl HistoryStore for FailingHistory {
    async fn save_history(
        &self,
        _tab_id: &str,
        _turns: &[ConversationTurn],
        _model: &ModelConfig,
        _baseline: Option<AccountingBaseline>,
    ) -> Result<TabUsage, ChatError> {
        Err(ChatError::History("disk full".to_owned()))
    }

    async fn get_history(&self, _tab_id: &str) -> Result<Option<TabConversation>, ChatError> {
        Ok(None)
    }

    async fn clear_history(&self, _tab_id: &str) -> Result<(), ChatError> {
        Ok(())
    }
}

#[tokio::test]
async fn save_failure_still_freezes_the_turn() {
    let mut c = controller_with(Rc::new(FailingHistory));
    let stream = c.send("Hi").await.expect("send");
    c.handle_event(ChunkEvent::delta(&stream, "Hello there")).await.expect("delta");

    let result = c.handle_event(ChunkEvent::done(&stream, None)).await;
    assert_eq!(result, Err(ChatError::History("disk full".to_owned())));
    assert!(!c.turns()[1].is_streaming);
    assert!(!c.is_processing());
    assert_eq!(c.usage(), TabUsage { accumulated_cost: 4.0, input_tokens: 1, output_tokens: 3 });
}
