// =====
// TESTS: 12
// =====
//
// Streaming lifecycle integration tests.
// Send, stream, commit per frame, finalize.

use pretty_assertions::assert_eq;
use tabchat::agent::wire::ChunkEvent;
use tabchat::chat::{FinalizeOutcome, Handled, Role, SessionStatus};
use tabchat::error::ChatError;
use tabchat::tokenizer::{HeuristicTokenizer, Tokenizer};

use crate::helpers::{complete_exchange, stream_chunks, test_controller};

#[tokio::test]
async fn hi_on_empty_tab_finalizes_with_full_content() {
    let (mut c, h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    assert_eq!(stream, "stream-1");

    stream_chunks(&mut c, &stream, &["Hel", "lo", " th"]).await;
    let handled = c
        .handle_event(ChunkEvent::done(&stream, Some("Hello there".to_owned())))
        .await
        .expect("done");
    assert!(matches!(
        handled,
        Handled::Finalized(FinalizeOutcome::Finalized { status: SessionStatus::Completed, .. })
    ));

    let turns = c.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!((turns[0].role, turns[0].content.as_str()), (Role::User, "Hi"));
    assert_eq!((turns[1].role, turns[1].content.as_str()), (Role::Assistant, "Hello there"));
    assert!(!turns[1].is_streaming);
    assert_eq!(turns[1].output_tokens, HeuristicTokenizer.estimate_tokens("Hello there"));
    assert_eq!(turns[1].input_tokens, 1);
    assert!((turns[1].cost - 4.0).abs() < 1e-9);
    assert!(!c.is_processing());

    let saved = h.history.snapshot("tab-1").expect("persisted");
    assert_eq!(saved.turns, turns.to_vec());
    assert_eq!(saved.usage, c.usage());
}

#[tokio::test]
async fn chunks_keep_their_order_when_committed_every_frame() {
    let (mut c, _h) = test_controller();
    complete_exchange(&mut c, "Greet me", &["Hel", "lo, ", "world"]).await;
    assert_eq!(c.turns()[1].content, "Hello, world");
}

#[tokio::test]
async fn chunks_keep_their_order_without_any_frame() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Greet me").await.expect("send");
    for chunk in ["Hel", "lo, ", "world"] {
        c.handle_event(ChunkEvent::delta(&stream, chunk)).await.expect("delta");
    }
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");
    assert_eq!(c.turns()[1].content, "Hello, world");
    assert_eq!(c.turns().iter().filter(|t| t.content == "Hello, world").count(), 1);
}

#[tokio::test]
async fn frame_commits_whole_buffer_once() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Greet me").await.expect("send");
    c.handle_event(ChunkEvent::delta(&stream, "Hel")).await.expect("delta");
    c.handle_event(ChunkEvent::delta(&stream, "lo, ")).await.expect("delta");
    assert_eq!(c.turns()[1].content, "");

    assert!(c.on_frame());
    assert_eq!(c.turns()[1].content, "Hello, ");
    assert!(c.turns()[1].is_streaming);
    assert!(!c.on_frame());
}

#[tokio::test]
async fn duplicate_done_finalizes_once() {
    let (mut c, h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    stream_chunks(&mut c, &stream, &["Hello"]).await;
    let first = c.handle_event(ChunkEvent::done(&stream, None)).await.expect("first done");
    let second = c.handle_event(ChunkEvent::done(&stream, None)).await.expect("second done");

    assert!(matches!(first, Handled::Finalized(FinalizeOutcome::Finalized { .. })));
    assert_eq!(second, Handled::Ignored);
    assert_eq!(c.turns().len(), 2);
    assert_eq!(h.history.snapshot("tab-1").expect("saved").turns.len(), 2);
}

#[tokio::test]
async fn late_delta_after_done_is_dropped() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    stream_chunks(&mut c, &stream, &["Hello"]).await;
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");

    let late = c.handle_event(ChunkEvent::delta(&stream, " again")).await.expect("late");
    assert_eq!(late, Handled::Ignored);
    assert!(!c.on_frame());
    assert_eq!(c.turns()[1].content, "Hello");
}

#[tokio::test]
async fn malformed_event_mid_stream_leaves_content_alone() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    stream_chunks(&mut c, &stream, &["Hel"]).await;

    let malformed = ChunkEvent { stream_id: stream.clone(), ..ChunkEvent::default() };
    let handled = c.handle_event(malformed).await.expect("malformed");
    assert!(matches!(handled, Handled::Malformed(_)));

    stream_chunks(&mut c, &stream, &["lo"]).await;
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");
    assert_eq!(c.turns()[1].content, "Hello");
}

#[tokio::test]
async fn error_chunk_demotes_turn_to_system() {
    let (mut c, h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    stream_chunks(&mut c, &stream, &["partial"]).await;
    let handled = c
        .handle_event(ChunkEvent::error(&stream, "429 Too Many Requests"))
        .await
        .expect("error");
    assert!(matches!(
        handled,
        Handled::Finalized(FinalizeOutcome::Finalized { status: SessionStatus::Errored, .. })
    ));

    let turn = &c.turns()[1];
    assert_eq!(turn.role, Role::System);
    assert!(!turn.is_streaming);
    assert!(turn.content.starts_with("Error:"));
    assert!(turn.content.contains("rate limit"));
    assert_eq!((turn.input_tokens, turn.output_tokens), (0, 0));
    assert_eq!(h.history.snapshot("tab-1").expect("saved").usage.accumulated_cost, 0.0);

    // The tab recovers: a fresh send opens a new stream.
    assert_eq!(c.send("again").await.expect("send"), "stream-2");
}

#[tokio::test]
async fn second_send_while_streaming_is_busy() {
    let (mut c, h) = test_controller();
    c.send("first").await.expect("send");
    assert_eq!(c.send("second").await, Err(ChatError::Busy));
    assert_eq!(c.send("   ").await, Err(ChatError::EmptyMessage));
    assert_eq!(h.transport.requests.borrow().len(), 1);
    assert_eq!(c.turns().len(), 2);
}

#[tokio::test]
async fn empty_placeholder_is_not_visible() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    assert_eq!(c.visible_turns().count(), 1);
    stream_chunks(&mut c, &stream, &["He"]).await;
    assert_eq!(c.visible_turns().count(), 2);
}

#[tokio::test]
async fn producer_model_is_recorded_on_the_turn() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Hi").await.expect("send");
    let mut first = ChunkEvent::delta(&stream, "Hello");
    first.model = Some("reported-model".to_owned());
    c.handle_event(first).await.expect("delta");
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");
    assert_eq!(c.turns()[1].model.as_deref(), Some("reported-model"));
}

#[tokio::test]
async fn request_carries_the_whole_conversation() {
    let (mut c, h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello"]).await;
    c.send("  How are you?  ").await.expect("send");

    let request = h.transport.last_request();
    assert_eq!(request.tab_id, "tab-1");
    assert_eq!(request.model, "test-model");
    let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, ["user", "assistant", "user"]);
    assert_eq!(request.messages[2].content, "How are you?");
    assert_eq!(request.page_content, None);
}
