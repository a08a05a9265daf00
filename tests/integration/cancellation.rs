// =====
// TESTS: 9
// =====
//
// Cancellation integration tests.
// Local cancel, producer-side cancel, and races with natural completion.

use pretty_assertions::assert_eq;
use tabchat::agent::wire::ChunkEvent;
use tabchat::chat::{CANCEL_SUFFIX, FinalizeOutcome, Handled, Role, SessionStatus};
use tabchat::tokenizer::{HeuristicTokenizer, Tokenizer};

use crate::helpers::{stream_chunks, test_controller};

#[tokio::test]
async fn cancel_after_one_chunk_keeps_partial_content() {
    let (mut c, h) = test_controller();
    let stream = c.send("Explain X").await.expect("send");
    stream_chunks(&mut c, &stream, &["Sure, X is"]).await;

    let outcome = c.cancel().await.expect("cancel");
    assert!(matches!(
        outcome,
        FinalizeOutcome::Finalized { status: SessionStatus::Cancelled, .. }
    ));

    let turn = &c.turns()[1];
    assert_eq!(turn.content, "Sure, X is\n\n_Stream cancelled by user._");
    assert_eq!(turn.role, Role::Assistant);
    assert!(!turn.is_streaming);
    assert_eq!(turn.output_tokens, HeuristicTokenizer.estimate_tokens(&turn.content));
    assert_eq!(*h.transport.cancels.borrow(), ["stream-1"]);
    assert!(!c.is_processing());
    assert!(!c.is_canceling());
}

#[tokio::test]
async fn done_arriving_after_cancel_is_dropped() {
    let (mut c, h) = test_controller();
    let stream = c.send("Explain X").await.expect("send");
    stream_chunks(&mut c, &stream, &["Sure"]).await;
    c.cancel().await.expect("cancel");

    let late = c
        .handle_event(ChunkEvent::done(&stream, Some("Sure, the whole answer".to_owned())))
        .await
        .expect("late done");
    assert_eq!(late, Handled::Ignored);
    assert_eq!(c.turns().len(), 2);
    assert_eq!(c.turns()[1].content, format!("Sure{CANCEL_SUFFIX}"));
    assert_eq!(h.history.snapshot("tab-1").expect("saved").turns, c.turns().to_vec());
}

#[tokio::test]
async fn cancel_after_done_is_a_no_op() {
    let (mut c, h) = test_controller();
    let stream = c.send("Explain X").await.expect("send");
    stream_chunks(&mut c, &stream, &["Done."]).await;
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");

    assert_eq!(c.cancel().await.expect("cancel"), FinalizeOutcome::Skipped);
    assert!(h.transport.cancels.borrow().is_empty());
    assert_eq!(c.turns()[1].content, "Done.");
}

#[tokio::test]
async fn failed_cancel_request_still_finalizes_locally() {
    let (mut c, h) = test_controller();
    h.transport.fail_cancel.set(true);
    let stream = c.send("Explain X").await.expect("send");
    stream_chunks(&mut c, &stream, &["Sure"]).await;

    let outcome = c.cancel().await.expect("cancel");
    assert!(matches!(outcome, FinalizeOutcome::Finalized { .. }));
    assert_eq!(h.transport.cancels.borrow().len(), 1);
    assert!(!c.turns()[1].is_streaming);
    assert_eq!(c.send("next").await.expect("send"), "stream-2");
}

#[tokio::test]
async fn cancel_before_first_chunk_freezes_suffix_only() {
    let (mut c, _h) = test_controller();
    c.send("Explain X").await.expect("send");
    c.cancel().await.expect("cancel");
    assert_eq!(c.turns()[1].content, CANCEL_SUFFIX);
    assert!(!c.turns()[1].is_streaming);
}

#[tokio::test]
async fn cancel_uses_uncommitted_buffer_and_drops_pending_commit() {
    let (mut c, _h) = test_controller();
    let stream = c.send("Explain X").await.expect("send");
    c.handle_event(ChunkEvent::delta(&stream, "not yet drawn")).await.expect("delta");
    assert_eq!(c.turns()[1].content, "");

    c.cancel().await.expect("cancel");
    assert!(!c.on_frame());
    assert_eq!(c.turns()[1].content, format!("not yet drawn{CANCEL_SUFFIX}"));
}

#[tokio::test]
async fn producer_side_cancel_prefers_its_full_content() {
    let (mut c, h) = test_controller();
    let stream = c.send("Explain X").await.expect("send");
    stream_chunks(&mut c, &stream, &["Sur"]).await;
    let handled = c
        .handle_event(ChunkEvent::cancelled(&stream, Some("Sure, X".to_owned())))
        .await
        .expect("cancelled");
    assert!(matches!(
        handled,
        Handled::Finalized(FinalizeOutcome::Finalized { status: SessionStatus::Cancelled, .. })
    ));
    assert_eq!(c.turns()[1].content, format!("Sure, X{CANCEL_SUFFIX}"));
    assert!(h.transport.cancels.borrow().is_empty());
}

#[tokio::test]
async fn cancel_when_idle_is_skipped() {
    let (mut c, h) = test_controller();
    assert_eq!(c.cancel().await.expect("cancel"), FinalizeOutcome::Skipped);
    assert!(h.transport.cancels.borrow().is_empty());
}

#[tokio::test]
async fn second_cancel_is_skipped() {
    let (mut c, h) = test_controller();
    c.send("Explain X").await.expect("send");
    c.cancel().await.expect("first cancel");
    assert_eq!(c.cancel().await.expect("second cancel"), FinalizeOutcome::Skipped);
    assert_eq!(h.transport.cancels.borrow().len(), 1);
}
