// =====
// TESTS: 7
// =====
//
// Accounting integration tests.
// Cumulative totals across sends, reruns and edits. With the priced test
// model every token costs 1.0, so cost = input + output tokens.

use pretty_assertions::assert_eq;
use tabchat::agent::wire::ChunkEvent;
use tabchat::chat::Role;
use tabchat::error::ChatError;
use tabchat::history::TabUsage;

use crate::helpers::{complete_exchange, stream_chunks, test_controller};

fn usage(cost: f64, input_tokens: u64, output_tokens: u64) -> TabUsage {
    TabUsage { accumulated_cost: cost, input_tokens, output_tokens }
}

#[tokio::test]
async fn sends_accumulate_per_turn_totals() {
    let (mut c, h) = test_controller();
    // "Hi" = 1 token in, "Hello there" = 3 tokens out.
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    assert_eq!(c.usage(), usage(4.0, 1, 3));

    // Context "Hi" + "Hello there" + "More please" = 7 in, "Second answer" = 4 out.
    complete_exchange(&mut c, "More please", &["Second answer"]).await;
    assert_eq!(c.usage(), usage(15.0, 8, 7));
    assert_eq!(h.history.snapshot("tab-1").expect("saved").usage, c.usage());
}

#[tokio::test]
async fn rerun_adds_only_the_replayed_turn() {
    let (mut c, h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    complete_exchange(&mut c, "More please", &["Second answer"]).await;
    let before = c.usage();
    let first_user = c.turns()[0].id.clone();

    // Replaying the first turn truncates all four turns.
    let stream = c.rerun(&first_user).await.expect("rerun");
    assert_eq!(c.turns().len(), 2);
    stream_chunks(&mut c, &stream, &["Again"]).await;
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");

    // "Hi" = 1 in, "Again" = 2 out.
    let expected =
        usage(before.accumulated_cost + 3.0, before.input_tokens + 1, before.output_tokens + 2);
    assert_eq!(c.usage(), expected);
    assert_eq!(h.history.snapshot("tab-1").expect("saved").usage, expected);
    let contents: Vec<&str> = c.turns().iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["Hi", "Again"]);
}

#[tokio::test]
async fn rerun_from_assistant_turn_replays_its_question() {
    let (mut c, h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    complete_exchange(&mut c, "More please", &["Second answer"]).await;
    let last_answer = c.turns()[3].id.clone();

    c.rerun(&last_answer).await.expect("rerun");
    let request = h.transport.last_request();
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[2].content, "More please");
    assert_eq!(c.turns().len(), 4);
    assert!(c.turns()[3].is_streaming);
}

#[tokio::test]
async fn edit_and_rerun_replaces_the_question() {
    let (mut c, h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    let before = c.usage();
    let user = c.turns()[0].id.clone();

    let stream = c.edit_and_rerun(&user, "Hello friend").await.expect("edit");
    assert_eq!(h.transport.last_request().messages[0].content, "Hello friend");
    stream_chunks(&mut c, &stream, &["Hey"]).await;
    c.handle_event(ChunkEvent::done(&stream, None)).await.expect("done");

    assert_eq!(c.turns()[0].content, "Hello friend");
    assert_eq!(c.turns()[0].role, Role::User);
    // "Hello friend" = 3 in, "Hey" = 1 out.
    assert_eq!(
        c.usage(),
        usage(before.accumulated_cost + 4.0, before.input_tokens + 3, before.output_tokens + 1)
    );
}

#[tokio::test]
async fn cancelled_rerun_still_conserves_totals() {
    let (mut c, _h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    let before = c.usage();
    let user = c.turns()[0].id.clone();

    c.rerun(&user).await.expect("rerun");
    c.cancel().await.expect("cancel");
    let cancelled = &c.turns()[1];
    assert_eq!(
        c.usage(),
        usage(
            before.accumulated_cost + cancelled.cost,
            before.input_tokens + cancelled.input_tokens,
            before.output_tokens + cancelled.output_tokens
        )
    );
}

#[tokio::test]
async fn replay_is_rejected_while_streaming() {
    let (mut c, _h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    let user = c.turns()[0].id.clone();
    c.send("next").await.expect("send");

    assert_eq!(c.rerun(&user).await, Err(ChatError::Busy));
    assert_eq!(c.edit_and_rerun(&user, "x").await, Err(ChatError::Busy));
    assert_eq!(c.turns().len(), 4);
}

#[tokio::test]
async fn replay_of_unknown_turn_is_reported() {
    let (mut c, _h) = test_controller();
    complete_exchange(&mut c, "Hi", &["Hello there"]).await;
    assert_eq!(c.rerun("missing").await, Err(ChatError::TurnNotFound("missing".to_owned())));
    assert_eq!(c.turns().len(), 2);
}
