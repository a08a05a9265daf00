// =====
// TESTS: 4
// =====
//
// Stream start failure integration tests.
// A failed start leaves a system error turn and an idle tab.

use pretty_assertions::assert_eq;
use tabchat::agent::wire::StartStreamResponse;
use tabchat::chat::Role;
use tabchat::error::{ChatError, TransportError};

use crate::helpers::{complete_exchange, test_controller};

#[tokio::test]
async fn transport_error_becomes_system_turn() {
    let (mut c, h) = test_controller();
    h.transport.script(Err(TransportError::ChannelClosed));

    let err = c.send("Hi").await.expect_err("start fails");
    assert_eq!(err, ChatError::Transport(TransportError::ChannelClosed));

    let turns = c.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].role, Role::System);
    assert!(!turns[1].is_streaming);
    assert_eq!(turns[1].content, "Error: producer channel closed");
    assert!(!c.is_processing());
    assert_eq!(h.history.snapshot("tab-1").expect("saved").turns.len(), 2);
}

#[tokio::test]
async fn rejected_start_carries_producer_message() {
    let (mut c, h) = test_controller();
    h.transport.script(Ok(StartStreamResponse {
        success: false,
        error: Some("not signed in".to_owned()),
        ..StartStreamResponse::default()
    }));

    let err = c.send("Hi").await.expect_err("start rejected");
    assert_eq!(err, ChatError::Transport(TransportError::Rejected("not signed in".to_owned())));
    assert!(c.turns()[1].content.contains("not signed in"));
}

#[tokio::test]
async fn missing_stream_id_is_a_failure() {
    let (mut c, h) = test_controller();
    h.transport.script(Ok(StartStreamResponse { success: true, ..StartStreamResponse::default() }));
    assert!(matches!(c.send("Hi").await, Err(ChatError::Transport(TransportError::Other(_)))));
    assert_eq!(c.turns()[1].role, Role::System);
}

#[tokio::test]
async fn tab_can_send_again_after_failure() {
    let (mut c, h) = test_controller();
    h.transport.script(Err(TransportError::ChannelClosed));
    c.queue_extracted_content("page");
    c.send("Hi").await.expect_err("start fails");

    // The page was never delivered, so it rides along with the retry.
    complete_exchange(&mut c, "Hi again", &["Hello"]).await;
    assert_eq!(h.transport.last_request().page_content.as_deref(), Some("page"));
    assert_eq!(c.turns().len(), 5);
    assert_eq!(c.usage().output_tokens, 2);
}
