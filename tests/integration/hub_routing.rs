// =====
// TESTS: 8
// =====
//
// Chat hub integration tests.
// Several tabs share one producer channel; events are routed by stream id.

use pretty_assertions::assert_eq;
use tabchat::agent::wire::ChunkEvent;
use tabchat::chat::{ChatHub, Handled};

use crate::helpers::{complete_exchange, harness_with_history, priced_model, test_hub};

async fn deliver(hub: &mut ChatHub, event: ChunkEvent) -> Option<(String, Handled)> {
    hub.dispatch(event).await.expect("dispatch")
}

#[tokio::test]
async fn events_reach_only_their_own_tab() {
    let (mut hub, _h) = test_hub();
    let a = hub.send("tab-a", "question a").await.expect("send a");
    let b = hub.send("tab-b", "question b").await.expect("send b");
    assert_eq!((a.as_str(), b.as_str()), ("stream-1", "stream-2"));

    deliver(&mut hub, ChunkEvent::delta(&a, "alpha ")).await;
    deliver(&mut hub, ChunkEvent::delta(&b, "beta")).await;
    deliver(&mut hub, ChunkEvent::delta(&a, "answer")).await;
    let finished = deliver(&mut hub, ChunkEvent::done(&b, None)).await;
    assert!(matches!(finished, Some((ref tab, Handled::Finalized(_))) if tab == "tab-b"));
    deliver(&mut hub, ChunkEvent::done(&a, None)).await;

    assert_eq!(hub.get("tab-a").expect("tab a").turns()[1].content, "alpha answer");
    assert_eq!(hub.get("tab-b").expect("tab b").turns()[1].content, "beta");
}

#[tokio::test]
async fn unknown_stream_is_dropped() {
    let (mut hub, _h) = test_hub();
    hub.send("tab-a", "question").await.expect("send");
    assert_eq!(deliver(&mut hub, ChunkEvent::delta("stream-99", "stray")).await, None);
    assert_eq!(hub.get("tab-a").expect("tab").turns()[1].content, "");
}

#[tokio::test]
async fn finished_stream_is_unindexed() {
    let (mut hub, _h) = test_hub();
    let stream = hub.send("tab-a", "question").await.expect("send");
    assert_eq!(hub.owner_of(&stream), Some("tab-a"));
    deliver(&mut hub, ChunkEvent::done(&stream, Some("answer".to_owned()))).await;
    assert_eq!(hub.owner_of(&stream), None);
    assert_eq!(deliver(&mut hub, ChunkEvent::done(&stream, None)).await, None);
}

#[tokio::test]
async fn cancel_all_stops_every_active_stream() {
    let (mut hub, h) = test_hub();
    hub.send("tab-a", "a").await.expect("send a");
    hub.send("tab-b", "b").await.expect("send b");
    hub.tab("tab-idle").await;

    let mut cancelled = hub.cancel_all().await;
    cancelled.sort();
    assert_eq!(cancelled, ["tab-a", "tab-b"]);
    assert!(!hub.is_processing());
    assert_eq!(h.transport.cancels.borrow().len(), 2);
    assert_eq!(hub.owner_of("stream-1"), None);
}

#[tokio::test]
async fn frame_reports_tabs_with_new_content() {
    let (mut hub, _h) = test_hub();
    let a = hub.send("tab-a", "a").await.expect("send a");
    hub.send("tab-b", "b").await.expect("send b");
    deliver(&mut hub, ChunkEvent::delta(&a, "x")).await;

    assert_eq!(hub.on_frame(), ["tab-a"]);
    assert!(hub.on_frame().is_empty());
    assert_eq!(hub.get("tab-a").expect("tab").turns()[1].content, "x");
}

#[tokio::test]
async fn close_tab_cancels_and_forgets_history() {
    let (mut hub, h) = test_hub();
    hub.send("tab-a", "a").await.expect("send");
    hub.close_tab("tab-a").await.expect("close");

    assert!(hub.get("tab-a").is_none());
    assert!(h.history.snapshot("tab-a").is_none());
    assert_eq!(*h.transport.cancels.borrow(), ["stream-1"]);
    assert_eq!(deliver(&mut hub, ChunkEvent::done("stream-1", None)).await, None);
}

#[tokio::test]
async fn opening_a_tab_restores_its_history() {
    let (mut hub, h) = test_hub();
    let stream = hub.send("tab-a", "question").await.expect("send");
    deliver(&mut hub, ChunkEvent::done(&stream, Some("answer".to_owned()))).await;

    let h2 = harness_with_history(h.history.clone());
    let mut fresh = ChatHub::new(h2.collaborators.clone(), priced_model());
    let tab = fresh.tab("tab-a").await;
    let contents: Vec<&str> = tab.turns().iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, ["question", "answer"]);
    assert_eq!(tab.usage(), h.history.snapshot("tab-a").expect("saved").usage);
}

#[tokio::test]
async fn rerun_through_the_hub_routes_the_new_stream() {
    let (mut hub, _h) = test_hub();
    let tab = hub.tab("tab-a").await;
    complete_exchange(tab, "question", &["first answer"]).await;
    let user = hub.get("tab-a").expect("tab").turns()[0].id.clone();

    let stream = hub.rerun("tab-a", &user).await.expect("rerun");
    assert_eq!(hub.owner_of(&stream), Some("tab-a"));
    deliver(&mut hub, ChunkEvent::done(&stream, Some("second answer".to_owned()))).await;
    let contents: Vec<String> =
        hub.get("tab-a").expect("tab").turns().iter().map(|t| t.content.clone()).collect();
    assert_eq!(contents, ["question", "second answer"]);
}
