//! Threading integration tests (THR-I01 through THR-I04)

use threadroom_chat::SendOutcome;

use crate::common::{eventually, stored_message, wait_for, TestRoom, ROOM};

// THR-I01: a live reply to a persisted root counts against that root
#[tokio::test]
async fn test_live_reply_to_history() {
    let room = TestRoom::with_history(vec![
        stored_message("1", "Ada", "first", None),
        stored_message("2", "Grace", "reply", Some("1")),
    ]);
    let ada = room.join_as(ROOM, "Ada").await.unwrap();
    let grace = room.join_as(ROOM, "Grace").await.unwrap();

    assert_eq!(ada.view().reply_count("1"), 1);

    assert!(grace.send("another reply", Some("1")).is_sent());
    wait_for(&ada, |s| s.view.reply_count("1") == 2).await.unwrap();

    let view = ada.view();
    assert_eq!(view.roots().len(), 1);
    assert_eq!(view.roots()[0].reply_count, 2);
    assert_eq!(view.replies("1")[0].id, "2");
}

// THR-I02: a reply whose parent is unknown is shown as a root
#[tokio::test]
async fn test_orphan_reply_is_root() {
    let room = TestRoom::new();
    let ada = room.join_as(ROOM, "Ada").await.unwrap();

    let orphan = stored_message("x", "Grace", "about something you missed", Some("gone"));
    room.live.inject(ROOM, orphan.to_payload().unwrap()).await;

    wait_for(&ada, |s| s.view.len() == 1).await.unwrap();
    let view = ada.view();
    assert_eq!(view.roots()[0].id, "x");
    assert_eq!(view.reply_count("gone"), 0);
}

// THR-I03: a copy seen in both history and the live stream keeps the persisted fields
#[tokio::test]
async fn test_history_copy_wins_over_live_copy() {
    let persisted = stored_message("1", "Ada", "persisted text", None);
    let room = TestRoom::with_history(vec![persisted.clone()]);
    let grace = room.join_as(ROOM, "Grace").await.unwrap();

    let mut live_copy = persisted.clone();
    live_copy.content = "live text".to_string();
    room.live.inject(ROOM, live_copy.to_payload().unwrap()).await;
    room.live
        .inject(ROOM, stored_message("2", "Ada", "marker", None).to_payload().unwrap())
        .await;

    wait_for(&grace, |s| s.view.len() == 2).await.unwrap();
    assert_eq!(grace.view().find("1").unwrap().content, "persisted text");
}

// THR-I04: replies persist with their parent and rebuild the same threads
#[tokio::test]
async fn test_threads_survive_rejoin() {
    let room = TestRoom::new();
    let ada = room.join_as(ROOM, "Ada").await.unwrap();

    let SendOutcome::Sent(root) = ada.send("root", None) else {
        panic!("expected Sent");
    };
    assert!(ada.send("reply", Some(&root.id)).is_sent());
    eventually(|| room.store.rows().len() == 2).await.unwrap();
    ada.leave().await;

    let grace = room.join_as(ROOM, "Grace").await.unwrap();
    let view = grace.view();
    assert_eq!(view.roots().len(), 1);
    assert_eq!(view.reply_count(&root.id), 1);
}
