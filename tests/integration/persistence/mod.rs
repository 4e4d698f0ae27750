//! Persistence integration tests (PER-I01 through PER-I04)

use threadroom_chat::{ConnectionState, SendOutcome};

use crate::common::{eventually, stored_message, wait_for, TestApp, TestRoom, ROOM};

// PER-I01: a failed write leaves the message visible for the session only
#[tokio::test]
async fn test_failed_write_is_not_fatal() {
    let room = TestRoom::new();
    room.store.set_fail_insert(true);
    let ada = room.join_as(ROOM, "Ada").await.unwrap();

    let SendOutcome::Sent(message) = ada.send("ephemeral", None) else {
        panic!("expected Sent");
    };
    eventually(|| room.store.insert_calls() == 1).await.unwrap();

    assert!(ada.view().find(&message.id).is_some());
    assert_eq!(ada.state(), ConnectionState::Connected);

    room.store.set_fail_insert(false);
    ada.reload_history().await;
    assert!(ada.view().find(&message.id).is_some());
}

// PER-I02: an unreachable history store degrades to live-only
#[test_log::test(tokio::test)]
async fn test_history_unavailable() {
    let room = TestRoom::with_history(vec![stored_message("1", "Ada", "old", None)]);
    room.store.set_fail_load(true);
    let grace = room.join_as(ROOM, "Grace").await.unwrap();

    let snapshot = grace.snapshot();
    assert!(snapshot.load_error.is_some());
    assert!(snapshot.view.is_empty());

    assert!(grace.send("still chatting", None).is_sent());
    wait_for(&grace, |s| s.view.len() == 1).await.unwrap();
}

// PER-I03: Postgres round trip of a reply through the repository
#[tokio::test]
#[ignore] // Requires a running PostgreSQL instance (DATABASE_URL)
async fn test_postgres_history_round_trip() {
    let app = TestApp::new().await.unwrap();
    app.cleanup().await.unwrap();

    let ada = app.join_as(ROOM, "Ada").await.unwrap();
    let SendOutcome::Sent(root) = ada.send("persisted root", None) else {
        panic!("expected Sent");
    };
    assert!(ada.send("persisted reply", Some(&root.id)).is_sent());

    let pool = app.pool.clone();
    let mut stored = 0;
    for _ in 0..50 {
        stored = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&pool)
            .await
            .unwrap();
        if stored == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(stored, 2);
    ada.leave().await;

    let grace = app.join_as(ROOM, "Grace").await.unwrap();
    assert_eq!(grace.view().reply_count(&root.id), 1);

    grace.leave().await;
    app.cleanup().await.unwrap();
}

// PER-I04: LISTEN/NOTIFY carries a post between two sessions
#[tokio::test]
#[ignore] // Requires a running PostgreSQL instance (DATABASE_URL)
async fn test_postgres_live_delivery() {
    let app = TestApp::new().await.unwrap();

    let ada = app.join_as("pg-live-room", "Ada").await.unwrap();
    let grace = app.join_as("pg-live-room", "Grace").await.unwrap();

    let SendOutcome::Sent(message) = ada.send("over notify", None) else {
        panic!("expected Sent");
    };
    wait_for(&grace, |s| s.view.find(&message.id).is_some())
        .await
        .unwrap();

    ada.leave().await;
    grace.leave().await;
    app.cleanup().await.unwrap();
}
