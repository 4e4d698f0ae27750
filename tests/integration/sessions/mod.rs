//! Session lifecycle integration tests (SES-I01 through SES-I07)

use std::time::Duration;

use threadroom_chat::{ConnectionState, SendOutcome};

use crate::common::{eventually, stored_message, wait_for, TestRoom, ROOM};

mod test_live_sync {
    use super::*;

    // SES-I01: a post by one participant appears in the other's view
    #[test_log::test(tokio::test)]
    async fn test_post_reaches_other_participant() {
        let room = TestRoom::new();
        let ada = room.join_as(ROOM, "Ada").await.unwrap();
        let grace = room.join_as(ROOM, "Grace").await.unwrap();

        let SendOutcome::Sent(message) = ada.send("hello everyone", None) else {
            panic!("expected Sent");
        };

        wait_for(&grace, |s| s.view.find(&message.id).is_some())
            .await
            .unwrap();

        let view = grace.view();
        let received = view.find(&message.id).unwrap();
        assert_eq!(received.author.name, "Ada");
        assert_eq!(received.content, "hello everyone");
    }

    // SES-I02: the sender's own echo does not duplicate the message
    #[tokio::test]
    async fn test_sender_sees_message_once() {
        let room = TestRoom::new();
        let ada = room.join_as(ROOM, "Ada").await.unwrap();
        let grace = room.join_as(ROOM, "Grace").await.unwrap();

        assert!(ada.send("only once", None).is_sent());

        wait_for(&grace, |s| s.view.len() == 1).await.unwrap();
        eventually(|| room.live.published().len() == 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ada.view().len(), 1);
    }

    // SES-I03: rooms are isolated by topic on the live channel
    #[tokio::test]
    async fn test_rooms_do_not_share_live_messages() {
        let room = TestRoom::new();
        let ada = room.join_as("room-a", "Ada").await.unwrap();
        let grace = room.join_as("room-b", "Grace").await.unwrap();

        assert!(ada.send("for room a", None).is_sent());
        assert!(grace.send("for room b", None).is_sent());

        eventually(|| room.live.published().len() == 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ada.view().len(), 1);
        assert_eq!(grace.view().len(), 1);
    }
}

mod test_lifecycle {
    use super::*;

    // SES-I04: leaving stops delivery and releases the subscription once
    #[tokio::test]
    async fn test_leave_stops_delivery() {
        let room = TestRoom::new();
        let ada = room.join_as(ROOM, "Ada").await.unwrap();
        let grace = room.join_as(ROOM, "Grace").await.unwrap();

        grace.leave().await;
        grace.leave().await;
        assert_eq!(room.live.released().len(), 1);
        assert_eq!(room.live.subscriber_count(ROOM), 1);

        assert!(ada.send("anyone there?", None).is_sent());
        eventually(|| room.live.published().len() == 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(grace.view().is_empty());
        assert_eq!(grace.state(), ConnectionState::Disconnected);
    }

    // SES-I05: a dropped connection disables sending until restored
    #[tokio::test]
    async fn test_drop_and_restore() {
        let room = TestRoom::new();
        let ada = room.join_as(ROOM, "Ada").await.unwrap();

        room.live.drop_connection(ROOM).await;
        wait_for(&ada, |s| s.state == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert_eq!(ada.send("lost", None), SendOutcome::NotConnected);

        room.live.restore_connection(ROOM).await;
        wait_for(&ada, |s| s.state == ConnectionState::Connected)
            .await
            .unwrap();
        assert!(ada.send("back", None).is_sent());
    }

    // SES-I06: messages missed while disconnected come back only via reload
    #[tokio::test]
    async fn test_reload_recovers_missed_messages() {
        let room = TestRoom::new();
        let ada = room.join_as(ROOM, "Ada").await.unwrap();
        let grace = room.join_as(ROOM, "Grace").await.unwrap();

        grace.leave().await;
        assert!(ada.send("while you were away", None).is_sent());
        eventually(|| room.store.rows().len() == 1).await.unwrap();

        let grace = room.join_as(ROOM, "Grace").await.unwrap();
        assert_eq!(grace.view().len(), 1);
        assert_eq!(grace.view().roots()[0].content, "while you were away");
    }

    // SES-I07: a guest can read but not post
    #[tokio::test]
    async fn test_guest_reads_but_cannot_post() {
        let room = TestRoom::with_history(vec![stored_message("1", "Ada", "welcome", None)]);
        let guest = threadroom_chat::ChatSession::join(
            ROOM,
            room.services(),
            threadroom_chat::Identity::guest(),
        )
        .await
        .unwrap();
        wait_for(&guest, |s| s.state == ConnectionState::Connected)
            .await
            .unwrap();

        assert_eq!(guest.view().len(), 1);
        assert_eq!(guest.send("hi", None), SendOutcome::NotAuthenticated);
        assert!(!guest.snapshot().authenticated);
    }
}
