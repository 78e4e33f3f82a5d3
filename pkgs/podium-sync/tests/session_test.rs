// Copyright 2026 Podium Team.
//
// End-to-end tests for SyncSession against a LogStore and RealtimeHub

mod common;

use common::{eventually, Fixture};
use podium_realtime::{EventKind, Topic};
use podium_store::{
    unread_since, ConversationApi, MessageApi, NewNotification, NotificationApi, UserId,
};
use podium_sync::{HistoryLoad, SyncError};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test]
async fn test_opening_conversation_clears_unread_badge() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    for body in ["Hi Ada", "Are you free on the 12th?", "Let me know"] {
        fx.store.create(&conversation, &fx.grace, body).await.unwrap();
    }

    let (_auth, session) = fx.session_for(&fx.ada).await;
    let listed = session.conversations().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].unread_count, 3);
    assert_eq!(listed[0].display_name, "Grace Speaker");
    assert_eq!(listed[0].preview.as_deref(), Some("Let me know"));
    assert_eq!(session.badges().messages, 3);

    let loaded = session.open_conversation(&conversation).await.unwrap();
    assert_eq!(loaded, HistoryLoad::Fresh);
    assert_eq!(session.conversations().await[0].unread_count, 0);
    assert_eq!(session.messages(&conversation).await.unwrap().len(), 3);

    // The badge follows once the read marker is written
    session.settle().await;
    assert_eq!(session.badges().messages, 0);

    session.end().await;
}

#[tokio::test]
async fn test_own_echo_does_not_duplicate_send() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();

    let sent = session.send_message(&conversation, "hello").await.unwrap();
    assert!(sent.id.is_local());
    assert_eq!(session.messages(&conversation).await.unwrap().len(), 1);

    session.settle().await;
    let stored = fx.store.list_by_conversation(&conversation).await.unwrap();
    assert_eq!(stored.len(), 1);

    // Late redelivery of the server copy
    tokio::time::sleep(Duration::from_millis(300)).await;
    fx.hub.publish(
        &Topic::ViewerMessages(fx.ada.clone()),
        EventKind::MessageInserted,
        &stored[0],
    );
    session.settle().await;

    let messages = session.messages(&conversation).await.unwrap();
    let hellos = messages.iter().filter(|m| m.body == "hello").count();
    assert_eq!(hellos, 1);
    assert_eq!(messages[0].id, sent.id);

    // The next history fetch swaps in the server id
    session.open_conversation(&conversation).await.unwrap();
    let messages = session.messages(&conversation).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, stored[0].id);

    session.end().await;
}

#[tokio::test]
async fn test_duplicate_push_is_applied_once() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();

    // The hub delivers it once, then it is redelivered
    let message = fx.store.create(&conversation, &fx.grace, "one copy").await.unwrap();
    fx.hub.publish(
        &Topic::ViewerMessages(fx.ada.clone()),
        EventKind::MessageInserted,
        &message,
    );

    eventually("push applied", || async {
        session
            .messages(&conversation)
            .await
            .is_some_and(|m| !m.is_empty())
    })
    .await;
    session.settle().await;

    let messages = session.messages(&conversation).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, message.id);

    session.end().await;
}

#[tokio::test]
async fn test_notification_push_and_mark_all_read() {
    let fx = Fixture::new().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    let mut badges = session.watch_badges();
    assert_eq!(session.badges().notifications, 0);

    fx.store
        .push_notification(
            &fx.ada,
            NewNotification {
                kind: "booking".to_string(),
                title: "Booking confirmed".to_string(),
                body: "RustConf keynote".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), badges.changed())
        .await
        .expect("badge did not change")
        .unwrap();
    assert_eq!(badges.borrow().notifications, 1);

    let items = session.notifications().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, "booking");
    assert!(!items[0].is_read);

    session.mark_all_notifications_read().await.unwrap();
    assert_eq!(session.badges().notifications, 0);
    assert!(session.notifications().await.iter().all(|n| n.is_read));

    session.settle().await;
    assert_eq!(fx.store.unread_count(&fx.ada).await.unwrap(), 0);

    session.end().await;
}

fn booking(title: &str) -> NewNotification {
    NewNotification {
        kind: "booking".to_string(),
        title: title.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_notification_inserted_during_start_is_counted_once() {
    let fx = Fixture::new().await;
    *fx.backend.insert_after_list.lock() = Some(booking("Booking request"));

    let (_auth, session) = fx.session_for(&fx.ada).await;
    eventually("late notification applied", || async {
        session.notifications().await.len() == 1
    })
    .await;
    session.settle().await;

    let backend_unread = fx.store.unread_count(&fx.ada).await.unwrap();
    assert_eq!(backend_unread, 1);
    assert_eq!(session.notifications().await.len(), 1);
    assert_eq!(session.badges().notifications, backend_unread);

    session.end().await;
}

#[tokio::test]
async fn test_notification_inserted_during_refresh_is_counted_once() {
    let fx = Fixture::new().await;
    fx.store.push_notification(&fx.ada, booking("First")).await.unwrap();
    let (_auth, session) = fx.session_for(&fx.ada).await;
    assert_eq!(session.badges().notifications, 1);

    *fx.backend.insert_after_list.lock() = Some(booking("Second"));
    session.refresh().await.unwrap();
    eventually("late notification applied", || async {
        session.notifications().await.len() == 2
    })
    .await;
    session.settle().await;

    assert_eq!(fx.store.unread_count(&fx.ada).await.unwrap(), 2);
    assert_eq!(session.badges().notifications, 2);

    session.end().await;
}

#[tokio::test]
async fn test_presence_suppresses_unread_in_open_conversation() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();

    fx.store.create(&conversation, &fx.grace, "while you watch").await.unwrap();
    eventually("push applied", || async {
        session.messages(&conversation).await.is_some_and(|m| m.len() == 1)
    })
    .await;
    session.settle().await;

    assert_eq!(session.conversations().await[0].unread_count, 0);
    assert_eq!(session.badges().messages, 0);
    // The server skipped the message notification too
    assert_eq!(fx.store.unread_count(&fx.ada).await.unwrap(), 0);
    assert!(session.notifications().await.is_empty());

    session.end().await;
}

#[tokio::test]
async fn test_push_into_other_conversation_increments_by_one() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;

    fx.store.create(&conversation, &fx.grace, "ping").await.unwrap();
    eventually("unread bumped", || async {
        session.conversations().await[0].unread_count == 1
    })
    .await;
    session.settle().await;

    assert_eq!(session.badges().messages, 1);
    eventually("notification badge", || async {
        session.badges().notifications == 1
    })
    .await;

    session.end().await;
}

#[tokio::test]
async fn test_local_unread_matches_rescan() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    fx.store.create(&conversation, &fx.grace, "before").await.unwrap();

    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();
    session.close_conversation().await.unwrap();

    for body in ["after 1", "after 2"] {
        fx.store.create(&conversation, &fx.grace, body).await.unwrap();
    }
    eventually("pushes applied", || async {
        session.messages(&conversation).await.is_some_and(|m| m.len() == 3)
    })
    .await;
    session.settle().await;

    let record = fx.store.list_for_viewer(&fx.ada).await.unwrap().remove(0);
    let stored = fx.store.list_by_conversation(&conversation).await.unwrap();
    let expected = unread_since(&stored, &fx.ada, record.last_read_at);

    assert_eq!(expected, 2);
    assert_eq!(session.conversations().await[0].unread_count, expected);
    assert_eq!(session.badges().messages, expected as u64);

    session.end().await;
}

#[tokio::test]
async fn test_interleaved_messages_stay_ordered_and_unique() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();

    for i in 0..4 {
        fx.store
            .create(&conversation, &fx.grace, &format!("grace {}", i))
            .await
            .unwrap();
        session
            .send_message(&conversation, &format!("ada {}", i))
            .await
            .unwrap();
    }
    eventually("all pushes applied", || async {
        session.messages(&conversation).await.is_some_and(|m| m.len() == 8)
    })
    .await;
    session.settle().await;

    let check = |messages: &[podium_store::Message]| {
        assert!(messages
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at));
        let ids: HashSet<_> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), messages.len());
    };
    check(&session.messages(&conversation).await.unwrap());

    session.open_conversation(&conversation).await.unwrap();
    let replaced = session.messages(&conversation).await.unwrap();
    assert_eq!(replaced.len(), 8);
    assert!(replaced.iter().all(|m| !m.id.is_local()));
    check(&replaced);

    session.end().await;
}

#[tokio::test]
async fn test_push_for_unknown_conversation_creates_entry() {
    let fx = Fixture::new().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    assert!(session.conversations().await.is_empty());

    let conversation = fx.conversation().await;
    fx.store.create(&conversation, &fx.grace, "first contact").await.unwrap();

    eventually("conversation created", || async {
        !session.conversations().await.is_empty()
    })
    .await;
    session.settle().await;

    let listed = session.conversations().await;
    assert_eq!(listed[0].id, conversation);
    assert_eq!(listed[0].other_party, fx.grace);
    assert_eq!(listed[0].display_name, "Grace Speaker");
    assert_eq!(listed[0].unread_count, 1);
    assert_eq!(listed[0].preview.as_deref(), Some("first contact"));

    session.end().await;
}

#[tokio::test]
async fn test_stale_history_is_discarded_after_switching() {
    let fx = Fixture::new().await;
    let linus = UserId::from("linus");
    fx.store
        .profiles()
        .upsert_user(&linus, "Linus", "speaker")
        .await
        .unwrap();
    let slow = fx.conversation().await;
    let fast = fx.store.get_or_create(&fx.ada, &linus).await.unwrap();
    fx.store.create(&slow, &fx.grace, "slow history").await.unwrap();
    fx.backend.delay_history(&slow, Duration::from_millis(200));

    let (_auth, session) = fx.session_for(&fx.ada).await;
    let (first, second) = tokio::join!(session.open_conversation(&slow), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.open_conversation(&fast).await
    });

    assert_eq!(first.unwrap(), HistoryLoad::Superseded);
    assert_eq!(second.unwrap(), HistoryLoad::Fresh);
    assert_eq!(session.open_conversation_id().await, Some(fast));

    session.end().await;
}

#[tokio::test]
async fn test_close_during_fetch_discards_history() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    fx.backend.delay_history(&conversation, Duration::from_millis(150));

    let (_auth, session) = fx.session_for(&fx.ada).await;
    let (opened, closed) = tokio::join!(session.open_conversation(&conversation), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        session.close_conversation().await
    });

    assert_eq!(opened.unwrap(), HistoryLoad::Superseded);
    closed.unwrap();
    assert_eq!(session.open_conversation_id().await, None);

    session.end().await;
}

#[tokio::test]
async fn test_malformed_push_keeps_subscription_alive() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;

    fx.hub.publish(
        &Topic::ViewerMessages(fx.ada.clone()),
        EventKind::MessageInserted,
        &serde_json::json!({ "id": 42, "body": null }),
    );
    fx.store.create(&conversation, &fx.grace, "still here").await.unwrap();

    eventually("valid push applied", || async {
        session.messages(&conversation).await.is_some_and(|m| m.len() == 1)
    })
    .await;

    session.end().await;
}

#[tokio::test]
async fn test_open_direct_creates_and_opens() {
    let fx = Fixture::new().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;

    let conversation = session.open_direct(&fx.grace).await.unwrap();
    assert_eq!(session.open_conversation_id().await, Some(conversation.clone()));

    let listed = session.conversations().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].display_name, "Grace Speaker");

    let again = session.open_direct(&fx.grace).await.unwrap();
    assert_eq!(again, conversation);
    assert_eq!(session.conversations().await.len(), 1);

    session.end().await;
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;

    let result = session.send_message(&conversation, "   \n").await;
    assert_eq!(result.unwrap_err(), SyncError::EmptyMessage);
    assert!(session.messages(&conversation).await.unwrap().is_empty());

    session.end().await;
}

#[tokio::test]
async fn test_message_body_is_kept_as_typed() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;

    let typed = "  see you at 10:00\n";
    let sent = session.send_message(&conversation, typed).await.unwrap();
    assert_eq!(sent.body, typed);

    session.settle().await;
    let stored = fx.store.list_by_conversation(&conversation).await.unwrap();
    assert_eq!(stored[0].body, typed);

    session.end().await;
}

#[tokio::test]
async fn test_open_conversation_uses_viewer_topic_only() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();

    assert_eq!(fx.hub.subscriber_count(&Topic::Conversation(conversation.clone())), 0);
    assert_eq!(fx.hub.subscriber_count(&Topic::ViewerMessages(fx.ada.clone())), 1);

    session.end().await;
    assert_eq!(fx.hub.subscriber_count(&Topic::ViewerMessages(fx.ada.clone())), 0);
}

#[tokio::test]
async fn test_display_name_autosave_writes_latest() {
    let fx = Fixture::new().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    assert_eq!(session.profile_draft().display_name, "Ada Organizer");

    for name in ["A", "Ada L", "Ada Lovelace"] {
        session.edit_display_name(name).unwrap();
    }
    eventually("display name saved", || async {
        fx.store.profiles().display_name(&fx.ada).await.unwrap() == Some("Ada Lovelace".to_string())
    })
    .await;

    session.end().await;
}

#[tokio::test]
async fn test_end_clears_presence() {
    let fx = Fixture::new().await;
    let conversation = fx.conversation().await;
    let (_auth, session) = fx.session_for(&fx.ada).await;
    session.open_conversation(&conversation).await.unwrap();
    session.end().await;

    fx.store.create(&conversation, &fx.grace, "are you there?").await.unwrap();
    assert_eq!(fx.store.unread_count(&fx.ada).await.unwrap(), 1);
}
