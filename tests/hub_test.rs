// Integration tests for the connection hub
// These drive a spawned hub through its handle, the way the server does

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use rusty_hub::auth::UserProfile;
use rusty_hub::config::HubConfig;
use rusty_hub::core::{
    spawn_hub, Broadcaster, ChatMessage, Connection, Event, HubHandle, HubStats, OutboundQueue,
    PresenceStatus,
};
use rusty_hub::error::RustyHubError;

const WAIT: Duration = Duration::from_secs(2);

fn hub_config(cap: usize) -> HubConfig {
    HubConfig {
        max_connections_per_user: cap,
        ..HubConfig::default()
    }
}

fn open(hub: &HubHandle, user_id: i64, workspace_id: i64) -> (Arc<Connection>, OutboundQueue) {
    let profile = UserProfile::new(user_id, format!("user{}", user_id));
    let (connection, queue) = Connection::new(profile, workspace_id, 16);
    hub.register(Arc::clone(&connection)).unwrap();
    (connection, queue)
}

async fn wait_for_stats(hub: &HubHandle, check: impl FnMut(&HubStats) -> bool) {
    let mut stats = hub.subscribe_stats();
    timeout(WAIT, stats.wait_for(check))
        .await
        .expect("hub statistics did not converge")
        .unwrap();
}

async fn next_kind(queue: &mut OutboundQueue) -> Option<&'static str> {
    timeout(WAIT, queue.recv())
        .await
        .expect("timed out waiting for an envelope")
        .map(|envelope| envelope.event.kind())
}

#[tokio::test]
async fn test_sixth_connection_evicts_the_first() {
    let hub = spawn_hub(hub_config(5));
    let mut opened: Vec<_> = (0..6).map(|_| open(&hub, 1, 10)).collect();
    wait_for_stats(&hub, |s| s.evicted == 1).await;

    // The oldest got its welcome, then its queue was closed
    let (first, first_queue) = &mut opened[0];
    assert_eq!(next_kind(first_queue).await, Some("connection_established"));
    assert_eq!(next_kind(first_queue).await, None);
    assert!(first.is_closed());

    for (connection, queue) in opened.iter_mut().skip(1) {
        assert_eq!(next_kind(queue).await, Some("connection_established"));
        assert!(!connection.is_closed());
    }
    assert_eq!(hub.stats().connections, 5);
    assert_eq!(hub.stats().users, 1);
}

#[tokio::test]
async fn test_workspace_broadcast_counts_every_device() {
    let hub = spawn_hub(hub_config(5));
    let mut members = vec![
        open(&hub, 1, 10),
        open(&hub, 2, 10),
        open(&hub, 3, 10),
        // Second device of user 3
        open(&hub, 3, 10),
    ];
    let (_outsider, mut outsider_queue) = open(&hub, 4, 20);
    wait_for_stats(&hub, |s| s.connections == 5).await;

    hub.notify_status_changed(10, 1, PresenceStatus::Away, Some("lunch".to_string()))
        .unwrap();
    wait_for_stats(&hub, |s| s.delivered == 4).await;

    for (_, queue) in members.iter_mut() {
        assert_eq!(next_kind(queue).await, Some("connection_established"));
        assert_eq!(next_kind(queue).await, Some("status_changed"));
    }
    assert_eq!(next_kind(&mut outsider_queue).await, Some("connection_established"));
    assert!(outsider_queue.try_recv().is_err());
}

#[tokio::test]
async fn test_user_broadcast_reaches_all_devices_only() {
    let hub = spawn_hub(hub_config(5));
    let (_phone, mut phone) = open(&hub, 7, 10);
    let (_laptop, mut laptop) = open(&hub, 7, 10);
    let (_other, mut other) = open(&hub, 8, 10);
    wait_for_stats(&hub, |s| s.connections == 3).await;

    hub.broadcast_to_user(10, 7, Event::Pong).unwrap();
    wait_for_stats(&hub, |s| s.delivered == 2).await;

    for queue in [&mut phone, &mut laptop] {
        assert_eq!(next_kind(queue).await, Some("connection_established"));
        assert_eq!(next_kind(queue).await, Some("pong"));
    }
    assert_eq!(next_kind(&mut other).await, Some("connection_established"));
    assert!(other.try_recv().is_err());
}

#[tokio::test]
async fn test_direct_message_edit_reaches_participants_only() {
    let hub = spawn_hub(hub_config(5));
    let (_alice, mut alice) = open(&hub, 1, 10);
    let (_bob, mut bob) = open(&hub, 2, 10);
    let (_carol, mut carol) = open(&hub, 3, 10);
    wait_for_stats(&hub, |s| s.connections == 3).await;

    let direct = ChatMessage {
        id: 55,
        channel_id: None,
        conversation_id: Some(7),
        thread_id: None,
        author: UserProfile::new(1, "user1"),
        content: "edited".to_string(),
        created_at: chrono::Utc::now(),
        edited_at: Some(chrono::Utc::now()),
    };
    assert!(matches!(
        hub.notify_message_edited(10, direct.clone()),
        Err(RustyHubError::NoChannel { message_id: 55 })
    ));

    hub.notify_direct_message_edited(10, &[1, 2], direct).unwrap();
    hub.notify_direct_message_deleted(10, &[1, 2], 7, 55).unwrap();
    wait_for_stats(&hub, |s| s.delivered == 4).await;

    for queue in [&mut alice, &mut bob] {
        assert_eq!(next_kind(queue).await, Some("connection_established"));
        assert_eq!(next_kind(queue).await, Some("message_edited"));
        assert_eq!(next_kind(queue).await, Some("message_deleted"));
    }
    assert_eq!(next_kind(&mut carol).await, Some("connection_established"));
    assert!(carol.try_recv().is_err());
}

#[tokio::test]
async fn test_unregister_twice_changes_nothing() {
    let hub = spawn_hub(hub_config(5));
    let (gone, _gone_queue) = open(&hub, 1, 10);
    let (_kept, _kept_queue) = open(&hub, 2, 10);
    wait_for_stats(&hub, |s| s.connections == 2).await;

    hub.unregister(gone.id()).unwrap();
    wait_for_stats(&hub, |s| s.connections == 1).await;
    let after_first = hub.stats();

    hub.unregister(gone.id()).unwrap();
    // A broadcast submitted afterwards is handled after the repeated unregister
    hub.broadcast_to_workspace(10, Event::Pong).unwrap();
    wait_for_stats(&hub, |s| s.delivered == 1).await;

    let after_second = hub.stats();
    assert_eq!(after_first.connections, after_second.connections);
    assert_eq!(after_first.users, after_second.users);
    assert_eq!(after_first.workspaces, after_second.workspaces);
    assert!(gone.is_closed());
}

#[tokio::test]
async fn test_slow_recipient_does_not_block_others() {
    let hub = spawn_hub(hub_config(5));
    // One slot, taken by the welcome and never drained
    let (slow, _slow_queue) = Connection::new(UserProfile::new(1, "slow"), 10, 1);
    hub.register(Arc::clone(&slow)).unwrap();
    let (_fast, mut fast_queue) = open(&hub, 2, 10);
    wait_for_stats(&hub, |s| s.connections == 2).await;

    for _ in 0..3 {
        hub.broadcast_to_workspace(10, Event::Pong).unwrap();
    }
    wait_for_stats(&hub, |s| s.delivered == 3 && s.dropped == 3).await;

    assert_eq!(next_kind(&mut fast_queue).await, Some("connection_established"));
    for _ in 0..3 {
        assert_eq!(next_kind(&mut fast_queue).await, Some("pong"));
    }
    assert!(!slow.is_closed());
}

#[tokio::test]
async fn test_scoped_channel_narrows_delivery() {
    let hub = spawn_hub(hub_config(5));
    let (member, mut member_queue) = open(&hub, 1, 10);
    let (_bystander, mut bystander_queue) = open(&hub, 2, 10);
    wait_for_stats(&hub, |s| s.connections == 2).await;

    hub.scope_channel(member.id(), 42).unwrap();
    wait_for_stats(&hub, |s| s.scoped_channels == 1).await;

    hub.broadcast_to_channel(10, 42, Event::Pong).unwrap();
    wait_for_stats(&hub, |s| s.delivered == 1).await;

    assert_eq!(next_kind(&mut member_queue).await, Some("connection_established"));
    assert_eq!(next_kind(&mut member_queue).await, Some("pong"));
    assert_eq!(next_kind(&mut bystander_queue).await, Some("connection_established"));
    assert!(bystander_queue.try_recv().is_err());

    hub.unscope_channel(member.id(), 42).unwrap();
    hub.broadcast_to_channel(10, 42, Event::Pong).unwrap();
    wait_for_stats(&hub, |s| s.delivered == 3).await;
    assert_eq!(next_kind(&mut bystander_queue).await, Some("pong"));
}

#[tokio::test]
async fn test_dropping_every_handle_closes_connections() {
    let hub = spawn_hub(hub_config(5));
    let (connection, mut queue) = open(&hub, 1, 10);
    wait_for_stats(&hub, |s| s.connections == 1).await;

    drop(hub);

    assert_eq!(next_kind(&mut queue).await, Some("connection_established"));
    assert_eq!(next_kind(&mut queue).await, None);
    assert!(connection.is_closed());
}
