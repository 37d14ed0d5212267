//! Hub state and delivery semantics, exercised through the session queues.

use sentinel_realtime::{personal_channel, repository_channel, Hub, ServerMessage};

fn notification(data: serde_json::Value) -> ServerMessage {
    ServerMessage::ActivityNotification {
        notification_id: uuid::Uuid::new_v4(),
        data,
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn attach_queues_connection_established() {
    let hub = Hub::new();
    let (session_id, mut rx) = hub.attach(1).await;

    let frame = rx.recv().await.unwrap();
    match frame {
        ServerMessage::ConnectionEstablished {
            user_id,
            session_id: sid,
            ..
        } => {
            assert_eq!(user_id, 1);
            assert_eq!(sid, session_id);
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    // Personal channel is auto-subscribed.
    assert_eq!(hub.user_channels(1).await, vec![personal_channel(1)]);
}

#[tokio::test]
async fn channel_broadcast_reaches_only_subscribers() {
    let hub = Hub::new();
    let (_, mut rx1) = hub.attach(1).await;
    let (_, mut rx2) = hub.attach(2).await;
    // Drain the connection frames.
    rx1.recv().await.unwrap();
    rx2.recv().await.unwrap();

    let channel = repository_channel("acme/widget");
    hub.subscribe_channel(1, &channel).await;

    let delivered = hub
        .broadcast_channel(&channel, notification(serde_json::json!({"external_id": "42"})))
        .await;
    assert_eq!(delivered, 1);

    let frame = rx1.recv().await.unwrap();
    match frame {
        ServerMessage::ActivityNotification { data, .. } => {
            assert_eq!(data["external_id"], "42");
        }
        other => panic!("unexpected frame: {other:?}"),
    }
    assert!(rx2.try_recv().is_err(), "unsubscribed user must see nothing");
}

#[tokio::test]
async fn personal_send_reaches_every_session_of_the_user() {
    let hub = Hub::new();
    let (_, mut rx_a) = hub.attach(7).await;
    let (_, mut rx_b) = hub.attach(7).await;
    rx_a.recv().await.unwrap();
    rx_b.recv().await.unwrap();

    let delivered = hub.send_personal(7, notification(serde_json::json!({}))).await;
    assert_eq!(delivered, 2);
    assert!(rx_a.recv().await.is_ok());
    assert!(rx_b.recv().await.is_ok());
}

#[tokio::test]
async fn broken_sessions_are_removed_on_send() {
    let hub = Hub::new();
    let (_, rx) = hub.attach(1).await;
    drop(rx);

    let delivered = hub.send_personal(1, notification(serde_json::json!({}))).await;
    assert_eq!(delivered, 0);
    assert_eq!(hub.stats().await.total_connections, 0);
}

#[tokio::test]
async fn subscriptions_survive_reconnect() {
    let hub = Hub::new();
    let (session_id, rx) = hub.attach(3).await;
    let channel = repository_channel("acme/widget");
    hub.subscribe_channel(3, &channel).await;
    drop(rx);
    hub.detach(3, session_id).await;

    // New session, same user: channel set still includes the repository.
    let (_, mut rx) = hub.attach(3).await;
    rx.recv().await.unwrap();
    let channels = hub.user_channels(3).await;
    assert!(channels.contains(&channel));

    let delivered = hub
        .broadcast_channel(&channel, notification(serde_json::json!({})))
        .await;
    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn announce_reaches_all_connected_users() {
    let hub = Hub::new();
    let (_, mut rx1) = hub.attach(1).await;
    let (_, mut rx2) = hub.attach(2).await;
    rx1.recv().await.unwrap();
    rx2.recv().await.unwrap();

    let message = ServerMessage::SystemAnnouncement {
        notification_id: uuid::Uuid::new_v4(),
        data: serde_json::json!({"message": "maintenance at noon"}),
        timestamp: chrono::Utc::now(),
    };
    let delivered = hub.announce(message).await;
    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn progress_flows_to_the_watcher_and_clears_at_completion() {
    let hub = Hub::new();
    let (_, mut rx) = hub.attach(5).await;
    rx.recv().await.unwrap();

    hub.watch_progress("report_9", 5).await;
    hub.push_progress("report_9", 50, "running", "collecting", None).await;
    hub.push_progress("report_9", 100, "completed", "done", Some(serde_json::json!({"report_id": 9})))
        .await;

    match rx.recv().await.unwrap() {
        ServerMessage::ProgressUpdate { progress, status, .. } => {
            assert_eq!(progress, 50);
            assert_eq!(status, "running");
        }
        other => panic!("unexpected frame: {other:?}"),
    }
    match rx.recv().await.unwrap() {
        ServerMessage::ProgressUpdate { progress, data, .. } => {
            assert_eq!(progress, 100);
            assert_eq!(data.unwrap()["report_id"], 9);
        }
        other => panic!("unexpected frame: {other:?}"),
    }

    // Watcher is gone; further pushes are dropped.
    hub.push_progress("report_9", 100, "completed", "done", None).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn rules_are_kept_per_user() {
    use sentinel_common::types::*;
    let hub = Hub::new();
    hub.add_rule(NotificationRule {
        id: "r1".to_string(),
        owner_user_id: 4,
        kind: RuleKind::Activity,
        conditions: RuleConditions::default(),
        actions: RuleActions {
            realtime: true,
            ..Default::default()
        },
        enabled: true,
    })
    .await;

    assert_eq!(hub.rules_for(4).await.len(), 1);
    assert!(hub.rules_for(5).await.is_empty());
    assert!(hub.remove_rule(4, "r1").await);
    assert!(!hub.remove_rule(4, "r1").await);
}
