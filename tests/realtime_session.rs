mod common;

use common::{MockConnector, RecordingAlerts, RecordingCache, settle, test_config};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use wallet_realtime_sync::{
    CacheInvalidationAdapter, ForegroundFlag, NotificationBridge, RealtimeSync, Severity,
    StaticToken, SyncError,
};

struct Harness {
    sync: RealtimeSync,
    connector: MockConnector,
    foreground: Arc<ForegroundFlag>,
    alerts: Arc<RecordingAlerts>,
    cache: Arc<RecordingCache>,
}

async fn connected() -> Harness {
    let connector = MockConnector::new();
    let foreground = Arc::new(ForegroundFlag::new(true));
    let alerts = Arc::new(RecordingAlerts::default());
    let cache = Arc::new(RecordingCache::default());

    let sync = RealtimeSync::init(
        test_config(),
        Arc::new(connector.clone()),
        foreground.clone(),
        alerts.clone(),
        cache.clone(),
    )
    .unwrap();
    sync.connect(Arc::new(StaticToken::new("abc"))).await.unwrap();

    Harness {
        sync,
        connector,
        foreground,
        alerts,
        cache,
    }
}

const BALANCE_UPDATE: &str =
    r#"{"type":"balance_update","payload":{"balance":"12.5","currency":"USDT"}}"#;

#[tokio::test(start_paused = true)]
async fn balance_update_reaches_subscriber_cache_and_alerts() {
    let h = connected().await;
    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let _subscription = {
        let seen = seen.clone();
        h.sync.subscribe("balance_update", move |envelope| {
            seen.lock().unwrap().push(envelope.payload.clone());
            Ok(())
        })
    };

    h.connector.latest_server().push(BALANCE_UPDATE);
    settle().await;

    assert_eq!(h.cache.signals(), vec!["balance"]);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![json!({ "payload": { "balance": "12.5", "currency": "USDT" } })]
    );

    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Info);
    assert_eq!(alerts[0].event_type, "balance_update");
}

#[tokio::test(start_paused = true)]
async fn background_still_invalidates_but_shows_nothing() {
    let h = connected().await;
    let server = h.connector.latest_server();

    server.push(BALANCE_UPDATE);
    settle().await;
    h.foreground.set(false);
    server.push(BALANCE_UPDATE);
    settle().await;

    assert_eq!(h.cache.signals(), vec!["balance", "balance"]);
    assert_eq!(h.alerts.alerts().len(), 1);
    assert_eq!(h.sync.notification_stats().suppressed, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_subscribers_do_not_block_others() {
    let h = connected().await;
    let delivered = Arc::new(Mutex::new(0));

    let _failing = h
        .sync
        .subscribe("packet_claimed", |_| Err(SyncError::handler("render failed")));
    let _panicking = h
        .sync
        .subscribe("packet_claimed", |_| panic!("subscriber bug"));
    let _counting = {
        let delivered = delivered.clone();
        h.sync.subscribe("packet_claimed", move |_| {
            *delivered.lock().unwrap() += 1;
            Ok(())
        })
    };

    h.connector
        .latest_server()
        .push(r#"{"type":"packet_claimed","payload":{"message":"Bob claimed 2 USDT"}}"#);
    settle().await;

    assert_eq!(*delivered.lock().unwrap(), 1);
    assert_eq!(h.cache.signals(), vec!["packets", "balance"]);
    assert_eq!(h.alerts.alerts()[0].message, "Bob claimed 2 USDT");
    assert_eq!(h.sync.dispatcher().stats().handler_failures, 2);
    assert!(h.sync.is_connected());
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_does_not_stop_the_stream() {
    let h = connected().await;
    let server = h.connector.latest_server();

    server.push("{not json");
    server.push(r#"{"payload":{"missing":"type"}}"#);
    server.push(r#"{"type":"new_message","payload":{"content":"gm"}}"#);
    settle().await;

    let stats = h.sync.dispatcher().stats();
    assert_eq!(stats.decode_failures, 2);
    assert_eq!(stats.frames_decoded, 1);
    assert_eq!(h.cache.signals(), vec!["messages"]);
    assert!(h.sync.is_connected());
}

#[tokio::test(start_paused = true)]
async fn unknown_events_reach_wildcard_subscribers_only() {
    let h = connected().await;
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let _all = {
        let seen = seen.clone();
        h.sync.subscribe("*", move |envelope| {
            seen.lock().unwrap().push(envelope.event_type.clone());
            Ok(())
        })
    };

    h.connector
        .latest_server()
        .push(r#"{"type":"leaderboard_changed","rank":3}"#);
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec!["leaderboard_changed"]);
    assert!(h.cache.signals().is_empty());
    assert!(h.alerts.alerts().is_empty());
    assert_eq!(h.sync.invalidation_stats().ignored_events, 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_subscription_stops_delivery() {
    let h = connected().await;
    let count = Arc::new(Mutex::new(0));
    let subscription = {
        let count = count.clone();
        h.sync.subscribe("notification", move |_| {
            *count.lock().unwrap() += 1;
            Ok(())
        })
    };

    let server = h.connector.latest_server();
    server.push(r#"{"type":"notification","title":"Hi"}"#);
    settle().await;
    assert!(subscription.unsubscribe());
    server.push(r#"{"type":"notification","title":"Again"}"#);
    settle().await;

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(h.cache.signals(), vec!["notifications", "notifications"]);
}

#[tokio::test(start_paused = true)]
async fn force_refresh_works_without_a_connection() {
    let cache = Arc::new(RecordingCache::default());
    let sync = RealtimeSync::init(
        test_config(),
        Arc::new(MockConnector::new()),
        Arc::new(|| true),
        Arc::new(RecordingAlerts::default()),
        cache.clone(),
    )
    .unwrap();

    sync.force_refresh("packets");

    assert!(!sync.is_connected());
    assert_eq!(cache.signals(), vec!["packets"]);
    assert_eq!(sync.invalidation_stats().forced_refreshes, 1);
}

#[tokio::test(start_paused = true)]
async fn custom_tables_are_honored() {
    let connector = MockConnector::new();
    let alerts = Arc::new(RecordingAlerts::default());
    let cache = Arc::new(RecordingCache::default());

    let sync = RealtimeSync::with_bridges(
        test_config(),
        Arc::new(connector.clone()),
        NotificationBridge::new(Arc::new(|| true), alerts.clone())
            .with_rule("withdrawal_failed", Severity::Error),
        CacheInvalidationAdapter::new(cache.clone())
            .with_mapping("withdrawal_failed", ["balance", "history"]),
    )
    .unwrap();
    sync.connect(Arc::new(StaticToken::new("abc"))).await.unwrap();

    connector
        .latest_server()
        .push(r#"{"type":"withdrawal_failed","message":"Insufficient gas"}"#);
    settle().await;

    assert_eq!(cache.signals(), vec!["balance", "history"]);
    let alerts = alerts.alerts();
    assert_eq!(alerts[0].severity, Severity::Error);
    assert_eq!(alerts[0].message, "Insufficient gas");
}

#[tokio::test(start_paused = true)]
async fn send_goes_through_the_root() {
    let h = connected().await;

    h.sync.send(r#"{"type":"subscribe","topic":"packets"}"#).await;
    h.sync.disconnect("logout").await;

    assert_eq!(
        h.connector.latest_server().texts(),
        vec![r#"{"type":"subscribe","topic":"packets"}"#]
    );
    assert!(!h.sync.is_connected());
    h.sync.shutdown().await;
}
