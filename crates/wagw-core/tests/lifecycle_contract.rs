//! Architectural Contract Test: Engine Lifecycle
//!
//! Verifies connection handling and shutdown.
//!
//! Constraints verified:
//! - Transient disconnects are followed by a reconnect after the delay
//! - A logged-out session is never reconnected
//! - Reconnect can be disabled
//! - A hanging reconnect attempt is abandoned and rescheduled
//! - Shutdown terminates the engine and disconnects the client exactly once
//! - An ended event stream stops the engine

mod common;

use common::*;
use std::time::Duration;
use wagw_core::store::MemoryDeviceStore;
use wagw_core::traits::{DisconnectReason, SessionEvent};
use wagw_core::{GatewayEngine, GatewayEvent, SessionState, WebhookDispatcher};

const DEVICE: &str = "5511999999999:7@s.whatsapp.net";

#[tokio::test]
async fn transient_disconnect_reconnects() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let mut engine = RunningEngine::start(
        client.clone(),
        &store,
        RecordingSink::new(),
        test_config(),
    )
    .await;
    assert_eq!(client.connect_calls(), 1);

    client.emit(SessionEvent::Disconnected {
        reason: DisconnectReason::Transient,
    });
    settle().await;

    assert_eq!(client.connect_calls(), 2);
    assert_eq!(engine.ctx.current_state(), SessionState::Disconnected);
    assert!(engine.drain().contains(&GatewayEvent::ReconnectScheduled {
        attempt: 1,
        delay: Duration::from_millis(20),
    }));

    client.emit(SessionEvent::Connected);
    settle().await;
    assert_eq!(engine.ctx.current_state(), SessionState::Connected);

    engine.stop().await;
}

#[tokio::test]
async fn logged_out_is_not_reconnected() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let engine = RunningEngine::start(
        client.clone(),
        &store,
        RecordingSink::new(),
        test_config(),
    )
    .await;

    client.emit(SessionEvent::Disconnected {
        reason: DisconnectReason::LoggedOut,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client.connect_calls(), 1);
    assert_eq!(engine.ctx.current_state(), SessionState::Disconnected);

    let events = engine.stop().await;
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, GatewayEvent::ReconnectScheduled { .. }))
    );
}

#[tokio::test]
async fn reconnect_can_be_disabled() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let mut config = test_config();
    config.session.reconnect = false;
    let engine = RunningEngine::start(client.clone(), &store, RecordingSink::new(), config).await;

    client.emit(SessionEvent::Disconnected {
        reason: DisconnectReason::Transient,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client.connect_calls(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn connect_before_timer_cancels_reconnect() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let mut config = test_config();
    config.session.reconnect_delay_ms = 200;
    let engine = RunningEngine::start(client.clone(), &store, RecordingSink::new(), config).await;

    client.emit(SessionEvent::Disconnected {
        reason: DisconnectReason::Transient,
    });
    client.emit(SessionEvent::Connected);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(client.connect_calls(), 1);
    engine.stop().await;
}

#[tokio::test]
async fn hanging_reconnect_is_abandoned_and_rescheduled() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let mut config = test_config();
    config.session.connect_timeout_ms = 50;
    let mut engine = RunningEngine::start(
        client.clone(),
        &store,
        RecordingSink::new(),
        config,
    )
    .await;

    client.delay_connects(Duration::from_secs(30));
    client.emit(SessionEvent::Disconnected {
        reason: DisconnectReason::Transient,
    });
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(client.connect_calls() >= 3);
    assert!(engine.drain().contains(&GatewayEvent::ReconnectScheduled {
        attempt: 2,
        delay: Duration::from_millis(20),
    }));

    // Events are still processed between attempts.
    client.emit(SessionEvent::Connected);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.ctx.current_state(), SessionState::Connected);

    let calls = client.connect_calls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(client.connect_calls(), calls, "connected session is not reconnected");

    engine.stop().await;
}

#[tokio::test]
async fn shutdown_disconnects_exactly_once() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let engine = RunningEngine::start(
        client.clone(),
        &store,
        RecordingSink::new(),
        test_config(),
    )
    .await;

    let events = engine.stop().await;
    assert_eq!(client.disconnect_calls(), 1);
    assert_eq!(
        events.last(),
        Some(&GatewayEvent::Stopped {
            reason: "Shutdown signal".to_string()
        })
    );
}

#[tokio::test]
async fn closed_event_stream_stops_engine() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::paired(DEVICE);
    let (dispatcher, _worker) =
        WebhookDispatcher::spawn(RecordingSink::new(), 8, Default::default());
    let (engine, mut events) = GatewayEngine::new(client.clone(), &store, dispatcher, &test_config())
        .await
        .unwrap();

    let handle = tokio::spawn(async move {
        // Shutdown sender kept alive so only the stream can end the loop.
        let (_tx, rx) = tokio::sync::oneshot::channel();
        engine.run_with_shutdown(Some(rx)).await
    });
    settle().await;

    client.close_events();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine stops when the event stream ends")
        .unwrap()
        .unwrap();

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert_eq!(
        last,
        Some(GatewayEvent::Stopped {
            reason: "Event stream closed".to_string()
        })
    );
    assert_eq!(client.disconnect_calls(), 1);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let client = ControlledClient::new();
    let store = MemoryDeviceStore::new();
    let (dispatcher, _worker) =
        WebhookDispatcher::spawn(RecordingSink::new(), 8, Default::default());
    let mut config = test_config();
    config.webhook.url = "ftp://example.com".to_string();

    let result = GatewayEngine::new(client, &store, dispatcher, &config).await;
    assert!(matches!(result, Err(wagw_core::Error::Config(_))));
}
