use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;

fn policy(jitter: f64) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1000),
        max_delay: Duration::from_millis(30000),
        exponential: true,
        jitter,
    }
}

/// Millisecond delays so the retry loop finishes quickly.
fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential: true,
        jitter: 0.0,
    }
}

fn snapshot() -> RoomStateSnapshot {
    RoomStateSnapshot {
        room_id: "room-1".into(),
        local_peer_id: "p1".into(),
        display_name: "Ada".into(),
        peers: Vec::new(),
        ai_session_active: false,
        timestamp: 1,
    }
}

// -- Backoff ------------------------------------------------------------------

#[test]
fn exponential_delay_doubles_and_caps() {
    let p = policy(0.0);
    assert_eq!(calculate_reconnection_delay(1, &p), Duration::from_millis(1000));
    assert_eq!(calculate_reconnection_delay(3, &p), Duration::from_millis(4000));
    assert_eq!(calculate_reconnection_delay(10, &p), Duration::from_millis(30000));
    assert_eq!(calculate_reconnection_delay(200, &p), Duration::from_millis(30000));
}

#[test]
fn linear_delay_grows_by_base() {
    let p = ReconnectPolicy {
        exponential: false,
        ..policy(0.0)
    };
    assert_eq!(calculate_reconnection_delay(3, &p), Duration::from_millis(3000));
    assert_eq!(calculate_reconnection_delay(50, &p), Duration::from_millis(30000));
}

#[test]
fn jitter_stays_within_fraction() {
    let p = policy(0.3);
    for _ in 0..200 {
        let d = calculate_reconnection_delay(3, &p).as_millis();
        assert!((2800..=5200).contains(&d), "delay {d} outside 4000 ± 30%");
    }
}

#[test]
fn non_recoverable_keywords_are_detected() {
    for e in NON_RECOVERABLE_KEYWORDS {
        assert!(!is_recoverable_error(e));
        assert!(!should_reconnect(0, 10, Some(e)));
    }
    assert!(!is_recoverable_error("401 Unauthorized"));
    assert!(!is_recoverable_error("server says: ROOM_CLOSED"));
    assert!(is_recoverable_error("connection reset by peer"));
}

#[test]
fn should_reconnect_respects_attempt_limit() {
    assert!(should_reconnect(0, 5, None));
    assert!(should_reconnect(4, 5, Some("timeout")));
    assert!(!should_reconnect(5, 5, Some("timeout")));
}

#[test]
fn policy_from_config() {
    let p = ReconnectPolicy::default();
    assert_eq!(p.max_attempts, 5);
    assert_eq!(p.base_delay, Duration::from_millis(1000));
    assert!(p.exponential);
}

// -- Manager ------------------------------------------------------------------

#[tokio::test]
async fn succeeds_after_transient_failures() {
    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&states);
    let mut m = ReconnectionManager::new(ConnectionKind::AiSession, fast_policy(5))
        .on_status(Arc::new(move |s: &ReconnectionStatus| {
            seen.lock().unwrap().push(s.state);
        }));

    let calls = AtomicU32::new(0);
    let result = m
        .start_reconnection(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("connection refused".to_string())
                    } else {
                        Ok(attempt * 10)
                    }
                }
            },
            Some("socket closed".into()),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result, Ok((30, 3)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(m.status().state, ReconnectState::Success);
    assert_eq!(m.status().history.len(), 3);
    assert_eq!(m.status().history[0].error.as_deref(), Some("connection refused"));
    assert_eq!(m.status().history[2].error, None);

    let states = states.lock().unwrap();
    assert_eq!(states.first(), Some(&ReconnectState::Waiting));
    assert_eq!(states.last(), Some(&ReconnectState::Success));
    assert!(states.contains(&ReconnectState::Reconnecting));
}

#[tokio::test]
async fn exhausts_attempts() {
    let mut m = ReconnectionManager::new(ConnectionKind::Signaling, fast_policy(3));
    let result: Result<((), u32), _> = m
        .start_reconnection(
            |_| async { Err("timeout".to_string()) },
            None,
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(result, Err(ReconnectError::Exhausted { attempts: 3 }));
    assert_eq!(m.status().state, ReconnectState::Failed);
    assert_eq!(m.status().attempt, 3);
    assert_eq!(m.status().last_error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn non_recoverable_cause_skips_all_attempts() {
    let mut m = ReconnectionManager::new(ConnectionKind::Signaling, fast_policy(5));
    let calls = AtomicU32::new(0);
    let result: Result<((), u32), _> = m
        .start_reconnection(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            Some("kicked by owner".into()),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(ReconnectError::NonRecoverable(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(m.status().state, ReconnectState::Failed);
}

#[tokio::test]
async fn non_recoverable_attempt_error_stops_retrying() {
    let mut m = ReconnectionManager::new(ConnectionKind::Signaling, fast_policy(5));
    let calls = AtomicU32::new(0);
    let result: Result<((), u32), _> = m
        .start_reconnection(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("room_not_found".to_string()) }
            },
            None,
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(
        result,
        Err(ReconnectError::NonRecoverable("room_not_found".into()))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_stops_the_loop() {
    let mut m = ReconnectionManager::new(
        ConnectionKind::AiSession,
        ReconnectPolicy {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
            ..fast_policy(5)
        },
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result: Result<((), u32), _> = m
        .start_reconnection(|_| async { Ok(()) }, None, &cancel)
        .await;
    assert_eq!(result, Err(ReconnectError::Cancelled));
    assert_eq!(m.status().state, ReconnectState::Failed);
}

#[tokio::test]
async fn primary_success_restores_snapshot() {
    let restored = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&restored);
    let mut m = ReconnectionManager::new(ConnectionKind::Signaling, fast_policy(2)).on_restore(
        Arc::new(move |s: &RoomStateSnapshot| {
            *sink.lock().unwrap() = Some(s.clone());
        }),
    );
    m.save_room_state(snapshot());
    let result: Result<((), u32), _> = m
        .start_reconnection(|_| async { Ok(()) }, None, &CancellationToken::new())
        .await;
    assert!(result.is_ok());
    assert_eq!(restored.lock().unwrap().as_ref(), Some(&snapshot()));
    assert_eq!(m.get_saved_room_state(), Some(&snapshot()));
    m.clear_room_state();
    assert!(m.get_saved_room_state().is_none());
}

#[tokio::test]
async fn secondary_connection_does_not_restore() {
    let restored = Arc::new(AtomicU32::new(0));
    let count = Arc::clone(&restored);
    let mut m = ReconnectionManager::new(ConnectionKind::AiSession, fast_policy(2)).on_restore(
        Arc::new(move |_: &RoomStateSnapshot| {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    m.save_room_state(snapshot());
    let _: Result<((), u32), _> = m
        .start_reconnection(|_| async { Ok(()) }, None, &CancellationToken::new())
        .await;
    assert_eq!(restored.load(Ordering::SeqCst), 0);
}

#[test]
fn reset_returns_to_idle() {
    let mut m = ReconnectionManager::new(ConnectionKind::Signaling, fast_policy(2));
    m.save_room_state(snapshot());
    m.reset();
    assert_eq!(m.status().state, ReconnectState::Idle);
    assert!(m.get_saved_room_state().is_some());
}

#[test]
fn status_serializes_kind_in_kebab_case() {
    let m = ReconnectionManager::new(ConnectionKind::WebrtcPeer, fast_policy(2));
    let json = serde_json::to_value(m.status()).unwrap();
    assert_eq!(json["kind"], "webrtc-peer");
    assert_eq!(json["state"], "idle");
    assert_eq!(json["maxAttempts"], 2);
}

// -- Per-peer -----------------------------------------------------------------

#[tokio::test]
async fn peer_managers_are_independent() {
    let mut peers = PeerReconnections::new(fast_policy(2));
    peers.manager("a");
    peers.manager("b");
    assert_eq!(peers.len(), 2);

    let mut a = peers.take("a");
    let result: Result<((), u32), _> = a
        .start_reconnection(
            |_| async { Err("ice failed".to_string()) },
            None,
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_err());
    peers.put_back("a", a);

    assert_eq!(peers.status("a").unwrap().state, ReconnectState::Failed);
    assert_eq!(peers.status("b").unwrap().state, ReconnectState::Idle);
    assert_eq!(peers.manager("a").kind(), ConnectionKind::WebrtcPeer);

    assert!(peers.remove("a"));
    assert!(!peers.remove("a"));
    assert_eq!(peers.statuses().count(), 1);
}
