mod common;

use std::sync::Arc;

use common::{connect, drain, harness, next_matching, user_status_for, wait_for};
use realtime_service::services::{EventRouter, PresenceTracker};
use realtime_service::websocket::{ConnectionRegistry, RegistryChange};
use realtime_service::{MemoryStore, ServerEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

#[tokio::test]
async fn test_first_session_broadcasts_online_with_profile() {
    let h = harness();
    let observer = Uuid::new_v4();
    let bob = Uuid::new_v4();
    h.store.insert_user(bob, "Bob", Some("https://cdn.example/bob.png"));

    let (_, mut observer_rx) = connect(&h.state, observer);
    let (_, _bob_rx) = connect(&h.state, bob);

    let event = next_matching(&mut observer_rx, user_status_for(bob))
        .await
        .expect("observer should hear bob come online");
    match event {
        ServerEvent::UserStatus {
            online,
            display_name,
            avatar_url,
            ..
        } => {
            assert!(online);
            assert_eq!(display_name, "Bob");
            assert_eq!(avatar_url.as_deref(), Some("https://cdn.example/bob.png"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(wait_for(|| h.state.presence.is_online(bob)).await);
}

#[tokio::test]
async fn test_second_session_and_partial_disconnect_are_silent() {
    let h = harness();
    let observer = Uuid::new_v4();
    let user = Uuid::new_v4();

    let (_, mut observer_rx) = connect(&h.state, observer);
    let (first, _rx1) = connect(&h.state, user);
    assert!(next_matching(&mut observer_rx, user_status_for(user)).await.is_some());

    let (_, _rx2) = connect(&h.state, user);
    assert!(h.state.registry.remove_session(user, first));

    // Signals are handled in order, so once the sentinel is announced
    // both of the user's signals have been processed.
    let sentinel = Uuid::new_v4();
    let (_, _sentinel_rx) = connect(&h.state, sentinel);
    let mut seen = Vec::new();
    loop {
        let event = next_matching(&mut observer_rx, |_| true)
            .await
            .expect("sentinel status");
        if user_status_for(sentinel)(&event) {
            break;
        }
        seen.push(event);
    }

    let extra: Vec<_> = seen
        .into_iter()
        .filter(|e| user_status_for(user)(e))
        .collect();
    assert!(extra.is_empty(), "no broadcast expected, got {extra:?}");
    assert!(h.state.presence.is_online(user));
}

#[tokio::test]
async fn test_last_disconnect_broadcasts_offline_and_persists() {
    let h = harness();
    let observer = Uuid::new_v4();
    let user = Uuid::new_v4();

    let (_, mut observer_rx) = connect(&h.state, observer);
    let (session, _rx) = connect(&h.state, user);
    next_matching(&mut observer_rx, user_status_for(user)).await;

    h.state.registry.remove_session(user, session);
    let event = next_matching(&mut observer_rx, user_status_for(user))
        .await
        .expect("offline broadcast");
    match event {
        ServerEvent::UserStatus {
            online,
            display_name,
            ..
        } => {
            assert!(!online);
            // No profile stored for this user.
            assert_eq!(display_name, "Someone");
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert!(
        wait_for(|| {
            let log: Vec<bool> = h
                .store
                .presence_log()
                .into_iter()
                .filter(|(id, _, _)| *id == user)
                .map(|(_, online, _)| online)
                .collect();
            log == vec![true, false]
        })
        .await
    );
}

#[tokio::test]
async fn test_out_of_order_signals_resolve_to_latest() {
    let (registry, _changes) = ConnectionRegistry::new();
    let registry = Arc::new(registry);
    let (tx, mut observer_rx) = mpsc::unbounded_channel();
    registry.add_session(Uuid::new_v4(), tx);

    let store = Arc::new(MemoryStore::new());
    let tracker = PresenceTracker::new(EventRouter::new(registry), store.clone());
    let user = Uuid::new_v4();

    // connect(1), disconnect(2), connect(3) arriving as 1, 3, 2
    for (occupancy, sequence) in [(1, 1), (1, 3), (0, 2)] {
        tracker
            .handle_change(RegistryChange {
                user_id: user,
                occupancy,
                sequence,
            })
            .await;
    }

    assert!(tracker.is_online(user));
    assert_eq!(tracker.state(user).map(|s| s.last_sequence), Some(3));

    let statuses: Vec<_> = drain(&mut observer_rx)
        .into_iter()
        .filter(|e| user_status_for(user)(e))
        .collect();
    assert_eq!(statuses.len(), 1);
    assert_eq!(store.presence_log().len(), 1);
}

#[tokio::test]
async fn test_duplicate_sequence_is_ignored() {
    let (registry, _changes) = ConnectionRegistry::new();
    let tracker = PresenceTracker::new(
        EventRouter::new(Arc::new(registry)),
        Arc::new(MemoryStore::new()),
    );
    let user = Uuid::new_v4();

    let online = RegistryChange {
        user_id: user,
        occupancy: 1,
        sequence: 7,
    };
    assert!(tracker.apply(online).is_some());
    assert!(tracker
        .apply(RegistryChange {
            occupancy: 0,
            ..online
        })
        .is_none());
    assert!(tracker.is_online(user));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_settles_on_registry_state() {
    let h = harness();
    let user = Uuid::new_v4();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let state = h.state.clone();
        tasks.push(tokio::spawn(async move {
            let (tx, _rx) = mpsc::unbounded_channel();
            let session = state.registry.add_session(user, tx);
            tokio::task::yield_now().await;
            state.registry.remove_session(user, session);
        }));
    }
    for task in tasks {
        task.await.expect("churn task panicked");
    }

    assert!(!h.state.registry.is_online(user));
    assert!(wait_for(|| !h.state.presence.is_online(user)).await);

    let (_, _rx) = connect(&h.state, user);
    assert!(wait_for(|| h.state.presence.is_online(user)).await);
    assert_eq!(h.state.registry.session_count_for(user), 1);
}
