#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use realtime_service::config::{Config, PushConfig};
use realtime_service::services::{DeliveryAttempt, GatewayMessage, PushGateway, PushOutcome};
use realtime_service::websocket::{ServerEvent, SessionId};
use realtime_service::{AppState, MemoryStore};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Gateway whose per-token outcomes are scripted by the test.
/// Unscripted sends succeed.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<HashMap<String, VecDeque<PushOutcome>>>,
    sent: Mutex<Vec<GatewayMessage>>,
    batches: Mutex<Vec<usize>>,
    delay: Mutex<Option<Duration>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, token: &str, outcomes: Vec<PushOutcome>) {
        self.script
            .lock()
            .insert(token.to_string(), outcomes.into_iter().collect());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn sent(&self) -> Vec<GatewayMessage> {
        self.sent.lock().clone()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl PushGateway for MockGateway {
    async fn send_batch(&self, messages: &[GatewayMessage]) -> Vec<PushOutcome> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.batches.lock().push(messages.len());
        let mut script = self.script.lock();
        let mut sent = self.sent.lock();
        messages
            .iter()
            .map(|m| {
                sent.push(m.clone());
                script
                    .get_mut(&m.token)
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(PushOutcome::Delivered)
            })
            .collect()
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
}

pub fn fast_push_config() -> PushConfig {
    PushConfig {
        batch_size: 10,
        flush_interval_ms: 5,
        max_attempts: 3,
        backoff_ms: 5,
        max_backoff_ms: 20,
        gateway_timeout_ms: 500,
        ..PushConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(fast_push_config())
}

pub fn harness_with(push: PushConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new());
    let config = Config {
        push,
        ..Config::default()
    };
    let state = AppState::new(store.clone(), gateway.clone(), &config);
    Harness {
        state,
        store,
        gateway,
    }
}

/// Register a session directly, as the WebSocket actor does on `setup`
pub fn connect(state: &AppState, user_id: Uuid) -> (SessionId, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = state.registry.add_session(user_id, tx);
    (session_id, rx)
}

/// Poll `cond` until it holds or two seconds pass
pub async fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Next event matching `pred`, skipping others
pub async fn next_matching<F>(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    pred: F,
) -> Option<ServerEvent>
where
    F: Fn(&ServerEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) if pred(&event) => return Some(event),
            Ok(Some(_)) => continue,
            _ => return None,
        }
    }
}

/// Everything currently buffered on the channel
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the next attempt that ends its request
pub async fn final_attempt(rx: &mut broadcast::Receiver<DeliveryAttempt>) -> DeliveryAttempt {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let attempt = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for push attempt")
            .expect("attempt stream closed");
        if attempt.outcome.is_final() {
            return attempt;
        }
    }
}

pub fn user_status_for(user_id: Uuid) -> impl Fn(&ServerEvent) -> bool {
    move |event| matches!(event, ServerEvent::UserStatus { user_id: u, .. } if *u == user_id)
}
