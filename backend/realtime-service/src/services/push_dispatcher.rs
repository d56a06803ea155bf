/// Push Dispatcher
///
/// Fallback delivery for recipients without a live session.
///
/// Architecture:
/// 1. `enqueue` drops the request on an unbounded queue and returns at once
/// 2. A single worker drains the queue into batches (bounded size, bounded linger)
/// 3. Tokens are resolved per item at flush time; no token means a skipped attempt
/// 4. The gateway call runs under a timeout; a timeout counts as transient
/// 5. Transient failures are re-queued after exponential backoff
/// 6. Invalid tokens are deleted and the attempt fails without retry
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::push_gateway::{GatewayMessage, PushGateway, PushOutcome};
use crate::config::PushConfig;
use crate::metrics;
use crate::models::DeliveryStatus;
use crate::repository::Store;

const ATTEMPT_EVENTS_CAPACITY: usize = 1024;

/// A push to one user, optionally backing a message
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    /// When set, the message's delivery status follows the push result.
    pub message_id: Option<Uuid>,
}

/// Retry policy for transient push failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first send included
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

impl From<&PushConfig> for RetryPolicy {
    fn from(config: &PushConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_ms: config.backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows `attempt` (1-based)
    pub fn get_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let backoff = self.backoff_ms.saturating_mul(1_u64 << exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent,
    Retrying { next_attempt: u32, delay: Duration },
    Failed(String),
    TokenInvalidated,
    /// The user has no registered token
    Skipped,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Sent => "sent",
            AttemptOutcome::Retrying { .. } => "retrying",
            AttemptOutcome::Failed(_) => "failed",
            AttemptOutcome::TokenInvalidated => "token_invalidated",
            AttemptOutcome::Skipped => "skipped",
        }
    }

    /// No further attempt will follow
    pub fn is_final(&self) -> bool {
        !matches!(self, AttemptOutcome::Retrying { .. })
    }
}

/// Observable record of one attempt on one request
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub recipient_id: Uuid,
    pub message_id: Option<Uuid>,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Debug)]
struct QueuedPush {
    request: PushRequest,
    attempt: u32,
}

pub struct PushDispatcher {
    queue: mpsc::UnboundedSender<QueuedPush>,
    attempts: broadcast::Sender<DeliveryAttempt>,
}

impl PushDispatcher {
    /// Spawn the worker. It stops once the dispatcher is dropped and the
    /// queue drains.
    pub fn start(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PushGateway>,
        config: &PushConfig,
    ) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::unbounded_channel();
        let (attempts, _) = broadcast::channel(ATTEMPT_EVENTS_CAPACITY);

        let worker = PushWorker {
            rx,
            requeue: queue.downgrade(),
            store,
            gateway,
            policy: RetryPolicy::from(config),
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval(),
            gateway_timeout: config.gateway_timeout(),
            attempts: attempts.clone(),
        };
        let handle = tokio::spawn(worker.run());

        (Self { queue, attempts }, handle)
    }

    /// Never blocks. Returns `false` only if the worker has stopped.
    pub fn enqueue(&self, request: PushRequest) -> bool {
        let recipient_id = request.recipient_id;
        match self.queue.send(QueuedPush {
            request,
            attempt: 1,
        }) {
            Ok(()) => {
                debug!(%recipient_id, "Push request enqueued");
                true
            }
            Err(_) => {
                error!(%recipient_id, "Push worker stopped, request dropped");
                false
            }
        }
    }

    /// Stream of attempt records, for observers and tests
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryAttempt> {
        self.attempts.subscribe()
    }
}

struct PushWorker {
    rx: mpsc::UnboundedReceiver<QueuedPush>,
    requeue: mpsc::WeakUnboundedSender<QueuedPush>,
    store: Arc<dyn Store>,
    gateway: Arc<dyn PushGateway>,
    policy: RetryPolicy,
    batch_size: usize,
    flush_interval: Duration,
    gateway_timeout: Duration,
    attempts: broadcast::Sender<DeliveryAttempt>,
}

impl PushWorker {
    async fn run(mut self) {
        info!(
            batch_size = self.batch_size,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "Push worker started"
        );

        while let Some(first) = self.rx.recv().await {
            let mut batch = vec![first];
            let deadline = Instant::now() + self.flush_interval;

            while batch.len() < self.batch_size {
                match timeout_at(deadline, self.rx.recv()).await {
                    Ok(Some(item)) => batch.push(item),
                    Ok(None) | Err(_) => break,
                }
            }

            self.flush(batch).await;
        }

        info!("Push worker stopped");
    }

    async fn flush(&self, batch: Vec<QueuedPush>) {
        let mut ready = Vec::with_capacity(batch.len());
        let mut messages = Vec::with_capacity(batch.len());

        for item in batch {
            match self.store.get_push_token(item.request.recipient_id).await {
                Ok(Some(token)) => {
                    messages.push(GatewayMessage {
                        token,
                        title: item.request.title.clone(),
                        body: item.request.body.clone(),
                        data: item.request.data.clone(),
                    });
                    ready.push(item);
                }
                Ok(None) => {
                    debug!(recipient_id = %item.request.recipient_id, "No push token, skipping");
                    self.finish(&item, AttemptOutcome::Skipped).await;
                }
                Err(e) => {
                    warn!(recipient_id = %item.request.recipient_id, error = %e, "Push token lookup failed");
                    self.retry_or_fail(item, e.to_string()).await;
                }
            }
        }

        if ready.is_empty() {
            return;
        }

        let outcomes = match timeout(self.gateway_timeout, self.gateway.send_batch(&messages)).await {
            Ok(outcomes) if outcomes.len() == ready.len() => outcomes,
            Ok(outcomes) => {
                error!(
                    expected = ready.len(),
                    got = outcomes.len(),
                    "Gateway returned wrong number of outcomes"
                );
                vec![PushOutcome::TransientFailure("outcome count mismatch".to_string()); ready.len()]
            }
            Err(_) => {
                warn!(count = ready.len(), "Gateway batch timed out");
                vec![PushOutcome::TransientFailure("gateway timeout".to_string()); ready.len()]
            }
        };

        for ((item, message), outcome) in ready.into_iter().zip(messages).zip(outcomes) {
            match outcome {
                PushOutcome::Delivered => self.finish(&item, AttemptOutcome::Sent).await,
                PushOutcome::TransientFailure(reason) => self.retry_or_fail(item, reason).await,
                PushOutcome::InvalidToken(reason) => {
                    let user_id = item.request.recipient_id;
                    warn!(%user_id, reason = %reason, "Push token permanently invalid, removing");
                    if let Err(e) = self.store.delete_push_token(user_id, &message.token).await {
                        error!(%user_id, error = %e, "Failed to delete invalid push token");
                    }
                    self.finish(&item, AttemptOutcome::TokenInvalidated).await;
                }
                PushOutcome::Rejected(reason) => {
                    warn!(recipient_id = %item.request.recipient_id, reason = %reason, "Push rejected");
                    self.finish(&item, AttemptOutcome::Failed(reason)).await;
                }
            }
        }
    }

    async fn retry_or_fail(&self, mut item: QueuedPush, reason: String) {
        if !self.policy.should_retry(item.attempt) {
            warn!(
                recipient_id = %item.request.recipient_id,
                attempts = item.attempt,
                reason = %reason,
                "Push retries exhausted"
            );
            self.finish(&item, AttemptOutcome::Failed(reason)).await;
            return;
        }

        let delay = self.policy.get_backoff(item.attempt);
        self.report(
            &item,
            AttemptOutcome::Retrying {
                next_attempt: item.attempt + 1,
                delay,
            },
        );
        item.attempt += 1;

        let requeue = self.requeue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let recipient_id = item.request.recipient_id;
            let requeued = match requeue.upgrade() {
                Some(queue) => queue.send(item).is_ok(),
                None => false,
            };
            if !requeued {
                warn!(%recipient_id, "Push worker stopped before retry");
            }
        });
    }

    /// Record a final outcome and move the backing message forward
    async fn finish(&self, item: &QueuedPush, outcome: AttemptOutcome) {
        if let Some(message_id) = item.request.message_id {
            let status = if outcome == AttemptOutcome::Sent {
                DeliveryStatus::PushSent
            } else {
                DeliveryStatus::PushFailed
            };
            match self.store.update_message_status(message_id, status).await {
                Ok(true) => {}
                Ok(false) => debug!(%message_id, status = status.as_str(), "Message status already final"),
                Err(e) => error!(%message_id, error = %e, "Failed to update message status"),
            }
        }
        self.report(item, outcome);
    }

    fn report(&self, item: &QueuedPush, outcome: AttemptOutcome) {
        metrics::record_push_attempt(outcome.label());
        // No subscribers is fine.
        let _ = self.attempts.send(DeliveryAttempt {
            recipient_id: item.request.recipient_id,
            message_id: item.request.message_id,
            attempt: item.attempt,
            outcome,
        });
    }
}
