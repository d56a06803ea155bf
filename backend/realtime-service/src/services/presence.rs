/// Presence Tracker
///
/// Derives online/offline from registry occupancy. Signals carry the sequence
/// number drawn when the registry mutated, and a signal is applied only if it
/// is newer than the last one applied for that user. Late or reordered
/// signals therefore cannot flip a user back to a stale state.
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::EventRouter;
use crate::metrics;
use crate::models::UserSummary;
use crate::repository::Store;
use crate::websocket::{RegistryChange, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceState {
    pub online: bool,
    pub last_transition_at: DateTime<Utc>,
    pub last_sequence: u64,
}

/// An applied online/offline flip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTransition {
    pub user_id: Uuid,
    pub online: bool,
    pub at: DateTime<Utc>,
}

pub struct PresenceTracker {
    states: DashMap<Uuid, PresenceState>,
    router: EventRouter,
    store: Arc<dyn Store>,
    /// Dropped with the tracker, which closes every subscribed receiver.
    alive: watch::Sender<()>,
}

impl PresenceTracker {
    pub fn new(router: EventRouter, store: Arc<dyn Store>) -> Self {
        Self {
            states: DashMap::new(),
            router,
            store,
            alive: watch::channel(()).0,
        }
    }

    /// Consume registry changes until the tracker or the registry is dropped
    ///
    /// The tracker reaches the registry through its router, and the registry
    /// owns the change sender, so the task holds the tracker weakly.
    pub fn spawn(self: Arc<Self>, mut changes: mpsc::UnboundedReceiver<RegistryChange>) -> JoinHandle<()> {
        let mut alive = self.alive.subscribe();
        let tracker: Weak<Self> = Arc::downgrade(&self);
        drop(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = changes.recv() => {
                        let Some(change) = change else {
                            debug!("Registry change stream closed, presence tracker stopping");
                            break;
                        };
                        let Some(tracker) = tracker.upgrade() else { break };
                        tracker.handle_change(change).await;
                    }
                    // Nothing is ever sent, so this only resolves on drop.
                    _ = alive.changed() => {
                        debug!("Presence tracker dropped, stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Apply a signal to the state table. Returns the flip, if any.
    ///
    /// Runs under the user's shard lock and never awaits.
    pub fn apply(&self, change: RegistryChange) -> Option<PresenceTransition> {
        let now = Utc::now();
        let online = change.occupancy > 0;
        let mut state = self.states.entry(change.user_id).or_insert(PresenceState {
            online: false,
            last_transition_at: now,
            last_sequence: 0,
        });

        if change.sequence <= state.last_sequence {
            metrics::record_presence_signal("stale");
            debug!(
                user_id = %change.user_id,
                sequence = change.sequence,
                last_sequence = state.last_sequence,
                "Discarding stale presence signal"
            );
            return None;
        }
        state.last_sequence = change.sequence;

        if state.online == online {
            metrics::record_presence_signal("unchanged");
            return None;
        }

        state.online = online;
        state.last_transition_at = now;
        metrics::record_presence_signal(if online { "online" } else { "offline" });
        Some(PresenceTransition {
            user_id: change.user_id,
            online,
            at: now,
        })
    }

    /// Apply a signal and publish the resulting flip
    pub async fn handle_change(&self, change: RegistryChange) {
        if let Some(transition) = self.apply(change) {
            self.publish(transition).await;
        }
    }

    async fn publish(&self, transition: PresenceTransition) {
        let user = match self.store.get_user_profile(transition.user_id).await {
            Ok(Some(profile)) => UserSummary::from(profile),
            Ok(None) => UserSummary::fallback(transition.user_id),
            Err(e) => {
                warn!(user_id = %transition.user_id, error = %e, "Profile lookup failed for presence broadcast");
                UserSummary::fallback(transition.user_id)
            }
        };

        let reached = self.router.broadcast_all(ServerEvent::UserStatus {
            user_id: transition.user_id,
            online: transition.online,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        });
        info!(
            user_id = %transition.user_id,
            online = transition.online,
            sessions = reached,
            "Presence changed"
        );

        if let Err(e) = self
            .store
            .record_presence(transition.user_id, transition.online, transition.at)
            .await
        {
            warn!(user_id = %transition.user_id, error = %e, "Failed to persist presence");
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.states.get(&user_id).map(|s| s.online).unwrap_or(false)
    }

    pub fn state(&self, user_id: Uuid) -> Option<PresenceState> {
        self.states.get(&user_id).map(|s| *s)
    }
}
