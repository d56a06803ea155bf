/// Connection Registry
///
/// Maps each user to their open WebSocket sessions. It is the only source of
/// truth for reachability. Mutations for one user are serialized by the
/// DashMap shard lock, and every mutation that changes occupancy emits a
/// [`RegistryChange`] carrying a sequence number drawn under that same lock.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ServerEvent;
use crate::metrics;

/// Outbound channel of one session
pub type SessionSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub sequence: u64,
    sender: SessionSender,
}

impl SessionHandle {
    /// Push an event to this session. Fails only when the socket is gone.
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }
}

/// Occupancy signal consumed by the presence tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryChange {
    pub user_id: Uuid,
    pub occupancy: usize,
    pub sequence: u64,
}

pub struct ConnectionRegistry {
    sessions: DashMap<Uuid, Vec<SessionHandle>>,
    sequence: AtomicU64,
    changes: mpsc::UnboundedSender<RegistryChange>,
}

impl ConnectionRegistry {
    /// Create a registry and the receiving end of its change stream
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RegistryChange>) {
        let (changes, rx) = mpsc::unbounded_channel();
        (
            Self {
                sessions: DashMap::new(),
                sequence: AtomicU64::new(0),
                changes,
            },
            rx,
        )
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, change: RegistryChange) {
        if self.changes.send(change).is_err() {
            warn!(user_id = %change.user_id, "Presence consumer gone, registry change dropped");
        }
    }

    /// Register a new session for `user_id`
    pub fn add_session(&self, user_id: Uuid, sender: SessionSender) -> SessionId {
        let session_id = SessionId::new();
        let mut entry = self.sessions.entry(user_id).or_default();

        let sequence = self.next_sequence();
        entry.push(SessionHandle {
            session_id,
            user_id,
            connected_at: Utc::now(),
            sequence,
            sender,
        });
        let occupancy = entry.len();
        self.emit(RegistryChange {
            user_id,
            occupancy,
            sequence,
        });
        drop(entry);

        metrics::session_opened();
        debug!(%user_id, %session_id, occupancy, sequence, "Session added");
        session_id
    }

    /// Remove one session. Unknown sessions are a no-op and emit nothing.
    pub fn remove_session(&self, user_id: Uuid, session_id: SessionId) -> bool {
        let Entry::Occupied(mut entry) = self.sessions.entry(user_id) else {
            return false;
        };

        let sessions = entry.get_mut();
        let Some(pos) = sessions.iter().position(|s| s.session_id == session_id) else {
            return false;
        };
        sessions.swap_remove(pos);

        let occupancy = sessions.len();
        let sequence = self.next_sequence();
        self.emit(RegistryChange {
            user_id,
            occupancy,
            sequence,
        });
        if occupancy == 0 {
            entry.remove();
        }

        metrics::session_closed();
        debug!(%user_id, %session_id, occupancy, sequence, "Session removed");
        true
    }

    /// Snapshot of the user's sessions; sending happens outside the lock
    pub fn sessions_for(&self, user_id: Uuid) -> Vec<SessionHandle> {
        self.sessions
            .get(&user_id)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn all_sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session_count_for(&self, user_id: Uuid) -> usize {
        self.sessions.get(&user_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn channel() -> (SessionSender, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_add_and_remove_session() {
        let (registry, mut changes) = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = channel();

        let sid = registry.add_session(user, tx);
        assert!(registry.is_online(user));
        assert_eq!(registry.sessions_for(user).len(), 1);

        assert!(registry.remove_session(user, sid));
        assert!(!registry.is_online(user));
        assert_eq!(registry.user_count(), 0);

        let first = changes.recv().await.unwrap();
        let second = changes.recv().await.unwrap();
        assert_eq!(first.occupancy, 1);
        assert_eq!(second.occupancy, 0);
        assert!(second.sequence > first.sequence);
    }

    #[tokio::test]
    async fn test_multiple_sessions_per_user() {
        let (registry, _changes) = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let s1 = registry.add_session(user, tx1);
        let _s2 = registry.add_session(user, tx2);
        assert_eq!(registry.session_count_for(user), 2);

        registry.remove_session(user, s1);
        assert!(registry.is_online(user));
        assert_eq!(registry.session_count_for(user), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_session_is_silent() {
        let (registry, mut changes) = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        assert!(!registry.remove_session(user, SessionId::new()));
        assert!(!registry.is_online(user));

        let (tx, _rx) = channel();
        registry.add_session(user, tx);
        assert!(!registry.remove_session(user, SessionId::new()));

        // Only the add produced a signal.
        assert_eq!(changes.recv().await.unwrap().occupancy, 1);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sequences_strictly_increase_under_concurrency() {
        let (registry, mut changes) = ConnectionRegistry::new();
        let registry = Arc::new(registry);
        let user = Uuid::new_v4();

        let mut handles = vec![];
        for _ in 0..20 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::unbounded_channel();
                let sid = registry.add_session(user, tx);
                registry.remove_session(user, sid);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!registry.is_online(user));

        let mut seen = vec![];
        while let Ok(change) = changes.try_recv() {
            seen.push(change);
        }
        assert_eq!(seen.len(), 40);
        // Channel order equals sequence order for one user.
        assert!(seen.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(seen.last().unwrap().occupancy, 0);
    }
}
