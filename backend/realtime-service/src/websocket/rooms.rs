/// Typing rooms
///
/// Sessions join named rooms to receive ephemeral typing indicators from the
/// other members. Nothing here is persisted.
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{ServerEvent, SessionId, SessionSender};

#[derive(Debug, Clone)]
pub struct RoomMember {
    pub session_id: SessionId,
    pub user_id: Uuid,
    pub sender: SessionSender,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Vec<RoomMember>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent per session
    pub fn join(&self, room_id: &str, member: RoomMember) {
        let mut rooms = self.rooms.write();
        let members = rooms.entry(room_id.to_string()).or_default();
        if members.iter().all(|m| m.session_id != member.session_id) {
            debug!(room_id, session_id = %member.session_id, "Session joined room");
            members.push(member);
        }
    }

    /// Drop the session from every room it joined
    pub fn leave_all(&self, session_id: SessionId) {
        let mut rooms = self.rooms.write();
        rooms.retain(|_, members| {
            members.retain(|m| m.session_id != session_id);
            !members.is_empty()
        });
    }

    /// Forward `event` to every member of the room except `from`.
    /// Returns the number of sessions reached.
    pub fn forward(&self, room_id: &str, from: SessionId, event: ServerEvent) -> usize {
        let peers: Vec<SessionSender> = {
            let rooms = self.rooms.read();
            match rooms.get(room_id) {
                Some(members) => members
                    .iter()
                    .filter(|m| m.session_id != from)
                    .map(|m| m.sender.clone())
                    .collect(),
                None => return 0,
            }
        };

        peers
            .into_iter()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.read().get(room_id).map(Vec::len).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn member() -> (RoomMember, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, rx) = mpsc::unbounded_channel();
        (
            RoomMember {
                session_id: SessionId::new(),
                user_id: Uuid::new_v4(),
                sender,
            },
            rx,
        )
    }

    #[test]
    fn test_forward_skips_sender_session() {
        let rooms = RoomRegistry::new();
        let (alice, mut alice_rx) = member();
        let (bob, mut bob_rx) = member();
        let alice_session = alice.session_id;
        let alice_user = alice.user_id;

        rooms.join("chat-1", alice);
        rooms.join("chat-1", bob);

        let reached = rooms.forward(
            "chat-1",
            alice_session,
            ServerEvent::Typing {
                room_id: "chat-1".into(),
                user_id: alice_user,
            },
        );

        assert_eq!(reached, 1);
        assert!(matches!(bob_rx.try_recv(), Ok(ServerEvent::Typing { .. })));
        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn test_join_is_idempotent_and_leave_cleans_up() {
        let rooms = RoomRegistry::new();
        let (alice, _rx) = member();
        let session = alice.session_id;

        rooms.join("a", alice.clone());
        rooms.join("a", alice.clone());
        rooms.join("b", alice);
        assert_eq!(rooms.member_count("a"), 1);
        assert_eq!(rooms.room_count(), 2);

        rooms.leave_all(session);
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn test_forward_to_unknown_room() {
        let rooms = RoomRegistry::new();
        assert_eq!(
            rooms.forward("nowhere", SessionId::new(), ServerEvent::error("x")),
            0
        );
    }
}
