/// WebSocket real-time delivery
///
/// Architecture:
/// 1. ConnectionRegistry: user -> open sessions, source of truth for reachability
/// 2. RoomRegistry: ephemeral typing rooms
/// 3. Wire events: client and server message shapes
/// 4. WsSession: one actor per socket, bridging registry channels to the wire
pub mod messages;
pub mod registry;
pub mod rooms;
pub mod session;

pub use messages::{ClientEvent, ServerEvent};
pub use registry::{ConnectionRegistry, RegistryChange, SessionHandle, SessionId, SessionSender};
pub use rooms::RoomRegistry;
pub use session::WsSession;
