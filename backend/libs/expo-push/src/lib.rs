/// Expo Push Shared Library
///
/// Thin client for the Expo push service used to reach mobile devices
/// that have no live WebSocket session.
///
/// It handles:
/// - Chunked delivery (at most 100 messages per request)
/// - Per-message ticket parsing
/// - Classification of gateway failures (transient vs. permanent)
/// - Device token format validation

pub mod client;
pub mod errors;
pub mod models;

pub use client::{chunk_messages, is_expo_push_token, ExpoClient, DEFAULT_PUSH_URL, MAX_MESSAGES_PER_REQUEST};
pub use errors::ExpoError;
pub use models::{ExpoMessage, ExpoTicket, TicketErrorKind};
