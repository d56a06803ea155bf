pub mod message_service;
pub mod moderation;
pub mod notification_service;
pub mod presence;
pub mod push_dispatcher;
pub mod push_gateway;
pub mod router;

pub use message_service::MessageService;
pub use moderation::ModerationService;
pub use notification_service::{NotificationService, NotifyRequest};
pub use presence::{PresenceState, PresenceTracker};
pub use push_dispatcher::{AttemptOutcome, DeliveryAttempt, PushDispatcher, PushRequest, RetryPolicy};
pub use push_gateway::{ExpoGateway, GatewayMessage, PushGateway, PushOutcome};
pub use router::EventRouter;
