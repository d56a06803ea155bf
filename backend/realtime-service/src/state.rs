use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{Config, WebSocketConfig};
use crate::repository::Store;
use crate::services::{
    EventRouter, MessageService, ModerationService, NotificationService, PresenceTracker,
    PushDispatcher, PushGateway,
};
use crate::websocket::{ConnectionRegistry, RoomRegistry};

/// Everything handlers and sessions need, wired once at startup
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub router: EventRouter,
    pub presence: Arc<PresenceTracker>,
    pub dispatcher: Arc<PushDispatcher>,
    pub messages: Arc<MessageService>,
    pub notifications: Arc<NotificationService>,
    pub moderation: Arc<ModerationService>,
    pub websocket: WebSocketConfig,
    tasks: Arc<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Wire the components and spawn the presence and push workers.
    /// Must be called inside a Tokio runtime.
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PushGateway>, config: &Config) -> Self {
        let (registry, changes) = ConnectionRegistry::new();
        let registry = Arc::new(registry);
        let router = EventRouter::new(registry.clone());

        let presence = Arc::new(PresenceTracker::new(router.clone(), store.clone()));
        let presence_task = presence.clone().spawn(changes);

        let (dispatcher, push_task) = PushDispatcher::start(store.clone(), gateway, &config.push);
        let dispatcher = Arc::new(dispatcher);

        let messages = Arc::new(MessageService::new(
            store.clone(),
            router.clone(),
            dispatcher.clone(),
        ));
        let notifications = Arc::new(NotificationService::new(
            store.clone(),
            router.clone(),
            dispatcher.clone(),
        ));
        let moderation = Arc::new(ModerationService::new(notifications.clone(), router.clone()));

        Self {
            store,
            registry,
            rooms: Arc::new(RoomRegistry::new()),
            router,
            presence,
            dispatcher,
            messages,
            notifications,
            moderation,
            websocket: config.websocket.clone(),
            tasks: Arc::new(vec![presence_task, push_task]),
        }
    }

    /// Whether both background workers are still running
    pub fn workers_alive(&self) -> bool {
        self.tasks.iter().all(|t| !t.is_finished())
    }
}
