use std::time::Instant;

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::rooms::RoomMember;
use super::{ClientEvent, ServerEvent, SessionId, SessionSender};
use crate::state::AppState;

/// Identity bound by `setup`
struct BoundSession {
    user_id: Uuid,
    session_id: SessionId,
    sender: SessionSender,
}

/// One WebSocket connection
///
/// Anonymous until the client sends `setup`; from then on the session is in
/// the registry and routed events arrive through its channel.
pub struct WsSession {
    state: AppState,
    hb: Instant,
    bound: Option<BoundSession>,
}

impl WsSession {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            hb: Instant::now(),
            bound: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.state.websocket.heartbeat_interval();
        let client_timeout = self.state.websocket.client_timeout();

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > client_timeout {
                warn!("WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_event(ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        match event.to_json() {
            Ok(text) => ctx.text(text),
            Err(e) => error!(event = event.event_name(), error = %e, "Failed to serialize event"),
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        if let ClientEvent::Setup { user_id } = event {
            self.setup(user_id, ctx);
            return;
        }

        let Some(bound) = &self.bound else {
            Self::send_event(ctx, &ServerEvent::error("setup required"));
            return;
        };

        match event {
            ClientEvent::Setup { .. } => {}
            ClientEvent::JoinRoom { room_id } => {
                self.state.rooms.join(
                    &room_id,
                    RoomMember {
                        session_id: bound.session_id,
                        user_id: bound.user_id,
                        sender: bound.sender.clone(),
                    },
                );
            }
            ClientEvent::Typing { room_id } => {
                let user_id = bound.user_id;
                self.state.rooms.forward(
                    &room_id.clone(),
                    bound.session_id,
                    ServerEvent::Typing { room_id, user_id },
                );
            }
            ClientEvent::StopTyping { room_id } => {
                let user_id = bound.user_id;
                self.state.rooms.forward(
                    &room_id.clone(),
                    bound.session_id,
                    ServerEvent::StopTyping { room_id, user_id },
                );
            }
        }
    }

    fn setup(&mut self, user_id: Uuid, ctx: &mut ws::WebsocketContext<Self>) {
        if self.bound.is_some() {
            Self::send_event(ctx, &ServerEvent::error("session already set up"));
            return;
        }

        let (sender, rx) = mpsc::unbounded_channel();
        let session_id = self.state.registry.add_session(user_id, sender.clone());
        ctx.add_stream(UnboundedReceiverStream::new(rx));
        self.bound = Some(BoundSession {
            user_id,
            session_id,
            sender,
        });

        info!(%user_id, %session_id, "WebSocket session set up");
        Self::send_event(
            ctx,
            &ServerEvent::Connected {
                session_id: session_id.0,
                user_id,
            },
        );
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("WebSocket connection opened");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(bound) = self.bound.take() {
            self.state.rooms.leave_all(bound.session_id);
            self.state
                .registry
                .remove_session(bound.user_id, bound.session_id);
            info!(user_id = %bound.user_id, session_id = %bound.session_id, "WebSocket session stopped");
        }
    }
}

/// Routed events for this session
impl StreamHandler<ServerEvent> for WsSession {
    fn handle(&mut self, event: ServerEvent, ctx: &mut Self::Context) {
        Self::send_event(ctx, &event);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        // The registry side closed; the socket itself stays up.
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match ClientEvent::from_json(&text) {
                    Ok(event) => self.handle_client_event(event, ctx),
                    Err(e) => {
                        debug!(error = %e, "Unparseable client event");
                        Self::send_event(ctx, &ServerEvent::error("invalid event"));
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                Self::send_event(ctx, &ServerEvent::error("binary frames are not supported"));
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
