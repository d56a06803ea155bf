/// Push gateway seam
///
/// The dispatcher talks to the outside world only through [`PushGateway`].
/// [`ExpoGateway`] is the production implementation; tests script their own.
use async_trait::async_trait;
use expo_push::{chunk_messages, is_expo_push_token, ExpoClient, ExpoMessage, ExpoTicket};
use tracing::{debug, warn};

/// One push addressed to a concrete device token
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Per-item result of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// Rate limit, timeout or server error; worth retrying
    TransientFailure(String),
    /// The token will never work again and should be deleted
    InvalidToken(String),
    /// Refused for a reason retrying will not fix
    Rejected(String),
}

impl PushOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PushOutcome::Delivered => "delivered",
            PushOutcome::TransientFailure(_) => "transient",
            PushOutcome::InvalidToken(_) => "invalid_token",
            PushOutcome::Rejected(_) => "rejected",
        }
    }
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Must return exactly one outcome per message, in order.
    async fn send_batch(&self, messages: &[GatewayMessage]) -> Vec<PushOutcome>;
}

pub struct ExpoGateway {
    client: ExpoClient,
}

impl ExpoGateway {
    pub fn new(client: ExpoClient) -> Self {
        Self { client }
    }
}

fn outcome_from_ticket(ticket: &ExpoTicket) -> PushOutcome {
    match ticket {
        ExpoTicket::Ok { .. } => PushOutcome::Delivered,
        ExpoTicket::Error { message, .. } => match ticket.error_kind() {
            Some(kind) if kind.is_token_invalid() => PushOutcome::InvalidToken(message.clone()),
            Some(kind) if kind.is_transient() => PushOutcome::TransientFailure(message.clone()),
            _ => PushOutcome::Rejected(message.clone()),
        },
    }
}

#[async_trait]
impl PushGateway for ExpoGateway {
    async fn send_batch(&self, messages: &[GatewayMessage]) -> Vec<PushOutcome> {
        let mut outcomes: Vec<Option<PushOutcome>> = vec![None; messages.len()];
        let mut sendable = Vec::with_capacity(messages.len());
        let mut positions = Vec::with_capacity(messages.len());

        for (idx, message) in messages.iter().enumerate() {
            if !is_expo_push_token(&message.token) {
                outcomes[idx] = Some(PushOutcome::InvalidToken(
                    "not an Expo push token".to_string(),
                ));
                continue;
            }
            sendable.push(
                ExpoMessage::new(&message.token, &message.title, &message.body)
                    .with_data(message.data.clone()),
            );
            positions.push(idx);
        }

        let mut offset = 0;
        for chunk in chunk_messages(&sendable) {
            let chunk_positions = &positions[offset..offset + chunk.len()];
            offset += chunk.len();

            match self.client.send_chunk(chunk).await {
                Ok(tickets) => {
                    for (pos, ticket) in chunk_positions.iter().zip(tickets.iter()) {
                        outcomes[*pos] = Some(outcome_from_ticket(ticket));
                    }
                    debug!(count = chunk.len(), "Expo chunk sent");
                }
                Err(e) => {
                    warn!(error = %e, count = chunk.len(), "Expo chunk failed");
                    let outcome = if e.is_transient() {
                        PushOutcome::TransientFailure(e.to_string())
                    } else {
                        PushOutcome::Rejected(e.to_string())
                    };
                    for pos in chunk_positions {
                        outcomes[*pos] = Some(outcome.clone());
                    }
                }
            }
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| PushOutcome::TransientFailure("no ticket".to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expo_push::models::TicketDetails;

    fn error_ticket(code: &str) -> ExpoTicket {
        ExpoTicket::Error {
            message: code.to_string(),
            details: Some(TicketDetails {
                error: Some(code.to_string()),
            }),
        }
    }

    #[test]
    fn test_ticket_classification() {
        assert_eq!(
            outcome_from_ticket(&ExpoTicket::Ok { id: "1".into() }),
            PushOutcome::Delivered
        );
        assert!(matches!(
            outcome_from_ticket(&error_ticket("DeviceNotRegistered")),
            PushOutcome::InvalidToken(_)
        ));
        assert!(matches!(
            outcome_from_ticket(&error_ticket("MessageRateExceeded")),
            PushOutcome::TransientFailure(_)
        ));
        assert!(matches!(
            outcome_from_ticket(&error_ticket("MessageTooBig")),
            PushOutcome::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_malformed_tokens_never_hit_the_network() {
        let client = ExpoClient::new(
            "http://127.0.0.1:9/unreachable",
            None,
            std::time::Duration::from_millis(50),
        )
        .unwrap();
        let gateway = ExpoGateway::new(client);

        let outcomes = gateway
            .send_batch(&[GatewayMessage {
                token: "apns:deadbeef".into(),
                title: "t".into(),
                body: "b".into(),
                data: serde_json::json!({}),
            }])
            .await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], PushOutcome::InvalidToken(_)));
    }
}
