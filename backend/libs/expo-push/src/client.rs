use std::time::Duration;

use tracing::debug;

use crate::errors::ExpoError;
use crate::models::*;

pub const DEFAULT_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo rejects requests carrying more messages than this.
pub const MAX_MESSAGES_PER_REQUEST: usize = 100;

/// Expo Push Client
///
/// Sends batches of push messages to the Expo push service and returns one
/// ticket per message, in request order.
#[derive(Clone)]
pub struct ExpoClient {
    push_url: String,
    access_token: Option<String>,
    http_client: reqwest::Client,
}

impl ExpoClient {
    /// Create new Expo client
    ///
    /// # Arguments
    /// * `push_url` - Send endpoint, normally [`DEFAULT_PUSH_URL`]
    /// * `access_token` - Optional Expo access token (enhanced push security)
    /// * `timeout` - Per-request timeout
    pub fn new(
        push_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExpoError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExpoError::ClientBuild(e.to_string()))?;

        Ok(Self {
            push_url: push_url.into(),
            access_token,
            http_client,
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    /// Send one chunk of messages (at most [`MAX_MESSAGES_PER_REQUEST`])
    pub async fn send_chunk(&self, messages: &[ExpoMessage]) -> Result<Vec<ExpoTicket>, ExpoError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        if messages.len() > MAX_MESSAGES_PER_REQUEST {
            return Err(ExpoError::ChunkTooLarge(messages.len()));
        }

        let mut request = self
            .http_client
            .post(&self.push_url)
            .header("Accept", "application/json")
            .json(messages);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExpoError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExpoError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if status.is_server_error() {
                return Err(ExpoError::Server(status.as_u16(), error_text));
            }
            return Err(ExpoError::Api(status.as_u16(), error_text));
        }

        let body: ExpoSendResponse = response
            .json()
            .await
            .map_err(|e| ExpoError::ResponseParse(e.to_string()))?;

        if body.data.is_empty() && !body.errors.is_empty() {
            let joined = body
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ExpoError::Api(status.as_u16(), joined));
        }

        if body.data.len() != messages.len() {
            return Err(ExpoError::TicketCountMismatch {
                expected: messages.len(),
                got: body.data.len(),
            });
        }

        debug!(count = messages.len(), "Expo chunk accepted");
        Ok(body.data)
    }
}

/// Split messages into request-sized chunks
pub fn chunk_messages(messages: &[ExpoMessage]) -> impl Iterator<Item = &[ExpoMessage]> {
    messages.chunks(MAX_MESSAGES_PER_REQUEST)
}

/// Whether `token` has the shape of an Expo push token
pub fn is_expo_push_token(token: &str) -> bool {
    let inner = token
        .strip_prefix("ExponentPushToken[")
        .or_else(|| token.strip_prefix("ExpoPushToken["))
        .and_then(|rest| rest.strip_suffix(']'));

    matches!(inner, Some(s) if !s.is_empty() && !s.contains(['[', ']']))
}
