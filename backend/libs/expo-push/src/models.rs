use serde::{Deserialize, Serialize};

/// One push message as accepted by the Expo send endpoint
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpoMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

impl ExpoMessage {
    pub fn new(to: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            title: title.into(),
            body: body.into(),
            data: None,
            sound: Some("default".to_string()),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Expo send response envelope
#[derive(Debug, Deserialize)]
pub struct ExpoSendResponse {
    #[serde(default)]
    pub data: Vec<ExpoTicket>,
    #[serde(default)]
    pub errors: Vec<ExpoRequestError>,
}

/// Request-level error reported by Expo
#[derive(Debug, Deserialize)]
pub struct ExpoRequestError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Per-message push ticket, returned in request order
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExpoTicket {
    Ok {
        #[serde(default)]
        id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        details: Option<TicketDetails>,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TicketDetails {
    #[serde(default)]
    pub error: Option<String>,
}

impl ExpoTicket {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExpoTicket::Ok { .. })
    }

    /// Classified error code of a failed ticket
    pub fn error_kind(&self) -> Option<TicketErrorKind> {
        match self {
            ExpoTicket::Ok { .. } => None,
            ExpoTicket::Error { details, .. } => Some(
                details
                    .as_ref()
                    .and_then(|d| d.error.as_deref())
                    .map(TicketErrorKind::from_code)
                    .unwrap_or(TicketErrorKind::Unknown(String::new())),
            ),
        }
    }
}

/// Error codes Expo attaches to failed tickets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketErrorKind {
    DeviceNotRegistered,
    MessageTooBig,
    MessageRateExceeded,
    MismatchSenderId,
    InvalidCredentials,
    Unknown(String),
}

impl TicketErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "DeviceNotRegistered" => Self::DeviceNotRegistered,
            "MessageTooBig" => Self::MessageTooBig,
            "MessageRateExceeded" => Self::MessageRateExceeded,
            "MismatchSenderId" => Self::MismatchSenderId,
            "InvalidCredentials" => Self::InvalidCredentials,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The device token will never work again
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, Self::DeviceNotRegistered)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::MessageRateExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_skips_empty_data() {
        let msg = ExpoMessage::new("ExponentPushToken[abc]", "Alice", "hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["to"], "ExponentPushToken[abc]");
        assert_eq!(json["sound"], "default");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_parse_mixed_tickets() {
        let raw = r#"{
            "data": [
                {"status": "ok", "id": "XXXX-1"},
                {"status": "error", "message": "not registered", "details": {"error": "DeviceNotRegistered"}},
                {"status": "error", "message": "slow down", "details": {"error": "MessageRateExceeded"}},
                {"status": "error", "message": "mystery"}
            ]
        }"#;
        let resp: ExpoSendResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.data.len(), 4);
        assert!(resp.data[0].is_ok());
        assert_eq!(resp.data[1].error_kind(), Some(TicketErrorKind::DeviceNotRegistered));
        assert!(resp.data[1].error_kind().unwrap().is_token_invalid());
        assert!(resp.data[2].error_kind().unwrap().is_transient());
        assert_eq!(
            resp.data[3].error_kind(),
            Some(TicketErrorKind::Unknown(String::new()))
        );
    }

    #[test]
    fn test_parse_request_errors() {
        let raw = r#"{"errors": [{"code": "PUSH_TOO_MANY_EXPERIENCE_IDS", "message": "mixed projects"}]}"#;
        let resp: ExpoSendResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.data.is_empty());
        assert_eq!(resp.errors[0].message, "mixed projects");
    }
}
