use thiserror::Error;

/// Expo Client Error Types
#[derive(Error, Debug)]
pub enum ExpoError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Expo send request failed: {0}")]
    Request(String),

    #[error("Expo rate limit exceeded")]
    RateLimited,

    #[error("Expo server error: {0} - {1}")]
    Server(u16, String),

    #[error("Expo API error: {0} - {1}")]
    Api(u16, String),

    #[error("Failed to parse Expo response: {0}")]
    ResponseParse(String),

    #[error("Expo returned {got} tickets for {expected} messages")]
    TicketCountMismatch { expected: usize, got: usize },

    #[error("Chunk of {0} messages exceeds the per-request limit")]
    ChunkTooLarge(usize),
}

impl ExpoError {
    /// Whether the whole request may succeed if sent again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExpoError::Request(_)
                | ExpoError::RateLimited
                | ExpoError::Server(_, _)
                | ExpoError::ResponseParse(_)
        )
    }
}

impl From<ExpoError> for String {
    fn from(err: ExpoError) -> Self {
        err.to_string()
    }
}
