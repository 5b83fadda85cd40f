use thiserror::Error;

/// Type alias for Result with CheckerError
pub type Result<T> = std::result::Result<T, CheckerError>;

/// Error types for the mailbox checker
#[derive(Error, Debug)]
pub enum CheckerError {
    /// The Graph API answered with an error object
    #[error("Graph API error ({code}): {message}")]
    Api { code: String, message: String },

    /// Token acquisition failed or a refreshed token was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status without a decodable error object
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Marker header value cannot be turned into a report URL
    #[error("Invalid report link: {0}")]
    InvalidReportLink(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckerError {
    /// Check if the error is transient and the next cycle may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            CheckerError::Network(_) => true,
            CheckerError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for CheckerError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return CheckerError::Http {
                status: status.as_u16(),
                body: error.to_string(),
            };
        }
        if error.is_decode() {
            return CheckerError::InvalidResponse(error.to_string());
        }
        CheckerError::Network(error.to_string())
    }
}
