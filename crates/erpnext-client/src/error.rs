use fieldmark_core::gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ERPNext returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status { status: u16, message: Option<String> },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Invalid base URL '{url}': {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("Login failed: {0}")]
    Login(String),
}

impl From<serde_json::Error> for ErpError {
    fn from(e: serde_json::Error) -> Self {
        ErpError::Decode(e.to_string())
    }
}

impl From<ErpError> for GatewayError {
    fn from(e: ErpError) -> Self {
        match e {
            ErpError::Status { status, message } => GatewayError::Status { status, message },
            ErpError::Http(e) if e.is_decode() => GatewayError::Decode(e.to_string()),
            ErpError::Http(e) => GatewayError::Transport(e.to_string()),
            ErpError::Decode(m) => GatewayError::Decode(m),
            ErpError::BaseUrl { .. } => GatewayError::Transport(e.to_string()),
            ErpError::Login(m) => GatewayError::Status {
                status: 401,
                message: Some(m),
            },
        }
    }
}
