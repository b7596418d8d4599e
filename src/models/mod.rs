use serde::Serialize;

pub mod photo;
pub mod report;

/// Success envelope with no payload beyond the message.
#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub success: bool,
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: &str) -> ApiMessage {
        ApiMessage {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Failure envelope: a flat user-facing message plus the raw error detail
/// when there is one.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiError {
    pub fn new(message: &str) -> ApiError {
        ApiError {
            success: false,
            message: message.to_string(),
            error: None,
        }
    }

    pub fn with_detail(message: &str, error: impl ToString) -> ApiError {
        ApiError {
            success: false,
            message: message.to_string(),
            error: Some(error.to_string()),
        }
    }
}
