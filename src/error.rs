use thiserror::Error;

pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}")]
    Status {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },

    #[error("could not decode response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },

    #[error("student {student_id} is not fully cleared")]
    NotCleared { student_id: String },

    #[error("store rejected the request: {0}")]
    Rejected(String),
}

impl ApiError {
    /// Message suitable for showing to the user, preferring whatever the
    /// backend said.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            ApiError::NotCleared { .. } => {
                "Student still has unsigned requirements; permit not issued.".to_string()
            }
            ApiError::Rejected(message) if !message.trim().is_empty() => message.clone(),
            _ => FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// Pulls `message` out of a backend error body, if there is one.
pub fn backend_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}
