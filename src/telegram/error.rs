use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    /// Network failure, timeout or an unreadable body.
    #[error("{method} transport failure: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// Non-2xx status or an `ok: false` envelope.
    #[error("{method} rejected (status {status}): {}", .description.as_deref().unwrap_or("no description"))]
    Rejected {
        method: &'static str,
        status: u16,
        error_code: Option<i64>,
        description: Option<String>,
    },
    #[error("{method} returned a malformed payload: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl TelegramError {
    /// Server-supplied explanation, only present for rejections.
    pub fn description(&self) -> Option<&str> {
        match self {
            TelegramError::Rejected { description, .. } => description.as_deref(),
            _ => None,
        }
    }

    /// Whether the same request may succeed later: network trouble, rate
    /// limiting or a server-side failure. Other rejections are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelegramError::Transport { .. } => true,
            TelegramError::Rejected { status, .. } => *status == 429 || *status >= 500,
            TelegramError::Decode { .. } => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TelegramError::Transport { source, .. } if source.is_timeout())
    }
}
